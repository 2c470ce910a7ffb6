//! # svrlink-backend
//!
//! The backend process: wires the redis pool, link registry, dispatcher and
//! tick scheduler together, registers the control-plane message handlers,
//! and runs the signal-driven lifecycle (reload on SIGHUP, best-effort drain
//! on termination).

pub mod handlers;
pub mod lifecycle;

use anyhow::Context;
use std::sync::Arc;
use svrlink_cache::{LockManager, RedisLockStore, RedisPool};
use svrlink_common::{AppConfig, RemoteConfig};
use svrlink_net::{
    DispatchQueue, Dispatcher, GatewayLink, LinkRegistry, MaintenanceTicker, TcpDialer,
    TickScheduler,
};
use svrlink_proto::RegisterInfo;

/// Owned process context: every singleton of the original design is an
/// explicit field here, wired once at startup.
pub struct Backend {
    registry: Arc<LinkRegistry>,
    queue: DispatchQueue,
    locks: LockManager,
    dialer: Arc<TcpDialer>,
    identity: RegisterInfo,
}

impl Backend {
    /// Build the full pipeline from the loaded configuration.
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let pool = RedisPool::from_config(&config.redis)
            .context("failed to create redis pool")?;
        let locks = LockManager::new(Arc::new(RedisLockStore::new(pool.clone())));

        let registry = LinkRegistry::new();
        let table = handlers::build_handler_table(&registry);
        let queue = Dispatcher::start(table);

        Ok(Self {
            registry,
            queue,
            locks,
            dialer: Arc::new(TcpDialer::default()),
            identity: RegisterInfo {
                server_id: config.server_id,
                server_type: config.server_type,
                server_name: config.server_name.clone(),
            },
        })
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<LinkRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    /// The cross-process mutual exclusion primitive, for anything that needs
    /// to serialize against other backends.
    #[must_use]
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Spawn the permanent link task for one configured remote.
    pub fn spawn_link(&self, remote: &RemoteConfig) {
        let link = GatewayLink::new(
            remote.remote_id,
            remote.remote_type,
            remote.addr.clone(),
            self.identity.clone(),
        );
        tracing::info!(
            remote_id = remote.remote_id,
            addr = %remote.addr,
            "Spawning gateway link"
        );
        tokio::spawn(link.run(
            self.dialer.clone(),
            self.registry.clone(),
            self.queue.clone(),
        ));
    }

    /// Spawn the tick scheduler driving registry maintenance.
    pub fn spawn_scheduler(&self) {
        let scheduler = TickScheduler::new(MaintenanceTicker::new(self.registry.clone()));
        tokio::spawn(scheduler.run());
    }
}

/// Run the backend until a termination signal arrives.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let backend = Backend::new(&config)?;

    for remote in &config.remotes {
        backend.spawn_link(remote);
    }
    backend.spawn_scheduler();

    tracing::info!(
        server_id = config.server_id,
        server_name = %config.server_name,
        remotes = config.remotes.len(),
        "Backend started"
    );

    lifecycle::signal_loop(&backend, config).await
}
