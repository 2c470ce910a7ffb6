//! Process lifecycle
//!
//! Reload on SIGHUP (new remotes only; removals are not retracted) and a
//! best-effort drain on termination: notify every gateway, poll a few
//! seconds for the queue to empty and the acks to arrive, then exit
//! regardless.

use crate::Backend;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use svrlink_common::AppConfig;
use svrlink_net::{DispatchQueue, LinkRegistry};

/// One-second drain polls before giving up on a clean shutdown
const DRAIN_POLLS: u32 = 3;

/// Wait for termination, handling reload signals along the way.
#[cfg(unix)]
pub async fn signal_loop(backend: &Backend, mut config: AppConfig) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigquit = signal(SignalKind::quit())?;

    loop {
        tokio::select! {
            _ = sighup.recv() => {
                config = reload(backend, &config);
            }
            _ = sigterm.recv() => break,
            _ = sigint.recv() => break,
            _ = sigquit.recv() => break,
        }
    }

    tracing::info!(
        server_id = config.server_id,
        server_name = %config.server_name,
        "Termination signal received"
    );
    shutdown(backend.registry(), backend.queue()).await;
    Ok(())
}

#[cfg(not(unix))]
pub async fn signal_loop(backend: &Backend, config: AppConfig) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!(server_id = config.server_id, "Termination signal received");
    shutdown(backend.registry(), backend.queue()).await;
    Ok(())
}

/// Re-read the config file; spawn links only for remote ids not seen before.
fn reload(backend: &Backend, current: &AppConfig) -> AppConfig {
    let path = config_path();
    let fresh = match AppConfig::load(&path) {
        Ok(fresh) => fresh,
        Err(error) => {
            tracing::error!(path = %path.display(), %error, "Reload failed, keeping old config");
            return current.clone();
        }
    };

    let added = fresh.new_remotes_since(current);
    for remote in &added {
        backend.spawn_link(remote);
    }
    tracing::info!(added = added.len(), "Configuration reloaded");
    fresh
}

/// Config file location: first CLI argument, then `SVRLINK_CONFIG`, then
/// `app.json` in the working directory.
#[must_use]
pub fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SVRLINK_CONFIG").ok())
        .unwrap_or_else(|| "app.json".to_string())
        .into()
}

/// Best-effort drain: stop-notify every gateway, then poll up to
/// [`DRAIN_POLLS`] one-second intervals for an empty queue and a full set of
/// acks. Exits either way; an incomplete drain is logged, not fatal.
pub async fn shutdown(registry: &Arc<LinkRegistry>, queue: &DispatchQueue) {
    registry.send_stop_notify(true).await;

    let mut clean = false;
    for _ in 0..DRAIN_POLLS {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if queue.pending() == 0 && registry.all_stopped() {
            clean = true;
            break;
        }
    }

    if clean {
        tracing::info!("Shutdown drain complete");
    } else {
        tracing::info!(
            pending = queue.pending(),
            live = registry.len(),
            stop_acks = registry.stop_acks(),
            "Shutdown drain incomplete, exiting anyway"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svrlink_net::{Dispatcher, GatewayLink, HandlerTable};
    use svrlink_proto::RegisterInfo;
    use tokio::time::Instant;

    fn link(remote_id: i32) -> Arc<GatewayLink> {
        GatewayLink::new(
            remote_id,
            1,
            "127.0.0.1:0".to_string(),
            RegisterInfo {
                server_id: 5,
                server_type: 2,
                server_name: "x".to_string(),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_clean_with_no_links() {
        let registry = LinkRegistry::new();
        let queue = Dispatcher::start(HandlerTable::new());

        let start = Instant::now();
        shutdown(&registry, &queue).await;

        // Zero links and an empty queue still costs one poll interval.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_gives_up_after_three_polls() {
        let registry = LinkRegistry::new();
        // A live link that never acks keeps all_stopped() false.
        registry.add(link(1));
        let queue = Dispatcher::start(HandlerTable::new());

        let start = Instant::now();
        shutdown(&registry, &queue).await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_finishes_early_once_acked() {
        let registry = LinkRegistry::new();
        registry.add(link(1));
        let queue = Dispatcher::start(HandlerTable::new());

        registry.record_stop_ack();

        let start = Instant::now();
        shutdown(&registry, &queue).await;
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
