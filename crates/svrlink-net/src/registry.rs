//! Link registry
//!
//! Concurrency-safe directory of the currently live gateway links, keyed by
//! remote id. Links add themselves once their registration handshake
//! succeeds and remove themselves when their read loop dies, while the tick
//! scheduler iterates for maintenance and callers broadcast. DashMap
//! tolerates all of that concurrently without a consistent snapshot, which is
//! all the broadcast semantics need.

use crate::link::GatewayLink;
use dashmap::DashMap;
use rand::Rng;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Heartbeats go out every this many 1 s maintenance ticks
const HEARTBEAT_EVERY_TICKS: u64 = 60;

/// Registry of live outbound gateway links
#[derive(Default)]
pub struct LinkRegistry {
    links: DashMap<i32, Arc<GatewayLink>>,
    live: AtomicUsize,
    /// Gateways that have acknowledged our stop notification
    stop_acks: AtomicUsize,
    /// 1 s maintenance tick counter, drives the heartbeat cadence
    tick_count: AtomicU64,
}

impl LinkRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a link. A second link for the same remote id replaces the
    /// entry rather than duplicating it.
    pub fn add(&self, link: Arc<GatewayLink>) {
        let remote_id = link.remote_id();
        if self.links.insert(remote_id, link).is_none() {
            self.live.fetch_add(1, Ordering::SeqCst);
        }
        tracing::debug!(remote_id, "Link added to registry");
    }

    /// Remove a link by remote id. No-op when absent.
    pub fn remove(&self, remote_id: i32) {
        if self.links.remove(&remote_id).is_some() {
            self.live.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(remote_id, "Link removed from registry");
        }
    }

    #[must_use]
    pub fn get(&self, remote_id: i32) -> Option<Arc<GatewayLink>> {
        self.links.get(&remote_id).map(|entry| entry.value().clone())
    }

    /// Number of currently live links
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Uniform random pick among the live links; `None` when empty.
    #[must_use]
    pub fn random_pick(&self) -> Option<Arc<GatewayLink>> {
        let entries = self.snapshot();
        if entries.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..entries.len());
        Some(entries[index].clone())
    }

    /// Best-effort send of one frame to every live link. A failure on one
    /// entry never prevents delivery to the rest.
    pub async fn broadcast(&self, message_id: u32, payload: &[u8]) {
        for link in self.snapshot() {
            if let Err(error) = link.send_frame(message_id, payload).await {
                tracing::warn!(
                    remote_id = link.remote_id(),
                    message_id,
                    %error,
                    "Broadcast send failed"
                );
            }
        }
    }

    /// Send a heartbeat probe on every live link.
    pub async fn send_heartbeats(&self) {
        for link in self.snapshot() {
            link.send_heartbeat().await;
        }
    }

    /// Run the heartbeat timeout check on every live link.
    pub async fn check_timeouts(&self) {
        for link in self.snapshot() {
            link.check_timeout().await;
        }
    }

    /// Tell every gateway this process is stopping.
    pub async fn send_stop_notify(&self, want_ack: bool) {
        for link in self.snapshot() {
            link.send_stop_notify(want_ack).await;
        }
    }

    /// 1 s maintenance entry point, invoked by the tick scheduler: timeout
    /// checks every call, heartbeats every [`HEARTBEAT_EVERY_TICKS`] calls.
    pub async fn tick_1s(&self) {
        self.check_timeouts().await;
        let ticks = self.tick_count.fetch_add(1, Ordering::SeqCst) + 1;
        if ticks % HEARTBEAT_EVERY_TICKS == 0 {
            self.send_heartbeats().await;
        }
    }

    /// Record one stop acknowledgment from a gateway.
    pub fn record_stop_ack(&self) {
        self.stop_acks.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn stop_acks(&self) -> usize {
        self.stop_acks.load(Ordering::SeqCst)
    }

    /// True once every live link's gateway has acknowledged stop.
    #[must_use]
    pub fn all_stopped(&self) -> bool {
        self.stop_acks() >= self.len()
    }

    /// Materialized view of the live links; iteration over it is stable even
    /// while links add and remove themselves.
    fn snapshot(&self) -> Vec<Arc<GatewayLink>> {
        self.links.iter().map(|entry| entry.value().clone()).collect()
    }
}

impl std::fmt::Debug for LinkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkRegistry")
            .field("live", &self.len())
            .field("stop_acks", &self.stop_acks())
            .finish()
    }
}
