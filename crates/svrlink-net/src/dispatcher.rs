//! Inbound message dispatcher
//!
//! All links push into one bounded intake queue. A single drain task pops in
//! arrival order and spawns each handler as its own task, so a slow handler
//! never stalls the queue; the price is that handlers for different
//! messages may complete out of order even when their messages arrived in
//! order. Handlers must not assume cross-message ordering.

use crate::link::GatewayLink;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default intake queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// One inbound message, queued between a link's read loop and its handler
pub struct PendingMessage {
    /// Link the message arrived on
    pub link: Arc<GatewayLink>,
    pub message_id: u32,
    pub payload: Vec<u8>,
}

/// Boxed handler: `(link, remote_id, message_id, payload)`, side effects only
pub type Handler =
    Arc<dyn Fn(Arc<GatewayLink>, i32, u32, Vec<u8>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Message-id → handler table
///
/// Populated once at startup, then shared read-only behind an `Arc`, so
/// concurrent lookup needs no locking.
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<u32, Handler>,
}

impl HandlerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one message id. Later registrations for the
    /// same id replace earlier ones.
    pub fn register<F, Fut>(&mut self, message_id: u32, handler: F)
    where
        F: Fn(Arc<GatewayLink>, i32, u32, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let handler: Handler =
            Arc::new(move |link, remote_id, message_id, payload| {
                Box::pin(handler(link, remote_id, message_id, payload))
            });
        self.handlers.insert(message_id, handler);
    }

    #[must_use]
    pub fn get(&self, message_id: u32) -> Option<&Handler> {
        self.handlers.get(&message_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Handle for pushing into the intake queue
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<PendingMessage>,
}

impl DispatchQueue {
    /// Queue one message. Awaits when the queue is full; fails only when the
    /// drain task is gone.
    pub async fn push(&self, message: PendingMessage) -> Result<(), PushError> {
        self.tx.send(message).await.map_err(|_| PushError::Closed)
    }

    /// Messages currently queued and not yet dequeued
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Intake queue push error
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Dispatcher queue closed")]
    Closed,
}

/// Single-intake dispatcher
pub struct Dispatcher;

impl Dispatcher {
    /// Start the drain task over a fresh queue with the default capacity.
    #[must_use]
    pub fn start(table: HandlerTable) -> DispatchQueue {
        Self::start_with_capacity(table, DEFAULT_QUEUE_CAPACITY)
    }

    /// Start the drain task with an explicit queue capacity.
    #[must_use]
    pub fn start_with_capacity(table: HandlerTable, capacity: usize) -> DispatchQueue {
        let (tx, rx) = mpsc::channel(capacity);
        let table = Arc::new(table);
        tokio::spawn(drain_loop(table, rx));
        DispatchQueue { tx }
    }
}

/// Dequeue in arrival order; spawn one task per handled message.
async fn drain_loop(table: Arc<HandlerTable>, mut rx: mpsc::Receiver<PendingMessage>) {
    tracing::info!("Dispatcher drain task started");
    while let Some(message) = rx.recv().await {
        let remote_id = message.link.remote_id();
        let Some(handler) = table.get(message.message_id) else {
            tracing::debug!(
                remote_id,
                message_id = message.message_id,
                payload_len = message.payload.len(),
                "No handler registered, dropping message"
            );
            continue;
        };

        let handler = handler.clone();
        // Fire-and-forget: a panicking handler takes down only its own task.
        tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            handler(message.link, remote_id, message.message_id, message.payload).await;
            tracing::debug!(
                remote_id,
                message_id = message.message_id,
                duration_us = start.elapsed().as_micros() as u64,
                "Handler finished"
            );
        });
    }
    tracing::info!("Dispatcher drain task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_link() -> Arc<GatewayLink> {
        GatewayLink::new(
            9,
            1,
            "127.0.0.1:0".to_string(),
            svrlink_proto::RegisterInfo {
                server_id: 5,
                server_type: 2,
                server_name: "x".to_string(),
            },
        )
    }

    fn message(link: &Arc<GatewayLink>, message_id: u32, payload: &[u8]) -> PendingMessage {
        PendingMessage {
            link: link.clone(),
            message_id,
            payload: payload.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_routes_to_registered_handler() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut table = HandlerTable::new();
        {
            let seen = seen.clone();
            table.register(50001, move |_link, remote_id, message_id, payload| {
                let seen = seen.clone();
                async move {
                    assert_eq!(remote_id, 9);
                    assert_eq!(message_id, 50001);
                    assert_eq!(payload, b"hello");
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        let queue = Dispatcher::start(table);
        let link = test_link();
        queue.push(message(&link, 50001, b"hello")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unroutable_message_dropped_without_stalling_queue() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut table = HandlerTable::new();
        {
            let seen = seen.clone();
            table.register(50002, move |_, _, _, _| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        let queue = Dispatcher::start(table);
        let link = test_link();
        // First message has no handler; the next one must still be delivered.
        queue.push(message(&link, 99999, b"")).await.unwrap();
        queue.push(message(&link, 50002, b"")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_kill_drain_task() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut table = HandlerTable::new();
        table.register(1, |_, _, _, _| async { panic!("handler bug") });
        {
            let seen = seen.clone();
            table.register(2, move |_, _, _, _| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        let queue = Dispatcher::start(table);
        let link = test_link();
        queue.push(message(&link, 1, b"")).await.unwrap();
        queue.push(message(&link, 2, b"")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_handler_does_not_block_dequeue() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut table = HandlerTable::new();
        table.register(1, |_, _, _, _| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        {
            let seen = seen.clone();
            table.register(2, move |_, _, _, _| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        let queue = Dispatcher::start_with_capacity(table, 8);
        let link = test_link();
        queue.push(message(&link, 1, b"")).await.unwrap();
        queue.push(message(&link, 2, b"")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pending_gauge_tracks_queue_depth() {
        // The drain task races the pushes, so only upper bounds are exact.
        let queue = Dispatcher::start_with_capacity(HandlerTable::new(), 4);
        let link = test_link();
        queue.push(message(&link, 1, b"")).await.unwrap();
        queue.push(message(&link, 2, b"")).await.unwrap();
        assert!(queue.pending() <= 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.pending(), 0);
    }
}
