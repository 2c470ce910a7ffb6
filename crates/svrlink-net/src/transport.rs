//! Transport layer
//!
//! Thin wrapper over a TCP stream: timed dial, frame-at-a-time send and
//! receive, idempotent close. No retry policy lives here; reconnection is
//! the owning link's job.

use crate::error::NetError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use svrlink_proto::FrameCodec;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};

/// Default bound on connection establishment
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// One framed, bidirectional connection to a gateway
///
/// Links hold transports behind this trait so tests can drive the link state
/// machine with a scripted peer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one frame. Fails fast when the transport is already closed.
    async fn send_frame(&self, message_id: u32, payload: &[u8]) -> Result<(), NetError>;

    /// Receive one frame, blocking this task until a full frame arrives,
    /// the peer disconnects, or `close` is called from another task.
    async fn recv_frame(&self) -> Result<(u32, Vec<u8>), NetError>;

    /// Close the transport. Idempotent; wakes any task blocked in
    /// `recv_frame`.
    async fn close(&self);
}

/// Opens transports. The production impl dials TCP; tests substitute a
/// scripted factory.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, addr: &str) -> Result<Arc<dyn Transport>, NetError>;
}

/// TCP transport over a tokio stream
pub struct TcpTransport {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    codec: FrameCodec,
    closed: AtomicBool,
    close_notify: Notify,
}

impl TcpTransport {
    /// Dial `addr` with a bounded connection timeout.
    pub async fn dial(
        addr: &str,
        timeout: Duration,
        codec: FrameCodec,
    ) -> Result<Self, NetError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| NetError::ConnectTimeout(timeout))??;
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            codec,
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send_frame(&self, message_id: u32, payload: &[u8]) -> Result<(), NetError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NetError::Closed);
        }
        let frame = self.codec.encode(message_id, payload);
        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        Ok(())
    }

    async fn recv_frame(&self) -> Result<(u32, Vec<u8>), NetError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NetError::Closed);
        }
        let mut reader = self.reader.lock().await;
        tokio::select! {
            () = self.close_notify.notified() => Err(NetError::Closed),
            result = self.codec.read_frame(&mut *reader) => Ok(result?),
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close_notify.notify_waiters();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Production dialer: TCP with the default connect timeout and codec bounds
#[derive(Debug, Clone)]
pub struct TcpDialer {
    pub connect_timeout: Duration,
    pub codec: FrameCodec,
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            codec: FrameCodec::default(),
        }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: &str) -> Result<Arc<dyn Transport>, NetError> {
        let transport = TcpTransport::dial(addr, self.connect_timeout, self.codec).await?;
        Ok(Arc::new(transport))
    }
}
