//! Network layer error types

use std::time::Duration;
use svrlink_proto::FrameError;

/// Errors from the transport and link layers
///
/// None of these cross a link boundary: the owning link recovers from all of
/// them with its reconnect loop, and fire-and-forget senders log and drop.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Link is not connected")]
    NotConnected,

    #[error("Transport closed")]
    Closed,

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}
