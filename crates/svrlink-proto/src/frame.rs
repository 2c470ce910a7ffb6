//! Length-prefixed frame codec
//!
//! Every message on the wire is one frame:
//!
//! ```text
//! offset 0..4   length     (u32; counts the bytes of message_id + payload)
//! offset 4..8   message_id (u32)
//! offset 8..    payload    (length - 4 bytes)
//! ```
//!
//! Both integers use the process-wide [`BYTE_ORDER`]. The declared length is
//! bounds-checked before the payload is allocated or read, so a corrupt
//! stream is rejected after at most 8 bytes.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Wire byte order for the two header integers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Process-wide byte order. Both peers must agree; this is a build-time
/// constant, not a config knob.
pub const BYTE_ORDER: ByteOrder = ByteOrder::Little;

/// Bytes of the length field itself (not counted by the declared length)
const LENGTH_FIELD_BYTES: u32 = 4;
/// Bytes of the message-id field (counted by the declared length)
const MSG_ID_FIELD_BYTES: u32 = 4;

const DEFAULT_MIN_LEN: u32 = 8;
const DEFAULT_MAX_LEN: u32 = 100 * 1024 * 1024;

fn put_u32(value: u32) -> [u8; 4] {
    match BYTE_ORDER {
        ByteOrder::Little => value.to_le_bytes(),
        ByteOrder::Big => value.to_be_bytes(),
    }
}

fn get_u32(bytes: [u8; 4]) -> u32 {
    match BYTE_ORDER {
        ByteOrder::Little => u32::from_le_bytes(bytes),
        ByteOrder::Big => u32::from_be_bytes(bytes),
    }
}

/// Frame codec errors
///
/// `TooLong`/`TooShort` are protocol errors: the connection they occurred on
/// is poisoned and must be closed. `Io` is connection loss, not a protocol
/// violation.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Frame too long: declared {len}, max {max}")]
    TooLong { len: u32, max: u32 },

    #[error("Frame too short: declared {len}, min {min}")]
    TooShort { len: u32, min: u32 },

    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encoder/decoder for the length-prefixed frame format
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    min_len: u32,
    max_len: u32,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            min_len: DEFAULT_MIN_LEN,
            max_len: DEFAULT_MAX_LEN,
        }
    }
}

impl FrameCodec {
    /// Create a codec with custom length bounds
    #[must_use]
    pub fn with_bounds(min_len: u32, max_len: u32) -> Self {
        Self { min_len, max_len }
    }

    /// Encode one frame: `length || message_id || payload`
    ///
    /// The declared length counts the message-id field plus the payload,
    /// never the length field itself.
    #[must_use]
    pub fn encode(&self, message_id: u32, payload: &[u8]) -> Vec<u8> {
        let length = MSG_ID_FIELD_BYTES + payload.len() as u32;

        let mut frame =
            Vec::with_capacity((LENGTH_FIELD_BYTES + length) as usize);
        frame.extend_from_slice(&put_u32(length));
        frame.extend_from_slice(&put_u32(message_id));
        frame.extend_from_slice(payload);
        frame
    }

    /// Read one frame from `reader`: exactly three exact-size reads
    /// (length, message id, payload).
    ///
    /// Returns `(message_id, payload)`.
    ///
    /// # Errors
    /// `TooLong`/`TooShort` when the declared length is outside the
    /// configured bounds (checked before any payload byte is read), `Io` on
    /// any short read.
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<(u32, Vec<u8>), FrameError>
    where
        R: AsyncRead + Unpin,
    {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await?;

        let mut id_buf = [0u8; 4];
        reader.read_exact(&mut id_buf).await?;

        let length = get_u32(len_buf);
        let message_id = get_u32(id_buf);

        if length > self.max_len {
            return Err(FrameError::TooLong {
                len: length,
                max: self.max_len,
            });
        }
        if length < self.min_len {
            return Err(FrameError::TooShort {
                len: length,
                min: self.min_len,
            });
        }

        let mut payload = vec![0u8; (length - MSG_ID_FIELD_BYTES) as usize];
        reader.read_exact(&mut payload).await?;

        Ok((message_id, payload))
    }
}
