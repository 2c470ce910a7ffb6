//! # svrlink-proto
//!
//! The binary wire protocol spoken between a backend process and its
//! gateways: a length-prefixed frame format, the reserved message ids, and
//! the JSON payloads carried by control frames.

pub mod frame;
pub mod message_id;
pub mod payloads;

pub use frame::{ByteOrder, FrameCodec, FrameError, BYTE_ORDER};
pub use payloads::{RegisterInfo, ServerToClientMsg, ServerToServerMsg, StopNotify};
