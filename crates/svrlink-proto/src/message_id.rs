//! Reserved message ids
//!
//! Control-plane ids understood by every backend and gateway process. Game
//! traffic uses ids outside this range and is routed through the dispatcher's
//! handler table untouched.

/// Heartbeat probe; the far end replies on the same id
pub const HEARTBEAT: u32 = 10000;
/// Backend registers itself with a gateway right after connecting
pub const REGISTER: u32 = 11003;
/// Envelope relayed through a gateway to another backend
pub const SERVER_TO_SERVER: u32 = 11004;
/// Envelope a gateway delivers to a client connection
pub const SERVER_TO_CLIENT: u32 = 11007;
/// Backend tells its gateways it is going down
pub const STOP_NOTIFY: u32 = 11020;
/// Gateway acknowledges the stop notification
pub const STOP_ACK: u32 = 11021;

/// Fixed heartbeat payload, sent as-is on every probe
pub const HEARTBEAT_PAYLOAD: &[u8] = br#"{"msgID":10000}"#;

/// Human-readable name for a reserved id, for logging
#[must_use]
pub fn name(message_id: u32) -> &'static str {
    match message_id {
        HEARTBEAT => "heartbeat",
        REGISTER => "register",
        SERVER_TO_SERVER => "server_to_server",
        SERVER_TO_CLIENT => "server_to_client",
        STOP_NOTIFY => "stop_notify",
        STOP_ACK => "stop_ack",
        _ => "user",
    }
}
