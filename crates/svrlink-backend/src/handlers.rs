//! Control-plane message handlers
//!
//! The handler table is built once at startup; game-level handlers would be
//! registered here alongside the control ids.

use std::sync::Arc;
use svrlink_net::{HandlerTable, LinkRegistry};
use svrlink_proto::message_id;

/// Build the startup handler table: heartbeat replies and stop
/// acknowledgments.
#[must_use]
pub fn build_handler_table(registry: &Arc<LinkRegistry>) -> HandlerTable {
    let mut table = HandlerTable::new();

    // A heartbeat frame coming back on a link is the gateway's reply to our
    // probe; it fully resets that link's timeout tracking.
    table.register(
        message_id::HEARTBEAT,
        |link, _remote_id, _message_id, _payload| async move {
            link.on_heartbeat_reply();
        },
    );

    // Gateways acknowledge our stop notification; shutdown waits on the
    // count.
    {
        let registry = registry.clone();
        table.register(
            message_id::STOP_ACK,
            move |_link, remote_id, _message_id, _payload| {
                let registry = registry.clone();
                async move {
                    tracing::debug!(remote_id, "Gateway acknowledged stop");
                    registry.record_stop_ack();
                }
            },
        );
    }

    table
}
