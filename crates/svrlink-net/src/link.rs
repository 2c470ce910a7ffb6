//! Gateway link
//!
//! One persistent logical connection from this backend to one gateway. The
//! link's task loops Disconnected → Connecting → Registered → Reading →
//! Disconnected forever; it is never torn down while the remote stays
//! configured. Heartbeats are driven from outside by the tick scheduler, not
//! by the read loop.

use crate::dispatcher::{DispatchQueue, PendingMessage};
use crate::error::NetError;
use crate::registry::LinkRegistry;
use crate::transport::{Dialer, Transport};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use svrlink_proto::{message_id, RegisterInfo, ServerToClientMsg, ServerToServerMsg, StopNotify};
use tokio::time::Instant;

/// Delay between reconnect attempts
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
/// A sent heartbeat unanswered for this long counts as one miss
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);
/// Misses that force the transport closed (and thereby a reconnect)
pub const MAX_MISSED_HEARTBEATS: u32 = 3;

#[derive(Debug, Default)]
struct HeartbeatState {
    /// When the outstanding heartbeat was sent; `None` when nothing is
    /// outstanding (cleared by any reply)
    last_sent: Option<Instant>,
    missed: u32,
}

/// One persistent outbound link to a gateway
pub struct GatewayLink {
    remote_id: i32,
    remote_type: i32,
    addr: String,
    /// Identity this process registers with after every connect
    identity: RegisterInfo,
    /// At most one live transport at a time; replacing it on reconnect
    /// implicitly retires the prior one
    transport: RwLock<Option<Arc<dyn Transport>>>,
    heartbeat: Mutex<HeartbeatState>,
}

impl GatewayLink {
    #[must_use]
    pub fn new(
        remote_id: i32,
        remote_type: i32,
        addr: String,
        identity: RegisterInfo,
    ) -> Arc<Self> {
        Arc::new(Self {
            remote_id,
            remote_type,
            addr,
            identity,
            transport: RwLock::new(None),
            heartbeat: Mutex::new(HeartbeatState::default()),
        })
    }

    #[must_use]
    pub fn remote_id(&self) -> i32 {
        self.remote_id
    }

    #[must_use]
    pub fn remote_type(&self) -> i32 {
        self.remote_type
    }

    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.read().is_some()
    }

    /// Run the link's connect/register/read loop. Never returns; spawn it.
    pub async fn run(
        self: Arc<Self>,
        dialer: Arc<dyn Dialer>,
        registry: Arc<LinkRegistry>,
        queue: DispatchQueue,
    ) {
        loop {
            let transport = match dialer.dial(&self.addr).await {
                Ok(transport) => transport,
                Err(error) => {
                    tracing::debug!(
                        remote_id = self.remote_id,
                        addr = %self.addr,
                        %error,
                        "Connect failed, retrying"
                    );
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                    continue;
                }
            };

            // Identify ourselves before the link becomes routable.
            if let Err(error) = self.register(transport.as_ref()).await {
                tracing::warn!(
                    remote_id = self.remote_id,
                    addr = %self.addr,
                    %error,
                    "Registration send failed"
                );
                transport.close().await;
                tokio::time::sleep(RECONNECT_BACKOFF).await;
                continue;
            }

            if let Some(previous) = self.install_transport(transport.clone()) {
                previous.close().await;
            }
            registry.add(self.clone());
            tracing::info!(
                remote_id = self.remote_id,
                addr = %self.addr,
                "Gateway link established"
            );

            self.read_loop(transport.as_ref(), &queue).await;

            registry.remove(self.remote_id);
            tokio::time::sleep(RECONNECT_BACKOFF).await;
        }
    }

    /// Blocking receive loop; returns once the transport dies.
    async fn read_loop(self: &Arc<Self>, transport: &dyn Transport, queue: &DispatchQueue) {
        loop {
            match transport.recv_frame().await {
                Ok((message_id, payload)) => {
                    let pending = PendingMessage {
                        link: self.clone(),
                        message_id,
                        payload,
                    };
                    if queue.push(pending).await.is_err() {
                        tracing::error!(
                            remote_id = self.remote_id,
                            "Dispatcher queue closed, dropping link"
                        );
                        transport.close().await;
                        return;
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        remote_id = self.remote_id,
                        addr = %self.addr,
                        %error,
                        "Gateway link read failed, reconnecting"
                    );
                    transport.close().await;
                    return;
                }
            }
        }
    }

    async fn register(&self, transport: &dyn Transport) -> Result<(), NetError> {
        let payload = serde_json::to_vec(&self.identity)?;
        transport.send_frame(message_id::REGISTER, &payload).await
    }

    fn install_transport(&self, transport: Arc<dyn Transport>) -> Option<Arc<dyn Transport>> {
        self.transport.write().replace(transport)
    }

    fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().clone()
    }

    /// Send one raw frame on the current transport.
    pub async fn send_frame(&self, message_id: u32, payload: &[u8]) -> Result<(), NetError> {
        let transport = self.current_transport().ok_or(NetError::NotConnected)?;
        transport.send_frame(message_id, payload).await
    }

    /// Fire-and-forget JSON send: marshal failure or a dead transport is
    /// logged and the send abandoned.
    async fn send_json<T: Serialize>(&self, message_id: u32, body: &T) {
        let payload = match serde_json::to_vec(body) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(
                    remote_id = self.remote_id,
                    message_id,
                    %error,
                    "Payload encoding failed, send abandoned"
                );
                return;
            }
        };
        if let Err(error) = self.send_frame(message_id, &payload).await {
            tracing::warn!(
                remote_id = self.remote_id,
                message_id,
                %error,
                "Send failed"
            );
        }
    }

    /// Relay a message to another backend through this gateway.
    pub async fn send_to_server(
        &self,
        target_server_id: i32,
        target_server_type: i32,
        msg_id: u32,
        data: String,
    ) {
        let envelope = ServerToServerMsg {
            target_server_id,
            target_server_type,
            server_id: self.identity.server_id,
            server_type: self.identity.server_type,
            msg_id,
            data,
        };
        self.send_json(message_id::SERVER_TO_SERVER, &envelope).await;
        tracing::info!(
            remote_id = self.remote_id,
            target_server_id,
            target_server_type,
            msg_id,
            "Relayed message to server"
        );
    }

    /// Deliver a message to one client connection through this gateway.
    pub async fn send_to_client(&self, user_id: i32, msg_id: u32, data: String) {
        let envelope = ServerToClientMsg {
            user_id,
            msg_id,
            data,
        };
        self.send_json(message_id::SERVER_TO_CLIENT, &envelope).await;
    }

    /// Send a raw frame to the gateway itself, logging on failure.
    pub async fn send_to_gate(&self, msg_id: u32, payload: &[u8]) {
        if let Err(error) = self.send_frame(msg_id, payload).await {
            tracing::warn!(remote_id = self.remote_id, msg_id, %error, "Send failed");
        }
    }

    /// Tell the gateway this process is stopping; `want_ack` requests a
    /// stop-ack frame back.
    pub async fn send_stop_notify(&self, want_ack: bool) {
        let notify = StopNotify {
            is_ret: i32::from(want_ack),
        };
        self.send_json(message_id::STOP_NOTIFY, &notify).await;
    }

    // --- heartbeat sub-protocol, driven by the tick scheduler ---

    /// Send the fixed heartbeat frame and stamp the send time.
    pub async fn send_heartbeat(&self) {
        if let Err(error) = self
            .send_frame(message_id::HEARTBEAT, message_id::HEARTBEAT_PAYLOAD)
            .await
        {
            tracing::warn!(remote_id = self.remote_id, %error, "Heartbeat send failed");
        }
        self.heartbeat.lock().last_sent = Some(Instant::now());
    }

    /// Count one miss per elapsed timeout window; at
    /// [`MAX_MISSED_HEARTBEATS`] force the transport closed so the read loop
    /// reconnects. Restamping on each miss spaces the checks instead of
    /// accumulating one miss per tick.
    pub async fn check_timeout(&self) {
        let close_now = {
            let mut state = self.heartbeat.lock();
            let Some(last_sent) = state.last_sent else {
                return;
            };
            let now = Instant::now();
            if now <= last_sent + HEARTBEAT_TIMEOUT {
                return;
            }
            state.missed += 1;
            state.last_sent = Some(now);
            if state.missed >= MAX_MISSED_HEARTBEATS {
                state.missed = 0;
                state.last_sent = None;
                true
            } else {
                false
            }
        };

        if close_now {
            tracing::error!(
                remote_id = self.remote_id,
                addr = %self.addr,
                "Heartbeat timed out, forcing reconnect"
            );
            if let Some(transport) = self.current_transport() {
                transport.close().await;
            }
        }
    }

    /// Any reply fully resets timeout tracking, however many misses were
    /// already counted.
    pub fn on_heartbeat_reply(&self) {
        let mut state = self.heartbeat.lock();
        state.last_sent = None;
        state.missed = 0;
    }

    /// Current miss count (observability and tests)
    #[must_use]
    pub fn missed_heartbeats(&self) -> u32 {
        self.heartbeat.lock().missed
    }
}

impl std::fmt::Debug for GatewayLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayLink")
            .field("remote_id", &self.remote_id)
            .field("remote_type", &self.remote_type)
            .field("addr", &self.addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}
