//! # svrlink-net
//!
//! Link management for a backend process: persistent outbound gateway links
//! with automatic reconnection and heartbeat liveness, a concurrency-safe
//! link registry, a single-intake message dispatcher, and the fixed-interval
//! tick scheduler that drives maintenance.

pub mod dispatcher;
pub mod error;
pub mod link;
pub mod registry;
pub mod scheduler;
pub mod transport;

pub use dispatcher::{DispatchQueue, Dispatcher, HandlerTable, PendingMessage};
pub use error::NetError;
pub use link::GatewayLink;
pub use registry::LinkRegistry;
pub use scheduler::{MaintenanceTicker, TickHandler, TickScheduler};
pub use transport::{Dialer, TcpDialer, TcpTransport, Transport};
