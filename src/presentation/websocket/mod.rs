//! WebSocket Gateway
//!
//! Real-time push connections, the registry tracking them and the inbound
//! frame protocol.

pub mod connection;
pub mod handler;
pub mod lifecycle;
pub mod protocol;
pub mod registry;

pub use connection::Connection;
pub use handler::ws_handler;
pub use protocol::ClientMessage;
pub use registry::{ConnectionRegistry, DeliveryOutcome, ReplayOutcome};
