//! WebSocket infrastructure for real-time notifications.
//!
//! Provides the connection registry, the control-message protocol, heartbeat
//! monitoring, and the HTTP upgrade handler used by Axum routes.

mod handler;
mod heartbeat;
pub mod protocol;
pub mod registry;

pub use handler::{process_message, ws_handler};
pub use heartbeat::start_heartbeat;
pub use registry::ConnectionRegistry;
