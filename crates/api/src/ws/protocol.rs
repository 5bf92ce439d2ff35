//! JSON control messages exchanged over the socket.
//!
//! Event notifications are built by the dispatcher; this module only covers
//! room and subscription management.

use repairlink_core::realtime::RoomRole;
use repairlink_core::types::DbId;
use serde::{Deserialize, Serialize};

/// Messages a browser sends.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the room of the identity the access token belongs to.
    JoinRoom { token: String },
    /// Leave the room of the identity the access token belongs to.
    LeaveRoom { token: String },
    Subscribe { events: Vec<String> },
    Unsubscribe { events: Vec<String> },
}

/// Control replies sent back to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RoomJoined { role: RoomRole, identity_id: DbId },
    RoomLeft { role: RoomRole, identity_id: DbId },
    /// The connection's full subscription set after the change.
    Subscriptions { events: Vec<&'static str> },
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}
