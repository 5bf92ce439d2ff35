//! WebSocket message type constants and room addressing.
//!
//! Used by the event dispatcher when pushing lifecycle notifications to
//! connected parties, and by the socket handler for control replies.

use serde::{Deserialize, Serialize};

use crate::roles::{ROLE_CLIENT, ROLE_TECHNICIAN};

/// A request matching the technician's specialties was posted.
pub const MSG_TYPE_NEW_REQUEST: &str = "new_request_available";

/// A request the recipient participates in changed state.
pub const MSG_TYPE_REQUEST_UPDATED: &str = "request_updated";

/// A request can no longer be taken (accepted elsewhere, cancelled, expired).
pub const MSG_TYPE_REQUEST_UNAVAILABLE: &str = "request_unavailable";

/// A technician placed an offer on the client's request.
pub const MSG_TYPE_OFFER_RECEIVED: &str = "offer_received";

/// The recipient's offer won.
pub const MSG_TYPE_OFFER_ACCEPTED: &str = "offer_accepted";

/// The recipient's offer was declined or lost to a sibling.
pub const MSG_TYPE_OFFER_REJECTED: &str = "offer_rejected";

/// The client changed the asking price or posted a counter-offer.
pub const MSG_TYPE_PRICE_UPDATED: &str = "price_updated";

/// The scheduled visit time was set or moved.
pub const MSG_TYPE_CALENDAR_UPDATED: &str = "calendar_updated";

/// The assigned technician proposed a different visit time.
pub const MSG_TYPE_ALT_DATE_PROPOSED: &str = "alternative_date_proposed";

/// The client accepted a proposed visit time.
pub const MSG_TYPE_ALT_DATE_ACCEPTED: &str = "alternative_date_accepted";

/// The client rejected a proposed visit time.
pub const MSG_TYPE_ALT_DATE_REJECTED: &str = "alternative_date_rejected";

/// Every event kind a connection may subscribe to.
pub const ALL_EVENT_KINDS: &[&str] = &[
    MSG_TYPE_NEW_REQUEST,
    MSG_TYPE_REQUEST_UPDATED,
    MSG_TYPE_REQUEST_UNAVAILABLE,
    MSG_TYPE_OFFER_RECEIVED,
    MSG_TYPE_OFFER_ACCEPTED,
    MSG_TYPE_OFFER_REJECTED,
    MSG_TYPE_PRICE_UPDATED,
    MSG_TYPE_CALENDAR_UPDATED,
    MSG_TYPE_ALT_DATE_PROPOSED,
    MSG_TYPE_ALT_DATE_ACCEPTED,
    MSG_TYPE_ALT_DATE_REJECTED,
];

/// Look up the canonical static name of an event kind.
pub fn event_kind(name: &str) -> Option<&'static str> {
    ALL_EVENT_KINDS.iter().copied().find(|k| *k == name)
}

/// Which side of the marketplace a room belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomRole {
    Client,
    Technician,
}

impl RoomRole {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomRole::Client => ROLE_CLIENT,
            RoomRole::Technician => ROLE_TECHNICIAN,
        }
    }

    /// Map a user role name to its room role. Admins have no room.
    pub fn from_role(role: &str) -> Option<Self> {
        match role {
            ROLE_CLIENT => Some(RoomRole::Client),
            ROLE_TECHNICIAN => Some(RoomRole::Technician),
            _ => None,
        }
    }
}
