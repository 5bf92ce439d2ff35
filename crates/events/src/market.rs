//! Typed marketplace lifecycle events.
//!
//! Each variant maps one-to-one onto a realtime message kind from
//! [`repairlink_core::realtime`]. Events carry row snapshots taken right
//! after the commit that produced them; recipients are resolved later by
//! the dispatcher.

use repairlink_core::realtime::{
    MSG_TYPE_ALT_DATE_ACCEPTED, MSG_TYPE_ALT_DATE_PROPOSED, MSG_TYPE_ALT_DATE_REJECTED,
    MSG_TYPE_CALENDAR_UPDATED, MSG_TYPE_NEW_REQUEST, MSG_TYPE_OFFER_ACCEPTED,
    MSG_TYPE_OFFER_RECEIVED, MSG_TYPE_OFFER_REJECTED, MSG_TYPE_PRICE_UPDATED,
    MSG_TYPE_REQUEST_UNAVAILABLE, MSG_TYPE_REQUEST_UPDATED,
};
use repairlink_core::types::DbId;
use repairlink_db::models::alternative_date::AlternativeDateProposal;
use repairlink_db::models::offer::ServiceRequestOffer;
use repairlink_db::models::service_request::ServiceRequest;
use serde::Serialize;

/// Which participants of a request an event is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// The owning client.
    Client,
    /// The assigned technician, if any.
    Assignee,
    /// Both of the above.
    Both,
}

impl Audience {
    pub fn includes_client(self) -> bool {
        matches!(self, Audience::Client | Audience::Both)
    }

    pub fn includes_assignee(self) -> bool {
        matches!(self, Audience::Assignee | Audience::Both)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketEvent {
    /// A request was posted. Goes to technicians with a matching specialty.
    NewRequestAvailable { request: ServiceRequest },

    RequestUpdated {
        request: ServiceRequest,
        audience: Audience,
    },

    /// The request left the open pool. Goes to eligible technicians except
    /// `except` (normally the new assignee).
    RequestUnavailable {
        request: ServiceRequest,
        except: Option<DbId>,
    },

    OfferReceived {
        request: ServiceRequest,
        offer: ServiceRequestOffer,
    },

    /// Goes to the offer's author.
    OfferAccepted {
        request: ServiceRequest,
        offer: ServiceRequestOffer,
    },

    /// Goes to the offer's author.
    OfferRejected {
        request: ServiceRequest,
        offer: ServiceRequestOffer,
    },

    /// The client changed the asking price or countered. `offer` is set for
    /// counter-offers.
    PriceUpdated {
        request: ServiceRequest,
        offer: Option<ServiceRequestOffer>,
    },

    CalendarUpdated {
        request: ServiceRequest,
        audience: Audience,
    },

    AlternativeDateProposed {
        request: ServiceRequest,
        proposal: AlternativeDateProposal,
    },

    AlternativeDateAccepted {
        request: ServiceRequest,
        proposal: AlternativeDateProposal,
    },

    AlternativeDateRejected {
        request: ServiceRequest,
        proposal: AlternativeDateProposal,
    },
}

impl MarketEvent {
    /// Realtime message kind this event is delivered as.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketEvent::NewRequestAvailable { .. } => MSG_TYPE_NEW_REQUEST,
            MarketEvent::RequestUpdated { .. } => MSG_TYPE_REQUEST_UPDATED,
            MarketEvent::RequestUnavailable { .. } => MSG_TYPE_REQUEST_UNAVAILABLE,
            MarketEvent::OfferReceived { .. } => MSG_TYPE_OFFER_RECEIVED,
            MarketEvent::OfferAccepted { .. } => MSG_TYPE_OFFER_ACCEPTED,
            MarketEvent::OfferRejected { .. } => MSG_TYPE_OFFER_REJECTED,
            MarketEvent::PriceUpdated { .. } => MSG_TYPE_PRICE_UPDATED,
            MarketEvent::CalendarUpdated { .. } => MSG_TYPE_CALENDAR_UPDATED,
            MarketEvent::AlternativeDateProposed { .. } => MSG_TYPE_ALT_DATE_PROPOSED,
            MarketEvent::AlternativeDateAccepted { .. } => MSG_TYPE_ALT_DATE_ACCEPTED,
            MarketEvent::AlternativeDateRejected { .. } => MSG_TYPE_ALT_DATE_REJECTED,
        }
    }

    /// Request snapshot every event carries.
    pub fn request(&self) -> &ServiceRequest {
        match self {
            MarketEvent::NewRequestAvailable { request }
            | MarketEvent::RequestUpdated { request, .. }
            | MarketEvent::RequestUnavailable { request, .. }
            | MarketEvent::OfferReceived { request, .. }
            | MarketEvent::OfferAccepted { request, .. }
            | MarketEvent::OfferRejected { request, .. }
            | MarketEvent::PriceUpdated { request, .. }
            | MarketEvent::CalendarUpdated { request, .. }
            | MarketEvent::AlternativeDateProposed { request, .. }
            | MarketEvent::AlternativeDateAccepted { request, .. }
            | MarketEvent::AlternativeDateRejected { request, .. } => request,
        }
    }

    pub fn offer(&self) -> Option<&ServiceRequestOffer> {
        match self {
            MarketEvent::OfferReceived { offer, .. }
            | MarketEvent::OfferAccepted { offer, .. }
            | MarketEvent::OfferRejected { offer, .. } => Some(offer),
            MarketEvent::PriceUpdated { offer, .. } => offer.as_ref(),
            _ => None,
        }
    }

    pub fn proposal(&self) -> Option<&AlternativeDateProposal> {
        match self {
            MarketEvent::AlternativeDateProposed { proposal, .. }
            | MarketEvent::AlternativeDateAccepted { proposal, .. }
            | MarketEvent::AlternativeDateRejected { proposal, .. } => Some(proposal),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Utc;
    use repairlink_db::models::status::{OfferStatus, RequestStatus};

    use super::*;

    pub(crate) fn sample_request(id: DbId) -> ServiceRequest {
        let now = Utc::now();
        ServiceRequest {
            id,
            client_id: 1,
            appliance_id: 2,
            description: "Dishwasher leaks".to_string(),
            client_price: 80,
            technician_price: None,
            final_price: None,
            status_id: RequestStatus::Pending.id(),
            technician_id: None,
            schedule_comment: None,
            expires_at: Some(now),
            accepted_at: None,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_offer(request_id: DbId) -> ServiceRequestOffer {
        ServiceRequestOffer {
            id: 9,
            service_request_id: request_id,
            technician_id: Some(4),
            client_id: None,
            price: 95,
            status_id: OfferStatus::Pending.id(),
            comment: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    #[test]
    fn kind_matches_realtime_message_type() {
        let event = MarketEvent::NewRequestAvailable {
            request: sample_request(1),
        };
        assert_eq!(event.kind(), "new_request_available");

        let event = MarketEvent::CalendarUpdated {
            request: sample_request(1),
            audience: Audience::Both,
        };
        assert_eq!(event.kind(), "calendar_updated");
    }

    #[test]
    fn accessors_expose_attached_rows() {
        let event = MarketEvent::OfferReceived {
            request: sample_request(3),
            offer: sample_offer(3),
        };
        assert_eq!(event.request().id, 3);
        assert_eq!(event.offer().map(|o| o.price), Some(95));
        assert!(event.proposal().is_none());

        let counter = MarketEvent::PriceUpdated {
            request: sample_request(3),
            offer: None,
        };
        assert!(counter.offer().is_none());
    }

    #[test]
    fn audience_membership() {
        assert!(Audience::Both.includes_client());
        assert!(Audience::Both.includes_assignee());
        assert!(!Audience::Client.includes_assignee());
        assert!(!Audience::Assignee.includes_client());
    }

    #[test]
    fn serializes_with_kind_tag() {
        let event = MarketEvent::RequestUnavailable {
            request: sample_request(5),
            except: Some(4),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "request_unavailable");
        assert_eq!(json["request"]["id"], 5);
        assert_eq!(json["except"], 4);
    }
}
