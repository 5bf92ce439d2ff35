//! Offer ledger model and DTOs.

use repairlink_core::types::{Amount, DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::service_request::ServiceRequest;
use crate::models::status::{OfferStatus, StatusId};

/// A row from the `service_request_offers` table.
///
/// Exactly one of `technician_id` / `client_id` is set: a null
/// `technician_id` marks a client-origin counter-offer.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ServiceRequestOffer {
    pub id: DbId,
    pub service_request_id: DbId,
    pub technician_id: Option<DbId>,
    pub client_id: Option<DbId>,
    pub price: Amount,
    pub status_id: StatusId,
    pub comment: Option<String>,
    pub created_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

impl ServiceRequestOffer {
    pub fn status(&self) -> Option<OfferStatus> {
        OfferStatus::from_id(self.status_id)
    }

    pub fn is_pending(&self) -> bool {
        self.status_id == OfferStatus::Pending.id()
    }

    pub fn is_from_client(&self) -> bool {
        self.technician_id.is_none()
    }
}

/// Insert DTO for a new ledger row.
#[derive(Debug, Clone)]
pub struct NewOffer {
    pub service_request_id: DbId,
    pub technician_id: Option<DbId>,
    pub client_id: Option<DbId>,
    pub price: Amount,
    pub comment: Option<String>,
    pub created_at: Timestamp,
}

/// Result of placing an offer: the request after its guarded status update
/// and the new ledger row.
#[derive(Debug, Clone)]
pub struct OfferPlacement {
    pub request: ServiceRequest,
    pub offer: ServiceRequestOffer,
}

/// Result of accepting one offer: the updated request, the winner, and every
/// sibling that was forced to `Rejected` in the same transaction.
#[derive(Debug, Clone)]
pub struct OfferAcceptance {
    pub request: ServiceRequest,
    pub accepted: ServiceRequestOffer,
    pub rejected: Vec<ServiceRequestOffer>,
}

/// Result of rejecting one offer. `reopened` is set when the request fell
/// back from `Offered` to `Pending` because no technician offer is left open.
#[derive(Debug, Clone)]
pub struct OfferRejection {
    pub offer: ServiceRequestOffer,
    pub reopened: Option<ServiceRequest>,
}

/// Body for offer placement endpoints (technician offers and client
/// counter-offers).
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OfferRequest {
    #[validate(range(min = 1))]
    pub price: Amount,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}
