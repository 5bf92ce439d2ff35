//! Alternative-date proposal model and DTOs.

use repairlink_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::service_request::ServiceRequest;
use crate::models::status::{ProposalStatus, StatusId};

/// A row from the `alternative_date_proposals` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct AlternativeDateProposal {
    pub id: DbId,
    pub service_request_id: DbId,
    pub technician_id: DbId,
    pub proposed_date_time: Timestamp,
    pub status_id: StatusId,
    pub comment: Option<String>,
    /// 1-based submission counter per technician and request.
    pub proposal_count: i32,
    pub created_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

impl AlternativeDateProposal {
    pub fn status(&self) -> Option<ProposalStatus> {
        ProposalStatus::from_id(self.status_id)
    }

    pub fn is_pending(&self) -> bool {
        self.status_id == ProposalStatus::Pending.id()
    }
}

/// Insert DTO for a new proposal. `proposal_count` is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub service_request_id: DbId,
    pub technician_id: DbId,
    pub proposed_date_time: Timestamp,
    pub comment: Option<String>,
    pub created_at: Timestamp,
}

/// Result of raising a proposal: the new row plus earlier open proposals from
/// the same technician that it superseded.
#[derive(Debug, Clone)]
pub struct ProposalSubmission {
    pub proposal: AlternativeDateProposal,
    pub superseded: Vec<AlternativeDateProposal>,
}

/// Result of accepting a proposal.
#[derive(Debug, Clone)]
pub struct ProposalAcceptance {
    pub request: ServiceRequest,
    pub accepted: AlternativeDateProposal,
    pub rejected: Vec<AlternativeDateProposal>,
}

/// Body for `POST /service-requests/{id}/alternative-dates`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProposeDateRequest {
    pub proposed_date_time: Timestamp,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}
