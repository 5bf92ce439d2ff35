//! Persistence port for the lifecycle engine.
//!
//! Every mutating method is a guarded write: it returns `Ok(None)` when the
//! precondition (expected statuses, pending ledger row, assignee) no longer
//! holds, and the engine reports that as a conflict. Multi-row effects are
//! atomic within a single call.

use async_trait::async_trait;
use repairlink_core::types::{DbId, Timestamp};
use repairlink_db::models::alternative_date::{
    AlternativeDateProposal, NewProposal, ProposalAcceptance, ProposalSubmission,
};
use repairlink_db::models::offer::{
    NewOffer, OfferAcceptance, OfferPlacement, OfferRejection, ServiceRequestOffer,
};
use repairlink_db::models::service_request::{NewServiceRequest, RequestChange, ServiceRequest};
use repairlink_db::models::status::RequestStatus;
use repairlink_db::repositories::ClosedTransition;

#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn health_check(&self) -> Result<(), sqlx::Error>;

    // ----- Service requests -----

    async fn insert_request(&self, input: &NewServiceRequest)
        -> Result<ServiceRequest, sqlx::Error>;

    async fn find_request(&self, id: DbId) -> Result<Option<ServiceRequest>, sqlx::Error>;

    /// Guarded status change. `now` stamps `updated_at` where the store does
    /// not maintain it itself.
    async fn transition(
        &self,
        id: DbId,
        from: &[RequestStatus],
        to: RequestStatus,
        change: &RequestChange,
        now: Timestamp,
    ) -> Result<Option<ServiceRequest>, sqlx::Error>;

    /// Guarded transition that also rejects every open offer and proposal.
    async fn transition_closing_ledgers(
        &self,
        id: DbId,
        from: &[RequestStatus],
        to: RequestStatus,
        change: &RequestChange,
        now: Timestamp,
    ) -> Result<Option<ClosedTransition>, sqlx::Error>;

    /// `Pending` requests with `expires_at > now`, newest first.
    async fn list_open(&self, now: Timestamp) -> Result<Vec<ServiceRequest>, sqlx::Error>;

    async fn list_by_client(&self, client_id: DbId) -> Result<Vec<ServiceRequest>, sqlx::Error>;

    async fn list_by_technician(
        &self,
        technician_id: DbId,
    ) -> Result<Vec<ServiceRequest>, sqlx::Error>;

    async fn expire_if_overdue(
        &self,
        id: DbId,
        now: Timestamp,
    ) -> Result<Option<ServiceRequest>, sqlx::Error>;

    async fn expire_overdue(&self, now: Timestamp) -> Result<Vec<ServiceRequest>, sqlx::Error>;

    // ----- Offer ledger -----

    async fn place_offer(
        &self,
        input: &NewOffer,
        from: &[RequestStatus],
        to: Option<RequestStatus>,
    ) -> Result<Option<OfferPlacement>, sqlx::Error>;

    async fn find_offer(&self, id: DbId) -> Result<Option<ServiceRequestOffer>, sqlx::Error>;

    /// Offers on a request, newest first.
    async fn list_offers(
        &self,
        service_request_id: DbId,
    ) -> Result<Vec<ServiceRequestOffer>, sqlx::Error>;

    async fn accept_offer(
        &self,
        service_request_id: DbId,
        offer_id: DbId,
        from: &[RequestStatus],
        change: &RequestChange,
        now: Timestamp,
    ) -> Result<Option<OfferAcceptance>, sqlx::Error>;

    async fn reject_offer(
        &self,
        service_request_id: DbId,
        offer_id: DbId,
        now: Timestamp,
    ) -> Result<Option<OfferRejection>, sqlx::Error>;

    // ----- Alternative-date ledger -----

    async fn propose_date(
        &self,
        input: &NewProposal,
    ) -> Result<Option<ProposalSubmission>, sqlx::Error>;

    async fn find_proposal(
        &self,
        id: DbId,
    ) -> Result<Option<AlternativeDateProposal>, sqlx::Error>;

    /// Proposals on a request, newest first.
    async fn list_proposals(
        &self,
        service_request_id: DbId,
    ) -> Result<Vec<AlternativeDateProposal>, sqlx::Error>;

    async fn accept_proposal(
        &self,
        service_request_id: DbId,
        proposal_id: DbId,
        now: Timestamp,
    ) -> Result<Option<ProposalAcceptance>, sqlx::Error>;

    async fn reject_proposal(
        &self,
        service_request_id: DbId,
        proposal_id: DbId,
        now: Timestamp,
    ) -> Result<Option<AlternativeDateProposal>, sqlx::Error>;
}
