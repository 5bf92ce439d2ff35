//! [`MarketStore`] adapter over the `repairlink-db` repositories.

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
use repairlink_db::repositories::{
    AlternativeDateRepo, ClosedTransition, OfferRepo, ServiceRequestRepo,
};
use repairlink_db::DbPool;

use crate::store::MarketStore;

#[derive(Clone)]
pub struct PgMarketStore {
    pool: DbPool,
}

impl PgMarketStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MarketStore for PgMarketStore {
    async fn health_check(&self) -> Result<(), sqlx::Error> {
        repairlink_db::health_check(&self.pool).await
    }

    async fn insert_request(
        &self,
        input: &NewServiceRequest,
    ) -> Result<ServiceRequest, sqlx::Error> {
        ServiceRequestRepo::create(&self.pool, input).await
    }

    async fn find_request(&self, id: DbId) -> Result<Option<ServiceRequest>, sqlx::Error> {
        ServiceRequestRepo::find_by_id(&self.pool, id).await
    }

    async fn transition(
        &self,
        id: DbId,
        from: &[RequestStatus],
        to: RequestStatus,
        change: &RequestChange,
        _now: Timestamp,
    ) -> Result<Option<ServiceRequest>, sqlx::Error> {
        // `updated_at` is maintained by the table trigger.
        ServiceRequestRepo::transition(&self.pool, id, from, to, change).await
    }

    async fn transition_closing_ledgers(
        &self,
        id: DbId,
        from: &[RequestStatus],
        to: RequestStatus,
        change: &RequestChange,
        now: Timestamp,
    ) -> Result<Option<ClosedTransition>, sqlx::Error> {
        ServiceRequestRepo::transition_closing_ledgers(&self.pool, id, from, to, change, now).await
    }

    async fn list_open(&self, now: Timestamp) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        ServiceRequestRepo::list_open(&self.pool, now).await
    }

    async fn list_by_client(&self, client_id: DbId) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        ServiceRequestRepo::list_by_client(&self.pool, client_id).await
    }

    async fn list_by_technician(
        &self,
        technician_id: DbId,
    ) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        ServiceRequestRepo::list_by_technician(&self.pool, technician_id).await
    }

    async fn expire_if_overdue(
        &self,
        id: DbId,
        now: Timestamp,
    ) -> Result<Option<ServiceRequest>, sqlx::Error> {
        ServiceRequestRepo::expire_if_overdue(&self.pool, id, now).await
    }

    async fn expire_overdue(&self, now: Timestamp) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        ServiceRequestRepo::expire_overdue(&self.pool, now).await
    }

    async fn place_offer(
        &self,
        input: &NewOffer,
        from: &[RequestStatus],
        to: Option<RequestStatus>,
    ) -> Result<Option<OfferPlacement>, sqlx::Error> {
        OfferRepo::place(&self.pool, input, from, to).await
    }

    async fn find_offer(&self, id: DbId) -> Result<Option<ServiceRequestOffer>, sqlx::Error> {
        OfferRepo::find_by_id(&self.pool, id).await
    }

    async fn list_offers(
        &self,
        service_request_id: DbId,
    ) -> Result<Vec<ServiceRequestOffer>, sqlx::Error> {
        OfferRepo::list_for_request(&self.pool, service_request_id).await
    }

    async fn accept_offer(
        &self,
        service_request_id: DbId,
        offer_id: DbId,
        from: &[RequestStatus],
        change: &RequestChange,
        now: Timestamp,
    ) -> Result<Option<OfferAcceptance>, sqlx::Error> {
        OfferRepo::accept(&self.pool, service_request_id, offer_id, from, change, now).await
    }

    async fn reject_offer(
        &self,
        service_request_id: DbId,
        offer_id: DbId,
        now: Timestamp,
    ) -> Result<Option<OfferRejection>, sqlx::Error> {
        OfferRepo::reject(&self.pool, service_request_id, offer_id, now).await
    }

    async fn propose_date(
        &self,
        input: &NewProposal,
    ) -> Result<Option<ProposalSubmission>, sqlx::Error> {
        AlternativeDateRepo::propose(&self.pool, input).await
    }

    async fn find_proposal(
        &self,
        id: DbId,
    ) -> Result<Option<AlternativeDateProposal>, sqlx::Error> {
        AlternativeDateRepo::find_by_id(&self.pool, id).await
    }

    async fn list_proposals(
        &self,
        service_request_id: DbId,
    ) -> Result<Vec<AlternativeDateProposal>, sqlx::Error> {
        AlternativeDateRepo::list_for_request(&self.pool, service_request_id).await
    }

    async fn accept_proposal(
        &self,
        service_request_id: DbId,
        proposal_id: DbId,
        now: Timestamp,
    ) -> Result<Option<ProposalAcceptance>, sqlx::Error> {
        AlternativeDateRepo::accept(&self.pool, service_request_id, proposal_id, now).await
    }

    async fn reject_proposal(
        &self,
        service_request_id: DbId,
        proposal_id: DbId,
        now: Timestamp,
    ) -> Result<Option<AlternativeDateProposal>, sqlx::Error> {
        AlternativeDateRepo::reject(&self.pool, service_request_id, proposal_id, now).await
    }
}
