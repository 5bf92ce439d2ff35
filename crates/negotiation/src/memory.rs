//! In-memory adapters used by tests and local development.
//!
//! [`InMemoryStore`] serializes every call behind one mutex, which gives the
//! same compare-and-set behaviour as the SQL statements in `repairlink-db`.
//! [`StaticDirectory`] serves fixed identities, appliances and specialties.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use repairlink_core::directory::{
    ApplianceCatalog, ApplianceInfo, Identity, IdentityProvider, SpecialtyIndex,
};
use repairlink_core::error::CoreError;
use repairlink_core::types::{DbId, Timestamp};
use repairlink_db::models::alternative_date::{
    AlternativeDateProposal, NewProposal, ProposalAcceptance, ProposalSubmission,
};
use repairlink_db::models::offer::{
    NewOffer, OfferAcceptance, OfferPlacement, OfferRejection, ServiceRequestOffer,
};
use repairlink_db::models::service_request::{NewServiceRequest, RequestChange, ServiceRequest};
use repairlink_db::models::status::{OfferStatus, ProposalStatus, RequestStatus};
use repairlink_db::repositories::ClosedTransition;
use tokio::sync::Mutex;

use crate::store::MarketStore;

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    requests: BTreeMap<DbId, ServiceRequest>,
    offers: BTreeMap<DbId, ServiceRequestOffer>,
    proposals: BTreeMap<DbId, AlternativeDateProposal>,
    last_request_id: DbId,
    last_offer_id: DbId,
    last_proposal_id: DbId,
}

fn next_id(counter: &mut DbId) -> DbId {
    *counter += 1;
    *counter
}

fn has_status(row: &ServiceRequest, statuses: &[RequestStatus]) -> bool {
    statuses.iter().any(|s| s.id() == row.status_id)
}

fn newest_first<T, F>(rows: &mut [T], key: F)
where
    F: Fn(&T) -> (Timestamp, DbId),
{
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
}

impl MemoryState {
    fn transition(
        &mut self,
        id: DbId,
        from: &[RequestStatus],
        to: RequestStatus,
        change: &RequestChange,
        now: Timestamp,
    ) -> Option<ServiceRequest> {
        let row = self.requests.get_mut(&id)?;
        if !has_status(row, from) {
            return None;
        }
        change.apply(row, to, now);
        Some(row.clone())
    }

    fn reject_pending_offers(
        &mut self,
        service_request_id: DbId,
        technician_id: Option<DbId>,
        now: Timestamp,
    ) -> Vec<ServiceRequestOffer> {
        let mut rejected = Vec::new();
        for offer in self.offers.values_mut() {
            if offer.service_request_id == service_request_id
                && offer.is_pending()
                && technician_id.map_or(true, |t| offer.technician_id == Some(t))
            {
                offer.status_id = OfferStatus::Rejected.id();
                offer.resolved_at = Some(now);
                rejected.push(offer.clone());
            }
        }
        rejected
    }

    fn reject_pending_proposals(
        &mut self,
        service_request_id: DbId,
        technician_id: Option<DbId>,
        now: Timestamp,
    ) -> Vec<AlternativeDateProposal> {
        let mut rejected = Vec::new();
        for proposal in self.proposals.values_mut() {
            if proposal.service_request_id == service_request_id
                && proposal.is_pending()
                && technician_id.map_or(true, |t| proposal.technician_id == t)
            {
                proposal.status_id = ProposalStatus::Rejected.id();
                proposal.resolved_at = Some(now);
                rejected.push(proposal.clone());
            }
        }
        rejected
    }

    fn pending_offer(&self, service_request_id: DbId, offer_id: DbId) -> bool {
        self.offers
            .get(&offer_id)
            .is_some_and(|o| o.service_request_id == service_request_id && o.is_pending())
    }

    fn pending_proposal(&self, service_request_id: DbId, proposal_id: DbId) -> bool {
        self.proposals
            .get(&proposal_id)
            .is_some_and(|p| p.service_request_id == service_request_id && p.is_pending())
    }

    fn expire(&mut self, id: DbId, now: Timestamp) -> Option<ServiceRequest> {
        let row = self.requests.get_mut(&id)?;
        if !row.is_overdue(now) {
            return None;
        }
        row.status_id = RequestStatus::Expired.id();
        row.cancelled_at = row.cancelled_at.or(Some(now));
        row.updated_at = now;
        let expired = row.clone();
        self.reject_pending_offers(id, None, now);
        Some(expired)
    }
}

/// Process-local [`MarketStore`].
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarketStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), sqlx::Error> {
        Ok(())
    }

    async fn insert_request(
        &self,
        input: &NewServiceRequest,
    ) -> Result<ServiceRequest, sqlx::Error> {
        let mut state = self.state.lock().await;
        let id = next_id(&mut state.last_request_id);
        let row = ServiceRequest {
            id,
            client_id: input.client_id,
            appliance_id: input.appliance_id,
            description: input.description.clone(),
            client_price: input.client_price,
            technician_price: None,
            final_price: None,
            status_id: RequestStatus::Pending.id(),
            technician_id: None,
            schedule_comment: None,
            expires_at: Some(input.expires_at),
            accepted_at: None,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            created_at: input.created_at,
            updated_at: input.created_at,
        };
        state.requests.insert(id, row.clone());
        Ok(row)
    }

    async fn find_request(&self, id: DbId) -> Result<Option<ServiceRequest>, sqlx::Error> {
        Ok(self.state.lock().await.requests.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: DbId,
        from: &[RequestStatus],
        to: RequestStatus,
        change: &RequestChange,
        now: Timestamp,
    ) -> Result<Option<ServiceRequest>, sqlx::Error> {
        Ok(self.state.lock().await.transition(id, from, to, change, now))
    }

    async fn transition_closing_ledgers(
        &self,
        id: DbId,
        from: &[RequestStatus],
        to: RequestStatus,
        change: &RequestChange,
        now: Timestamp,
    ) -> Result<Option<ClosedTransition>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let Some(request) = state.transition(id, from, to, change, now) else {
            return Ok(None);
        };
        let rejected_offers = state.reject_pending_offers(id, None, now);
        let rejected_proposals = state.reject_pending_proposals(id, None, now);
        Ok(Some(ClosedTransition {
            request,
            rejected_offers,
            rejected_proposals,
        }))
    }

    async fn list_open(&self, now: Timestamp) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .requests
            .values()
            .filter(|r| {
                r.status_id == RequestStatus::Pending.id()
                    && r.expires_at.is_some_and(|at| at > now)
            })
            .cloned()
            .collect();
        newest_first(&mut rows, |r| (r.created_at, r.id));
        Ok(rows)
    }

    async fn list_by_client(&self, client_id: DbId) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .requests
            .values()
            .filter(|r| r.client_id == client_id)
            .cloned()
            .collect();
        newest_first(&mut rows, |r| (r.created_at, r.id));
        Ok(rows)
    }

    async fn list_by_technician(
        &self,
        technician_id: DbId,
    ) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .requests
            .values()
            .filter(|r| r.technician_id == Some(technician_id))
            .cloned()
            .collect();
        newest_first(&mut rows, |r| (r.created_at, r.id));
        Ok(rows)
    }

    async fn expire_if_overdue(
        &self,
        id: DbId,
        now: Timestamp,
    ) -> Result<Option<ServiceRequest>, sqlx::Error> {
        Ok(self.state.lock().await.expire(id, now))
    }

    async fn expire_overdue(&self, now: Timestamp) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let overdue: Vec<DbId> = state
            .requests
            .values()
            .filter(|r| r.is_overdue(now))
            .map(|r| r.id)
            .collect();
        Ok(overdue
            .into_iter()
            .filter_map(|id| state.expire(id, now))
            .collect())
    }

    async fn place_offer(
        &self,
        input: &NewOffer,
        from: &[RequestStatus],
        to: Option<RequestStatus>,
    ) -> Result<Option<OfferPlacement>, sqlx::Error> {
        let mut state = self.state.lock().await;

        // Mirrors the partial unique index on open technician offers.
        if let Some(technician_id) = input.technician_id {
            let duplicate = state.offers.values().any(|o| {
                o.service_request_id == input.service_request_id
                    && o.technician_id == Some(technician_id)
                    && o.is_pending()
            });
            if duplicate {
                return Ok(None);
            }
        }

        let Some(request) = state.requests.get_mut(&input.service_request_id) else {
            return Ok(None);
        };
        if !has_status(request, from) {
            return Ok(None);
        }
        if let Some(to) = to {
            request.status_id = to.id();
            request.updated_at = input.created_at;
        }
        let request = request.clone();

        let id = next_id(&mut state.last_offer_id);
        let offer = ServiceRequestOffer {
            id,
            service_request_id: input.service_request_id,
            technician_id: input.technician_id,
            client_id: input.client_id,
            price: input.price,
            status_id: OfferStatus::Pending.id(),
            comment: input.comment.clone(),
            created_at: input.created_at,
            resolved_at: None,
        };
        state.offers.insert(id, offer.clone());
        Ok(Some(OfferPlacement { request, offer }))
    }

    async fn find_offer(&self, id: DbId) -> Result<Option<ServiceRequestOffer>, sqlx::Error> {
        Ok(self.state.lock().await.offers.get(&id).cloned())
    }

    async fn list_offers(
        &self,
        service_request_id: DbId,
    ) -> Result<Vec<ServiceRequestOffer>, sqlx::Error> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .offers
            .values()
            .filter(|o| o.service_request_id == service_request_id)
            .cloned()
            .collect();
        newest_first(&mut rows, |o| (o.created_at, o.id));
        Ok(rows)
    }

    async fn accept_offer(
        &self,
        service_request_id: DbId,
        offer_id: DbId,
        from: &[RequestStatus],
        change: &RequestChange,
        now: Timestamp,
    ) -> Result<Option<OfferAcceptance>, sqlx::Error> {
        let mut state = self.state.lock().await;

        let request_ready = state
            .requests
            .get(&service_request_id)
            .is_some_and(|r| has_status(r, from));
        if !request_ready || !state.pending_offer(service_request_id, offer_id) {
            return Ok(None);
        }

        let Some(offer) = state.offers.get_mut(&offer_id) else {
            return Ok(None);
        };
        offer.status_id = OfferStatus::Accepted.id();
        offer.resolved_at = Some(now);
        let accepted = offer.clone();

        let Some(request) =
            state.transition(service_request_id, from, RequestStatus::Accepted, change, now)
        else {
            return Ok(None);
        };
        let rejected = state.reject_pending_offers(service_request_id, None, now);

        Ok(Some(OfferAcceptance {
            request,
            accepted,
            rejected,
        }))
    }

    async fn reject_offer(
        &self,
        service_request_id: DbId,
        offer_id: DbId,
        now: Timestamp,
    ) -> Result<Option<OfferRejection>, sqlx::Error> {
        let mut state = self.state.lock().await;
        if !state.pending_offer(service_request_id, offer_id) {
            return Ok(None);
        }
        let Some(offer) = state.offers.get_mut(&offer_id) else {
            return Ok(None);
        };
        offer.status_id = OfferStatus::Rejected.id();
        offer.resolved_at = Some(now);
        let offer = offer.clone();

        let open_technician_offers = state.offers.values().any(|o| {
            o.service_request_id == service_request_id && o.is_pending() && !o.is_from_client()
        });
        let reopened = if open_technician_offers {
            None
        } else {
            state.transition(
                service_request_id,
                &[RequestStatus::Offered],
                RequestStatus::Pending,
                &RequestChange::default(),
                now,
            )
        };

        Ok(Some(OfferRejection { offer, reopened }))
    }

    async fn propose_date(
        &self,
        input: &NewProposal,
    ) -> Result<Option<ProposalSubmission>, sqlx::Error> {
        let mut state = self.state.lock().await;

        let eligible = state.requests.get(&input.service_request_id).is_some_and(|r| {
            r.status_id == RequestStatus::Scheduled.id()
                && r.technician_id == Some(input.technician_id)
        });
        if !eligible {
            return Ok(None);
        }

        let superseded = state.reject_pending_proposals(
            input.service_request_id,
            Some(input.technician_id),
            input.created_at,
        );
        let proposal_count = state
            .proposals
            .values()
            .filter(|p| {
                p.service_request_id == input.service_request_id
                    && p.technician_id == input.technician_id
            })
            .map(|p| p.proposal_count)
            .max()
            .unwrap_or(0)
            + 1;

        let id = next_id(&mut state.last_proposal_id);
        let proposal = AlternativeDateProposal {
            id,
            service_request_id: input.service_request_id,
            technician_id: input.technician_id,
            proposed_date_time: input.proposed_date_time,
            status_id: ProposalStatus::Pending.id(),
            comment: input.comment.clone(),
            proposal_count,
            created_at: input.created_at,
            resolved_at: None,
        };
        state.proposals.insert(id, proposal.clone());
        Ok(Some(ProposalSubmission {
            proposal,
            superseded,
        }))
    }

    async fn find_proposal(
        &self,
        id: DbId,
    ) -> Result<Option<AlternativeDateProposal>, sqlx::Error> {
        Ok(self.state.lock().await.proposals.get(&id).cloned())
    }

    async fn list_proposals(
        &self,
        service_request_id: DbId,
    ) -> Result<Vec<AlternativeDateProposal>, sqlx::Error> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state
            .proposals
            .values()
            .filter(|p| p.service_request_id == service_request_id)
            .cloned()
            .collect();
        newest_first(&mut rows, |p| (p.created_at, p.id));
        Ok(rows)
    }

    async fn accept_proposal(
        &self,
        service_request_id: DbId,
        proposal_id: DbId,
        now: Timestamp,
    ) -> Result<Option<ProposalAcceptance>, sqlx::Error> {
        let mut state = self.state.lock().await;

        let scheduled = state
            .requests
            .get(&service_request_id)
            .is_some_and(|r| r.status_id == RequestStatus::Scheduled.id());
        if !scheduled || !state.pending_proposal(service_request_id, proposal_id) {
            return Ok(None);
        }

        let Some(proposal) = state.proposals.get_mut(&proposal_id) else {
            return Ok(None);
        };
        proposal.status_id = ProposalStatus::Accepted.id();
        proposal.resolved_at = Some(now);
        let accepted = proposal.clone();

        let change = RequestChange {
            scheduled_at: Some(accepted.proposed_date_time),
            ..Default::default()
        };
        let Some(request) = state.transition(
            service_request_id,
            &[RequestStatus::Scheduled],
            RequestStatus::Scheduled,
            &change,
            now,
        ) else {
            return Ok(None);
        };
        let rejected = state.reject_pending_proposals(service_request_id, None, now);

        Ok(Some(ProposalAcceptance {
            request,
            accepted,
            rejected,
        }))
    }

    async fn reject_proposal(
        &self,
        service_request_id: DbId,
        proposal_id: DbId,
        now: Timestamp,
    ) -> Result<Option<AlternativeDateProposal>, sqlx::Error> {
        let mut state = self.state.lock().await;
        if !state.pending_proposal(service_request_id, proposal_id) {
            return Ok(None);
        }
        Ok(state.proposals.get_mut(&proposal_id).map(|proposal| {
            proposal.status_id = ProposalStatus::Rejected.id();
            proposal.resolved_at = Some(now);
            proposal.clone()
        }))
    }
}

// ---------------------------------------------------------------------------
// StaticDirectory
// ---------------------------------------------------------------------------

/// Fixed collaborator data, built up front with the `with_*` methods.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    users: HashMap<DbId, Identity>,
    appliances: HashMap<DbId, ApplianceInfo>,
    specialties: Vec<(DbId, String)>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, id: DbId, role: &str, display_name: &str) -> Self {
        self.users.insert(
            id,
            Identity {
                id,
                role: role.to_string(),
                display_name: display_name.to_string(),
            },
        );
        self
    }

    pub fn with_appliance(mut self, id: DbId, appliance_type: &str, brand: &str, model: &str) -> Self {
        self.appliances.insert(
            id,
            ApplianceInfo {
                id,
                appliance_type: appliance_type.to_string(),
                brand: brand.to_string(),
                model: model.to_string(),
            },
        );
        self
    }

    pub fn with_specialty(mut self, technician_id: DbId, appliance_type: &str) -> Self {
        self.specialties
            .push((technician_id, appliance_type.to_string()));
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticDirectory {
    async fn resolve(&self, user_id: DbId) -> Result<Option<Identity>, CoreError> {
        Ok(self.users.get(&user_id).cloned())
    }
}

#[async_trait]
impl ApplianceCatalog for StaticDirectory {
    async fn get(&self, appliance_id: DbId) -> Result<Option<ApplianceInfo>, CoreError> {
        Ok(self.appliances.get(&appliance_id).cloned())
    }
}

#[async_trait]
impl SpecialtyIndex for StaticDirectory {
    async fn specialties_of(&self, technician_id: DbId) -> Result<Vec<String>, CoreError> {
        Ok(self
            .specialties
            .iter()
            .filter(|(t, _)| *t == technician_id)
            .map(|(_, kind)| kind.clone())
            .collect())
    }

    async fn technicians_for(&self, appliance_type: &str) -> Result<Vec<DbId>, CoreError> {
        let mut ids: Vec<DbId> = self
            .specialties
            .iter()
            .filter(|(_, kind)| kind == appliance_type)
            .map(|(t, _)| *t)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}
