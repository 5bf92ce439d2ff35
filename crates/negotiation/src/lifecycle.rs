//! Request lifecycle engine.
//!
//! Every command follows the same shape: resolve the actor's role, load the
//! request (expiring it first if it is overdue), check ownership and status
//! for a precise error, then issue one guarded write through the
//! [`MarketStore`]. A guarded write that matches nothing means another
//! writer got there first and is reported as [`CoreError::Conflict`].
//! Events are published only after the write has committed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use repairlink_core::directory::{
    ApplianceCatalog, Directory, Identity, IdentityProvider, SpecialtyIndex,
};
use repairlink_core::error::CoreError;
use repairlink_core::negotiation::{
    state_machine, validate_client_price, validate_comment, validate_description,
    validate_offer_price, validate_valid_minutes, DEFAULT_VALID_MINUTES,
};
use repairlink_core::roles::{ROLE_CLIENT, ROLE_TECHNICIAN};
use repairlink_core::types::{Amount, DbId};
use repairlink_db::models::alternative_date::{
    AlternativeDateProposal, NewProposal, ProposeDateRequest,
};
use repairlink_db::models::offer::{
    NewOffer, OfferAcceptance, OfferRequest, ServiceRequestOffer,
};
use repairlink_db::models::service_request::{
    CreateServiceRequest, NewServiceRequest, RequestChange, ScheduleRequest, ServiceRequest,
};
use repairlink_db::models::status::RequestStatus;
use repairlink_events::{Audience, EventBus, MarketEvent};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::error::{NegotiationError, NegotiationResult};
use crate::store::MarketStore;

/// Statuses in which a request is still being negotiated.
const OPEN: &[RequestStatus] = &[RequestStatus::Pending, RequestStatus::Offered];

/// Every non-terminal status.
const LIVE: &[RequestStatus] = &[
    RequestStatus::Pending,
    RequestStatus::Offered,
    RequestStatus::Accepted,
    RequestStatus::Scheduled,
    RequestStatus::InProgress,
];

fn conflict(message: impl Into<String>) -> NegotiationError {
    CoreError::Conflict(message.into()).into()
}

fn invalid(message: String) -> NegotiationError {
    CoreError::Validation(message).into()
}

fn stale(request_id: DbId) -> NegotiationError {
    conflict(format!(
        "Service request {request_id} was modified concurrently"
    ))
}

/// A unique-index violation on a ledger write means a concurrent writer
/// committed first.
fn lost_race(err: sqlx::Error, request_id: DbId) -> NegotiationError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => stale(request_id),
        _ => err.into(),
    }
}

/// Fail with a conflict unless the request is in one of `allowed`.
///
/// When the move to `to` is not in the transition table at all, the state
/// machine's message is used so the caller sees which edge was refused.
fn ensure_status(
    row: &ServiceRequest,
    allowed: &[RequestStatus],
    to: RequestStatus,
) -> NegotiationResult<()> {
    if allowed.iter().any(|s| s.id() == row.status_id) {
        return Ok(());
    }
    if row.status_id != to.id() {
        state_machine::validate_transition(row.status_id, to.id()).map_err(CoreError::Conflict)?;
    }
    Err(conflict(format!(
        "Service request {} is {}",
        row.id,
        state_machine::status_name(row.status_id)
    )))
}

fn ensure_owner(row: &ServiceRequest, client_id: DbId) -> NegotiationResult<()> {
    if row.is_owned_by(client_id) {
        Ok(())
    } else {
        Err(conflict(format!(
            "Service request {} does not belong to client {client_id}",
            row.id
        )))
    }
}

fn ensure_assignee(row: &ServiceRequest, technician_id: DbId) -> NegotiationResult<()> {
    if row.is_assigned_to(technician_id) {
        Ok(())
    } else {
        Err(conflict(format!(
            "Service request {} is not assigned to technician {technician_id}",
            row.id
        )))
    }
}

fn ensure_pending_offer(offer: &ServiceRequestOffer) -> NegotiationResult<()> {
    if offer.is_pending() {
        Ok(())
    } else {
        Err(conflict(format!("Offer {} is already resolved", offer.id)))
    }
}

pub struct LifecycleEngine {
    store: Arc<dyn MarketStore>,
    directory: Arc<dyn Directory>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn MarketStore>,
        directory: Arc<dyn Directory>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            directory,
            events,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the wall clock, e.g. with a [`crate::clock::ManualClock`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub async fn health_check(&self) -> NegotiationResult<()> {
        Ok(self.store.health_check().await?)
    }

    // -----------------------------------------------------------------------
    // Client commands
    // -----------------------------------------------------------------------

    /// Post a new request. It stays open for `valid_minutes` (default five).
    pub async fn create(
        &self,
        client_id: DbId,
        input: &CreateServiceRequest,
    ) -> NegotiationResult<ServiceRequest> {
        self.require_role(client_id, ROLE_CLIENT).await?;

        let valid_minutes = input.valid_minutes.unwrap_or(DEFAULT_VALID_MINUTES);
        validate_client_price(input.client_price).map_err(invalid)?;
        validate_valid_minutes(valid_minutes).map_err(invalid)?;
        validate_description(&input.description).map_err(invalid)?;

        ApplianceCatalog::get(&*self.directory, input.appliance_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "appliance",
                id: input.appliance_id,
            })?;

        let now = self.clock.now();
        let request = self
            .store
            .insert_request(&NewServiceRequest {
                client_id,
                appliance_id: input.appliance_id,
                description: input.description.trim().to_string(),
                client_price: input.client_price,
                expires_at: now + Duration::minutes(valid_minutes),
                created_at: now,
            })
            .await?;

        info!(
            request_id = request.id,
            client_id,
            client_price = request.client_price,
            valid_minutes,
            "Service request created"
        );
        self.events.publish(MarketEvent::NewRequestAvailable {
            request: request.clone(),
        });
        Ok(request)
    }

    /// Change the asking price while nobody has offered yet.
    pub async fn update_client_price(
        &self,
        request_id: DbId,
        client_id: DbId,
        new_price: Amount,
    ) -> NegotiationResult<ServiceRequest> {
        self.require_role(client_id, ROLE_CLIENT).await?;
        validate_client_price(new_price).map_err(invalid)?;

        let row = self.load(request_id).await?;
        ensure_owner(&row, client_id)?;
        ensure_status(&row, &[RequestStatus::Pending], RequestStatus::Pending)?;

        let change = RequestChange {
            client_price: Some(new_price),
            ..Default::default()
        };
        let request = self
            .store
            .transition(
                request_id,
                &[RequestStatus::Pending],
                RequestStatus::Pending,
                &change,
                self.clock.now(),
            )
            .await?
            .ok_or_else(|| stale(request_id))?;

        info!(request_id, client_id, new_price, "Client price updated");
        self.events.publish(MarketEvent::PriceUpdated {
            request: request.clone(),
            offer: None,
        });
        Ok(request)
    }

    /// Record a client-origin counter-offer while the request is open.
    pub async fn counter_offer_by_client(
        &self,
        request_id: DbId,
        client_id: DbId,
        input: &OfferRequest,
    ) -> NegotiationResult<ServiceRequestOffer> {
        self.require_role(client_id, ROLE_CLIENT).await?;
        validate_offer_price(input.price).map_err(invalid)?;
        validate_comment(input.comment.as_deref()).map_err(invalid)?;

        let row = self.load(request_id).await?;
        ensure_owner(&row, client_id)?;
        ensure_status(&row, OPEN, RequestStatus::Offered)?;

        let placement = self
            .store
            .place_offer(
                &NewOffer {
                    service_request_id: request_id,
                    technician_id: None,
                    client_id: Some(client_id),
                    price: input.price,
                    comment: input.comment.clone(),
                    created_at: self.clock.now(),
                },
                OPEN,
                None,
            )
            .await?
            .ok_or_else(|| stale(request_id))?;

        info!(
            request_id,
            client_id,
            offer_id = placement.offer.id,
            price = input.price,
            "Client counter-offer placed"
        );
        self.events.publish(MarketEvent::PriceUpdated {
            request: placement.request,
            offer: Some(placement.offer.clone()),
        });
        Ok(placement.offer)
    }

    /// Accept the most recent open technician offer.
    ///
    /// With `accept_client_price` the client's asking price becomes the final
    /// price; otherwise the offer's price does.
    pub async fn accept_by_client(
        &self,
        request_id: DbId,
        client_id: DbId,
        accept_client_price: bool,
    ) -> NegotiationResult<ServiceRequest> {
        self.require_role(client_id, ROLE_CLIENT).await?;

        let row = self.load(request_id).await?;
        ensure_owner(&row, client_id)?;
        ensure_status(&row, OPEN, RequestStatus::Accepted)?;

        let offer = self
            .store
            .list_offers(request_id)
            .await?
            .into_iter()
            .find(|o| o.is_pending() && !o.is_from_client())
            .ok_or_else(|| {
                conflict(format!(
                    "Service request {request_id} has no open technician offer"
                ))
            })?;

        let final_price = if accept_client_price {
            row.client_price
        } else {
            offer.price
        };
        let acceptance = self
            .accept_offer(&row, &offer, offer.technician_id, final_price)
            .await?;

        info!(
            request_id,
            client_id,
            offer_id = offer.id,
            final_price,
            "Offer accepted by client"
        );
        Ok(acceptance.request)
    }

    /// Accept a chosen technician offer; every sibling open offer is rejected
    /// in the same transaction.
    pub async fn accept_specific_offer(
        &self,
        request_id: DbId,
        offer_id: DbId,
        client_id: DbId,
    ) -> NegotiationResult<ServiceRequest> {
        self.require_role(client_id, ROLE_CLIENT).await?;

        let row = self.load(request_id).await?;
        ensure_owner(&row, client_id)?;
        let offer = self.load_offer(request_id, offer_id).await?;
        ensure_pending_offer(&offer)?;
        if offer.is_from_client() {
            return Err(conflict(format!(
                "Offer {offer_id} is a client counter-offer"
            )));
        }
        ensure_status(&row, OPEN, RequestStatus::Accepted)?;

        let acceptance = self
            .accept_offer(&row, &offer, offer.technician_id, offer.price)
            .await?;

        info!(
            request_id,
            client_id,
            offer_id,
            technician_id = ?acceptance.request.technician_id,
            rejected = acceptance.rejected.len(),
            "Specific offer accepted"
        );
        Ok(acceptance.request)
    }

    /// Decline one open offer. If it was the last open technician offer on
    /// an `Offered` request, the request returns to `Pending`.
    pub async fn reject_offer_by_client(
        &self,
        request_id: DbId,
        offer_id: DbId,
        client_id: DbId,
    ) -> NegotiationResult<ServiceRequestOffer> {
        self.require_role(client_id, ROLE_CLIENT).await?;

        let row = self.load(request_id).await?;
        ensure_owner(&row, client_id)?;
        let offer = self.load_offer(request_id, offer_id).await?;
        ensure_pending_offer(&offer)?;

        let rejection = self
            .store
            .reject_offer(request_id, offer_id, self.clock.now())
            .await?
            .ok_or_else(|| conflict(format!("Offer {offer_id} is already resolved")))?;

        info!(
            request_id,
            client_id,
            offer_id,
            reopened = rejection.reopened.is_some(),
            "Offer rejected by client"
        );
        let reopened = rejection.reopened.is_some();
        let request = rejection.reopened.unwrap_or(row);
        self.events.publish(MarketEvent::OfferRejected {
            request: request.clone(),
            offer: rejection.offer.clone(),
        });
        if reopened {
            self.events.publish(MarketEvent::RequestUpdated {
                request,
                audience: Audience::Client,
            });
        }
        Ok(rejection.offer)
    }

    /// Close the engagement after the visit.
    pub async fn complete_by_client(
        &self,
        request_id: DbId,
        client_id: DbId,
    ) -> NegotiationResult<ServiceRequest> {
        self.require_role(client_id, ROLE_CLIENT).await?;

        let row = self.load(request_id).await?;
        ensure_owner(&row, client_id)?;
        let from = [RequestStatus::Scheduled, RequestStatus::InProgress];
        ensure_status(&row, &from, RequestStatus::Completed)?;

        let now = self.clock.now();
        let change = RequestChange {
            completed_at: Some(now),
            ..Default::default()
        };
        let closed = self
            .store
            .transition_closing_ledgers(request_id, &from, RequestStatus::Completed, &change, now)
            .await?
            .ok_or_else(|| stale(request_id))?;

        info!(request_id, client_id, "Service request completed");
        self.events.publish(MarketEvent::RequestUpdated {
            request: closed.request.clone(),
            audience: Audience::Assignee,
        });
        Ok(closed.request)
    }

    /// Cancel from any non-terminal state. Open offers and proposals are
    /// rejected in the same transaction.
    pub async fn cancel_by_client(
        &self,
        request_id: DbId,
        client_id: DbId,
    ) -> NegotiationResult<ServiceRequest> {
        self.require_role(client_id, ROLE_CLIENT).await?;

        let row = self.load(request_id).await?;
        ensure_owner(&row, client_id)?;
        ensure_status(&row, LIVE, RequestStatus::Cancelled)?;

        let now = self.clock.now();
        let change = RequestChange {
            cancelled_at: Some(now),
            ..Default::default()
        };
        let closed = self
            .store
            .transition_closing_ledgers(request_id, LIVE, RequestStatus::Cancelled, &change, now)
            .await?
            .ok_or_else(|| stale(request_id))?;

        info!(
            request_id,
            client_id,
            rejected_offers = closed.rejected_offers.len(),
            rejected_proposals = closed.rejected_proposals.len(),
            "Service request cancelled by client"
        );

        let request = closed.request;
        for offer in closed.rejected_offers.into_iter().filter(|o| !o.is_from_client()) {
            self.events.publish(MarketEvent::OfferRejected {
                request: request.clone(),
                offer,
            });
        }
        if row.status().is_some_and(RequestStatus::is_open) {
            self.events.publish(MarketEvent::RequestUnavailable {
                request: request.clone(),
                except: None,
            });
        }
        if request.technician_id.is_some() {
            self.events.publish(MarketEvent::RequestUpdated {
                request: request.clone(),
                audience: Audience::Assignee,
            });
        }
        Ok(request)
    }

    // -----------------------------------------------------------------------
    // Technician commands
    // -----------------------------------------------------------------------

    /// First offer on a pending request: moves it to `Offered` and records
    /// the offer in the ledger. The request's technician and price fields are
    /// left alone until an offer is accepted.
    pub async fn offer_price(
        &self,
        request_id: DbId,
        technician_id: DbId,
        input: &OfferRequest,
    ) -> NegotiationResult<ServiceRequestOffer> {
        self.require_role(technician_id, ROLE_TECHNICIAN).await?;
        validate_offer_price(input.price).map_err(invalid)?;
        validate_comment(input.comment.as_deref()).map_err(invalid)?;

        let row = self.load(request_id).await?;
        self.ensure_serves(technician_id, &row).await?;
        ensure_status(&row, &[RequestStatus::Pending], RequestStatus::Offered)?;

        let offer = self
            .place_technician_offer(request_id, technician_id, input, &[RequestStatus::Pending])
            .await?;
        info!(
            request_id,
            technician_id,
            offer_id = offer.id,
            price = input.price,
            "Price offered"
        );
        Ok(offer)
    }

    /// Add an offer to a request that is pending or already has offers.
    /// A technician holds at most one open offer per request.
    pub async fn submit_offer(
        &self,
        request_id: DbId,
        technician_id: DbId,
        input: &OfferRequest,
    ) -> NegotiationResult<ServiceRequestOffer> {
        self.require_role(technician_id, ROLE_TECHNICIAN).await?;
        validate_offer_price(input.price).map_err(invalid)?;
        validate_comment(input.comment.as_deref()).map_err(invalid)?;

        let row = self.load(request_id).await?;
        self.ensure_serves(technician_id, &row).await?;
        ensure_status(&row, OPEN, RequestStatus::Offered)?;

        let already_open = self
            .store
            .list_offers(request_id)
            .await?
            .iter()
            .any(|o| o.is_pending() && o.technician_id == Some(technician_id));
        if already_open {
            return Err(conflict(format!(
                "Technician {technician_id} already has an open offer on service request {request_id}"
            )));
        }

        let offer = self
            .place_technician_offer(request_id, technician_id, input, OPEN)
            .await?;
        info!(
            request_id,
            technician_id,
            offer_id = offer.id,
            price = input.price,
            "Offer submitted"
        );
        Ok(offer)
    }

    /// Take a client counter-offer; the acting technician becomes assignee.
    pub async fn accept_counter_offer(
        &self,
        request_id: DbId,
        offer_id: DbId,
        technician_id: DbId,
    ) -> NegotiationResult<ServiceRequest> {
        self.require_role(technician_id, ROLE_TECHNICIAN).await?;

        let row = self.load(request_id).await?;
        self.ensure_serves(technician_id, &row).await?;
        let offer = self.load_offer(request_id, offer_id).await?;
        ensure_pending_offer(&offer)?;
        if !offer.is_from_client() {
            return Err(conflict(format!(
                "Offer {offer_id} is not a client counter-offer"
            )));
        }
        ensure_status(&row, OPEN, RequestStatus::Accepted)?;

        let acceptance = self
            .accept_offer(&row, &offer, Some(technician_id), offer.price)
            .await?;

        info!(
            request_id,
            technician_id,
            offer_id,
            price = offer.price,
            "Counter-offer accepted by technician"
        );
        Ok(acceptance.request)
    }

    /// Take a pending request at the client's price. The request jumps
    /// straight to `Scheduled` with `accepted_at == scheduled_at == now`.
    pub async fn accept_by_technician(
        &self,
        request_id: DbId,
        technician_id: DbId,
    ) -> NegotiationResult<ServiceRequest> {
        self.require_role(technician_id, ROLE_TECHNICIAN).await?;

        let row = self.load(request_id).await?;
        self.ensure_serves(technician_id, &row).await?;
        ensure_status(&row, &[RequestStatus::Pending], RequestStatus::Scheduled)?;

        let now = self.clock.now();
        let change = RequestChange {
            technician_id: Some(technician_id),
            technician_price: Some(row.client_price),
            final_price: Some(row.client_price),
            accepted_at: Some(now),
            scheduled_at: Some(now),
            ..Default::default()
        };
        let closed = self
            .store
            .transition_closing_ledgers(
                request_id,
                &[RequestStatus::Pending],
                RequestStatus::Scheduled,
                &change,
                now,
            )
            .await?
            .ok_or_else(|| stale(request_id))?;

        info!(
            request_id,
            technician_id,
            price = row.client_price,
            "Service request taken by technician"
        );

        let request = closed.request;
        for offer in closed.rejected_offers.into_iter().filter(|o| !o.is_from_client()) {
            self.events.publish(MarketEvent::OfferRejected {
                request: request.clone(),
                offer,
            });
        }
        self.events.publish(MarketEvent::RequestUpdated {
            request: request.clone(),
            audience: Audience::Client,
        });
        self.events.publish(MarketEvent::CalendarUpdated {
            request: request.clone(),
            audience: Audience::Client,
        });
        self.events.publish(MarketEvent::RequestUnavailable {
            request: request.clone(),
            except: Some(technician_id),
        });
        Ok(request)
    }

    /// The assigned technician withdraws from an accepted or scheduled job.
    pub async fn reject_by_technician(
        &self,
        request_id: DbId,
        technician_id: DbId,
    ) -> NegotiationResult<ServiceRequest> {
        self.require_role(technician_id, ROLE_TECHNICIAN).await?;

        let row = self.load(request_id).await?;
        ensure_assignee(&row, technician_id)?;
        let from = [RequestStatus::Accepted, RequestStatus::Scheduled];
        ensure_status(&row, &from, RequestStatus::Cancelled)?;

        let now = self.clock.now();
        let change = RequestChange {
            cancelled_at: Some(now),
            ..Default::default()
        };
        let closed = self
            .store
            .transition_closing_ledgers(request_id, &from, RequestStatus::Cancelled, &change, now)
            .await?
            .ok_or_else(|| stale(request_id))?;

        info!(request_id, technician_id, "Assignment declined by technician");
        self.events.publish(MarketEvent::RequestUpdated {
            request: closed.request.clone(),
            audience: Audience::Client,
        });
        Ok(closed.request)
    }

    /// Fix the visit time on an accepted request.
    pub async fn schedule(
        &self,
        request_id: DbId,
        technician_id: DbId,
        input: &ScheduleRequest,
    ) -> NegotiationResult<ServiceRequest> {
        self.require_role(technician_id, ROLE_TECHNICIAN).await?;
        validate_comment(input.comment.as_deref()).map_err(invalid)?;
        if input.scheduled_at < self.clock.now() {
            return Err(invalid(
                "Scheduled time must not be in the past".to_string(),
            ));
        }

        let row = self.load(request_id).await?;
        ensure_assignee(&row, technician_id)?;
        ensure_status(&row, &[RequestStatus::Accepted], RequestStatus::Scheduled)?;

        let change = RequestChange {
            scheduled_at: Some(input.scheduled_at),
            schedule_comment: input.comment.clone(),
            ..Default::default()
        };
        let request = self
            .store
            .transition(
                request_id,
                &[RequestStatus::Accepted],
                RequestStatus::Scheduled,
                &change,
                self.clock.now(),
            )
            .await?
            .ok_or_else(|| stale(request_id))?;

        info!(
            request_id,
            technician_id,
            scheduled_at = %input.scheduled_at,
            "Service request scheduled"
        );
        self.events.publish(MarketEvent::CalendarUpdated {
            request: request.clone(),
            audience: Audience::Both,
        });
        Ok(request)
    }

    /// Mark the visit as started.
    pub async fn start_work(
        &self,
        request_id: DbId,
        technician_id: DbId,
    ) -> NegotiationResult<ServiceRequest> {
        self.require_role(technician_id, ROLE_TECHNICIAN).await?;

        let row = self.load(request_id).await?;
        ensure_assignee(&row, technician_id)?;
        ensure_status(&row, &[RequestStatus::Scheduled], RequestStatus::InProgress)?;

        let now = self.clock.now();
        let change = RequestChange {
            started_at: Some(now),
            ..Default::default()
        };
        let request = self
            .store
            .transition(
                request_id,
                &[RequestStatus::Scheduled],
                RequestStatus::InProgress,
                &change,
                now,
            )
            .await?
            .ok_or_else(|| stale(request_id))?;

        info!(request_id, technician_id, "Work started");
        self.events.publish(MarketEvent::RequestUpdated {
            request: request.clone(),
            audience: Audience::Client,
        });
        Ok(request)
    }

    // -----------------------------------------------------------------------
    // Alternative dates
    // -----------------------------------------------------------------------

    /// Propose a new visit time. Earlier open proposals from the same
    /// technician are superseded.
    pub async fn propose_alternative_date(
        &self,
        request_id: DbId,
        technician_id: DbId,
        input: &ProposeDateRequest,
    ) -> NegotiationResult<AlternativeDateProposal> {
        self.require_role(technician_id, ROLE_TECHNICIAN).await?;
        validate_comment(input.comment.as_deref()).map_err(invalid)?;
        let now = self.clock.now();
        if input.proposed_date_time <= now {
            return Err(invalid(
                "Proposed date must be in the future".to_string(),
            ));
        }

        let row = self.load(request_id).await?;
        ensure_assignee(&row, technician_id)?;
        ensure_status(&row, &[RequestStatus::Scheduled], RequestStatus::Scheduled)?;

        let submission = self
            .store
            .propose_date(&NewProposal {
                service_request_id: request_id,
                technician_id,
                proposed_date_time: input.proposed_date_time,
                comment: input.comment.clone(),
                created_at: now,
            })
            .await?
            .ok_or_else(|| stale(request_id))?;

        info!(
            request_id,
            technician_id,
            proposal_id = submission.proposal.id,
            proposal_count = submission.proposal.proposal_count,
            superseded = submission.superseded.len(),
            "Alternative date proposed"
        );
        self.events.publish(MarketEvent::AlternativeDateProposed {
            request: row,
            proposal: submission.proposal.clone(),
        });
        Ok(submission.proposal)
    }

    /// Accept a proposal: `scheduled_at` moves to the proposed time and every
    /// other open proposal is rejected.
    pub async fn accept_proposal(
        &self,
        request_id: DbId,
        proposal_id: DbId,
        client_id: DbId,
    ) -> NegotiationResult<ServiceRequest> {
        self.require_role(client_id, ROLE_CLIENT).await?;

        let row = self.load(request_id).await?;
        ensure_owner(&row, client_id)?;
        let proposal = self.load_proposal(request_id, proposal_id).await?;
        ensure_status(&row, &[RequestStatus::Scheduled], RequestStatus::Scheduled)?;

        let acceptance = self
            .store
            .accept_proposal(request_id, proposal.id, self.clock.now())
            .await?
            .ok_or_else(|| conflict(format!("Proposal {proposal_id} is already resolved")))?;

        info!(
            request_id,
            client_id,
            proposal_id,
            scheduled_at = %acceptance.accepted.proposed_date_time,
            rejected = acceptance.rejected.len(),
            "Alternative date accepted"
        );
        self.events.publish(MarketEvent::AlternativeDateAccepted {
            request: acceptance.request.clone(),
            proposal: acceptance.accepted,
        });
        self.events.publish(MarketEvent::CalendarUpdated {
            request: acceptance.request.clone(),
            audience: Audience::Both,
        });
        Ok(acceptance.request)
    }

    /// Decline a proposal; the current schedule stands.
    pub async fn reject_proposal(
        &self,
        request_id: DbId,
        proposal_id: DbId,
        client_id: DbId,
    ) -> NegotiationResult<AlternativeDateProposal> {
        self.require_role(client_id, ROLE_CLIENT).await?;

        let row = self.load(request_id).await?;
        ensure_owner(&row, client_id)?;
        self.load_proposal(request_id, proposal_id).await?;
        ensure_status(&row, &[RequestStatus::Scheduled], RequestStatus::Scheduled)?;

        let proposal = self
            .store
            .reject_proposal(request_id, proposal_id, self.clock.now())
            .await?
            .ok_or_else(|| conflict(format!("Proposal {proposal_id} is already resolved")))?;

        info!(request_id, client_id, proposal_id, "Alternative date rejected");
        self.events.publish(MarketEvent::AlternativeDateRejected {
            request: row,
            proposal: proposal.clone(),
        });
        Ok(proposal)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Fetch a request, expiring it first if its validity window has passed.
    pub async fn by_id(&self, request_id: DbId) -> NegotiationResult<ServiceRequest> {
        self.load(request_id).await
    }

    /// Open requests a technician can bid on: `Pending`, not yet expired,
    /// and for an appliance type in the technician's specialties.
    pub async fn pending_for(&self, technician_id: DbId) -> NegotiationResult<Vec<ServiceRequest>> {
        self.require_role(technician_id, ROLE_TECHNICIAN).await?;
        let now = self.clock.now();
        self.expire_overdue().await?;

        let specialties = self.directory.specialties_of(technician_id).await?;
        if specialties.is_empty() {
            return Ok(Vec::new());
        }

        let mut appliance_types: HashMap<DbId, Option<String>> = HashMap::new();
        let mut visible = Vec::new();
        for request in self.store.list_open(now).await? {
            let appliance_type = match appliance_types.get(&request.appliance_id) {
                Some(cached) => cached.clone(),
                None => {
                    let kind = ApplianceCatalog::get(&*self.directory, request.appliance_id)
                        .await?
                        .map(|a| a.appliance_type);
                    appliance_types.insert(request.appliance_id, kind.clone());
                    kind
                }
            };
            if appliance_type.is_some_and(|kind| specialties.contains(&kind)) {
                visible.push(request);
            }
        }
        Ok(visible)
    }

    /// A client's requests, newest first. Overdue rows are expired before
    /// the read so the list agrees with [`by_id`](Self::by_id).
    pub async fn by_client(&self, client_id: DbId) -> NegotiationResult<Vec<ServiceRequest>> {
        self.expire_overdue().await?;
        Ok(self.store.list_by_client(client_id).await?)
    }

    pub async fn by_technician(
        &self,
        technician_id: DbId,
    ) -> NegotiationResult<Vec<ServiceRequest>> {
        self.expire_overdue().await?;
        Ok(self.store.list_by_technician(technician_id).await?)
    }

    /// Whether a technician's specialties cover the request's appliance.
    pub async fn serves(
        &self,
        technician_id: DbId,
        request: &ServiceRequest,
    ) -> NegotiationResult<bool> {
        let Some(appliance) = ApplianceCatalog::get(&*self.directory, request.appliance_id).await?
        else {
            return Ok(false);
        };
        let specialties = self.directory.specialties_of(technician_id).await?;
        Ok(specialties.contains(&appliance.appliance_type))
    }

    /// Offers on a request, newest first.
    pub async fn offers(&self, request_id: DbId) -> NegotiationResult<Vec<ServiceRequestOffer>> {
        self.load(request_id).await?;
        Ok(self.store.list_offers(request_id).await?)
    }

    /// Alternative-date proposals on a request, newest first.
    pub async fn proposals(
        &self,
        request_id: DbId,
    ) -> NegotiationResult<Vec<AlternativeDateProposal>> {
        self.load(request_id).await?;
        Ok(self.store.list_proposals(request_id).await?)
    }

    /// Expire every overdue pending request. Returns how many were expired.
    pub async fn expire_overdue(&self) -> NegotiationResult<usize> {
        let expired = self.store.expire_overdue(self.clock.now()).await?;
        for request in &expired {
            self.publish_expired(request);
        }
        Ok(expired.len())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn require_role(&self, user_id: DbId, role: &str) -> NegotiationResult<Identity> {
        let identity = self
            .directory
            .resolve(user_id)
            .await?
            .ok_or_else(|| CoreError::Forbidden(format!("Unknown user {user_id}")))?;
        if identity.role != role {
            return Err(CoreError::Forbidden(format!("Only a {role} can perform this action")).into());
        }
        Ok(identity)
    }

    async fn ensure_serves(
        &self,
        technician_id: DbId,
        request: &ServiceRequest,
    ) -> NegotiationResult<()> {
        if self.serves(technician_id, request).await? {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "Technician {technician_id} does not service this appliance type"
            ))
            .into())
        }
    }

    /// Load a request, applying the lazy `Pending -> Expired` transition.
    async fn load(&self, request_id: DbId) -> NegotiationResult<ServiceRequest> {
        let not_found = || CoreError::NotFound {
            entity: "service_request",
            id: request_id,
        };
        let row = self
            .store
            .find_request(request_id)
            .await?
            .ok_or_else(not_found)?;

        let now = self.clock.now();
        if !row.is_overdue(now) {
            return Ok(row);
        }
        match self.store.expire_if_overdue(request_id, now).await? {
            Some(expired) => {
                self.publish_expired(&expired);
                Ok(expired)
            }
            // Someone else moved it first; return what is there now.
            None => Ok(self
                .store
                .find_request(request_id)
                .await?
                .ok_or_else(not_found)?),
        }
    }

    async fn load_offer(
        &self,
        request_id: DbId,
        offer_id: DbId,
    ) -> NegotiationResult<ServiceRequestOffer> {
        Ok(self
            .store
            .find_offer(offer_id)
            .await?
            .filter(|o| o.service_request_id == request_id)
            .ok_or(CoreError::NotFound {
                entity: "offer",
                id: offer_id,
            })?)
    }

    async fn load_proposal(
        &self,
        request_id: DbId,
        proposal_id: DbId,
    ) -> NegotiationResult<AlternativeDateProposal> {
        let proposal = self
            .store
            .find_proposal(proposal_id)
            .await?
            .filter(|p| p.service_request_id == request_id)
            .ok_or(CoreError::NotFound {
                entity: "alternative_date_proposal",
                id: proposal_id,
            })?;
        if !proposal.is_pending() {
            return Err(conflict(format!("Proposal {proposal_id} is already resolved")));
        }
        Ok(proposal)
    }

    async fn place_technician_offer(
        &self,
        request_id: DbId,
        technician_id: DbId,
        input: &OfferRequest,
        from: &[RequestStatus],
    ) -> NegotiationResult<ServiceRequestOffer> {
        let placement = self
            .store
            .place_offer(
                &NewOffer {
                    service_request_id: request_id,
                    technician_id: Some(technician_id),
                    client_id: None,
                    price: input.price,
                    comment: input.comment.clone(),
                    created_at: self.clock.now(),
                },
                from,
                Some(RequestStatus::Offered),
            )
            .await
            .map_err(|e| lost_race(e, request_id))?
            .ok_or_else(|| stale(request_id))?;

        self.events.publish(MarketEvent::OfferReceived {
            request: placement.request.clone(),
            offer: placement.offer.clone(),
        });
        self.events.publish(MarketEvent::RequestUpdated {
            request: placement.request,
            audience: Audience::Client,
        });
        Ok(placement.offer)
    }

    /// Shared acceptance path: the winning offer and the request move
    /// together, siblings are rejected, and every party is notified.
    async fn accept_offer(
        &self,
        row: &ServiceRequest,
        offer: &ServiceRequestOffer,
        technician_id: Option<DbId>,
        final_price: Amount,
    ) -> NegotiationResult<OfferAcceptance> {
        let now = self.clock.now();
        let change = RequestChange {
            technician_id,
            technician_price: Some(offer.price),
            final_price: Some(final_price),
            accepted_at: Some(now),
            ..Default::default()
        };
        let acceptance = self
            .store
            .accept_offer(row.id, offer.id, OPEN, &change, now)
            .await
            .map_err(|e| lost_race(e, row.id))?
            .ok_or_else(|| stale(row.id))?;

        let request = &acceptance.request;
        self.events.publish(MarketEvent::OfferAccepted {
            request: request.clone(),
            offer: acceptance.accepted.clone(),
        });
        // Losing technicians only; the winner may have had an open offer too.
        let losers = acceptance
            .rejected
            .iter()
            .filter(|o| !o.is_from_client() && o.technician_id != request.technician_id);
        for loser in losers {
            self.events.publish(MarketEvent::OfferRejected {
                request: request.clone(),
                offer: loser.clone(),
            });
        }
        self.events.publish(MarketEvent::RequestUpdated {
            request: request.clone(),
            audience: Audience::Client,
        });
        self.events.publish(MarketEvent::RequestUnavailable {
            request: request.clone(),
            except: request.technician_id,
        });
        Ok(acceptance)
    }

    fn publish_expired(&self, request: &ServiceRequest) {
        debug!(request_id = request.id, "Service request expired");
        self.events.publish(MarketEvent::RequestUnavailable {
            request: request.clone(),
            except: None,
        });
        self.events.publish(MarketEvent::RequestUpdated {
            request: request.clone(),
            audience: Audience::Client,
        });
    }
}
