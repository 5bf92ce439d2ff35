//! Lifecycle event dispatch to connected parties.
//!
//! [`EventDispatcher`] subscribes to the market event bus, works out which
//! identities each event concerns and pushes one JSON message into each of
//! their rooms. Delivery is at-most-once: identities without a live
//! connection get nothing and nothing is retried.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::ws::Message;
use repairlink_core::directory::{ApplianceCatalog, ApplianceInfo, Directory};
use repairlink_core::error::CoreError;
use repairlink_core::realtime::RoomRole;
use repairlink_core::types::DbId;
use repairlink_db::models::offer::ServiceRequestOffer;
use repairlink_db::models::service_request::ServiceRequest;
use repairlink_events::{Audience, MarketEvent};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;

use crate::ws::registry::{ConnectionRegistry, Room};

/// Appliance summary attached to every notification.
#[derive(Debug, Clone, Serialize)]
pub struct ApplianceSummary {
    pub id: DbId,
    pub appliance_type: String,
    pub display_name: String,
}

impl From<ApplianceInfo> for ApplianceSummary {
    fn from(info: ApplianceInfo) -> Self {
        Self {
            display_name: info.display_name(),
            id: info.id,
            appliance_type: info.appliance_type,
        }
    }
}

/// Routes market events to WebSocket rooms.
pub struct EventDispatcher {
    registry: Arc<ConnectionRegistry>,
    directory: Arc<dyn Directory>,
}

impl EventDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, directory: Arc<dyn Directory>) -> Self {
        Self {
            registry,
            directory,
        }
    }

    /// Run the dispatch loop until the event bus is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<MarketEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = self.dispatch(&event).await {
                        tracing::warn!(
                            error = %e,
                            kind = event.kind(),
                            request_id = event.request().id,
                            "Failed to dispatch event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event dispatcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, event dispatcher shutting down");
                    break;
                }
            }
        }
    }

    /// Deliver one event. Returns how many connections received it.
    pub async fn dispatch(&self, event: &MarketEvent) -> Result<usize, CoreError> {
        let request = event.request();
        let appliance = match ApplianceCatalog::get(&*self.directory, request.appliance_id).await
        {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    appliance_id = request.appliance_id,
                    "Appliance lookup failed, sending without it"
                );
                None
            }
        };

        let targets = self.targets(event, appliance.as_ref()).await?;
        if targets.is_empty() {
            return Ok(0);
        }

        let payload = build_payload(event, appliance.map(ApplianceSummary::from));
        let text = serde_json::to_string(&payload)
            .map_err(|e| CoreError::Internal(format!("Failed to serialize event: {e}")))?;
        let message = Message::Text(text.into());

        let mut delivered = 0;
        for (role, identity_id) in targets {
            let sent = self
                .registry
                .send_to_room(role, identity_id, event.kind(), message.clone())
                .await;
            if sent == 0 {
                tracing::debug!(
                    kind = event.kind(),
                    role = role.as_str(),
                    identity_id,
                    request_id = request.id,
                    "No live connection, notification dropped"
                );
            }
            delivered += sent;
        }
        Ok(delivered)
    }

    /// Identities an event is addressed to, deduplicated.
    async fn targets(
        &self,
        event: &MarketEvent,
        appliance: Option<&ApplianceInfo>,
    ) -> Result<BTreeSet<Room>, CoreError> {
        let mut targets = BTreeSet::new();
        match event {
            MarketEvent::NewRequestAvailable { .. } | MarketEvent::PriceUpdated { .. } => {
                for technician in self.eligible_technicians(appliance).await? {
                    targets.insert((RoomRole::Technician, technician));
                }
            }
            MarketEvent::RequestUnavailable { except, .. } => {
                for technician in self.eligible_technicians(appliance).await? {
                    if Some(technician) != *except {
                        targets.insert((RoomRole::Technician, technician));
                    }
                }
            }
            MarketEvent::RequestUpdated { request, audience }
            | MarketEvent::CalendarUpdated { request, audience } => {
                participants(&mut targets, request, *audience);
            }
            MarketEvent::OfferReceived { request, .. }
            | MarketEvent::AlternativeDateProposed { request, .. } => {
                targets.insert((RoomRole::Client, request.client_id));
            }
            // The acceptance has already assigned the winner, who is not
            // the offer's author when a client counter-offer was taken.
            MarketEvent::OfferAccepted { request, .. } => {
                if let Some(technician) = request.technician_id {
                    targets.insert((RoomRole::Technician, technician));
                }
            }
            MarketEvent::OfferRejected { offer, .. } => {
                if let Some(room) = author(offer) {
                    targets.insert(room);
                }
            }
            MarketEvent::AlternativeDateAccepted { proposal, .. }
            | MarketEvent::AlternativeDateRejected { proposal, .. } => {
                targets.insert((RoomRole::Technician, proposal.technician_id));
            }
        }
        Ok(targets)
    }

    async fn eligible_technicians(
        &self,
        appliance: Option<&ApplianceInfo>,
    ) -> Result<Vec<DbId>, CoreError> {
        match appliance {
            Some(appliance) => {
                self.directory
                    .technicians_for(&appliance.appliance_type)
                    .await
            }
            None => Ok(Vec::new()),
        }
    }
}

fn participants(targets: &mut BTreeSet<Room>, request: &ServiceRequest, audience: Audience) {
    if audience.includes_client() {
        targets.insert((RoomRole::Client, request.client_id));
    }
    if audience.includes_assignee() {
        if let Some(technician) = request.technician_id {
            targets.insert((RoomRole::Technician, technician));
        }
    }
}

/// The room of whoever placed an offer.
fn author(offer: &ServiceRequestOffer) -> Option<Room> {
    match (offer.technician_id, offer.client_id) {
        (Some(technician), _) => Some((RoomRole::Technician, technician)),
        (None, Some(client)) => Some((RoomRole::Client, client)),
        (None, None) => None,
    }
}

/// Wire shape: `{type, request, offer?, proposal?, appliance?, timestamp}`.
pub fn build_payload(event: &MarketEvent, appliance: Option<ApplianceSummary>) -> serde_json::Value {
    let mut payload = json!({
        "type": event.kind(),
        "request": event.request(),
        "timestamp": chrono::Utc::now(),
    });
    if let Some(offer) = event.offer() {
        payload["offer"] = json!(offer);
    }
    if let Some(proposal) = event.proposal() {
        payload["proposal"] = json!(proposal);
    }
    if let Some(appliance) = appliance {
        payload["appliance"] = json!(appliance);
    }
    payload
}
