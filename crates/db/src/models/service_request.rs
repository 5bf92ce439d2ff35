//! Service request aggregate model and DTOs.

use repairlink_core::types::{Amount, DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::status::{RequestStatus, StatusId};

/// A row from the `service_requests` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ServiceRequest {
    pub id: DbId,
    pub client_id: DbId,
    pub appliance_id: DbId,
    pub description: String,
    pub client_price: Amount,
    pub technician_price: Option<Amount>,
    pub final_price: Option<Amount>,
    pub status_id: StatusId,
    pub technician_id: Option<DbId>,
    pub schedule_comment: Option<String>,
    pub expires_at: Option<Timestamp>,
    pub accepted_at: Option<Timestamp>,
    pub scheduled_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ServiceRequest {
    /// Typed status. Rows always carry a seeded id, so unknown ids are
    /// treated as terminal by callers that match on `None`.
    pub fn status(&self) -> Option<RequestStatus> {
        RequestStatus::from_id(self.status_id)
    }

    pub fn is_owned_by(&self, client_id: DbId) -> bool {
        self.client_id == client_id
    }

    pub fn is_assigned_to(&self, technician_id: DbId) -> bool {
        self.technician_id == Some(technician_id)
    }

    /// Whether the request is still PENDING but past its validity window.
    pub fn is_overdue(&self, now: Timestamp) -> bool {
        self.status_id == RequestStatus::Pending.id()
            && self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Insert DTO produced by the lifecycle engine after validation.
#[derive(Debug, Clone)]
pub struct NewServiceRequest {
    pub client_id: DbId,
    pub appliance_id: DbId,
    pub description: String,
    pub client_price: Amount,
    pub expires_at: Timestamp,
    pub created_at: Timestamp,
}

/// Column changes applied together with a guarded status transition.
///
/// `None` leaves a column untouched. Milestone timestamps (`accepted_at`,
/// `started_at`, `completed_at`, `cancelled_at`) are write-once: the store
/// keeps an existing value even if a new one is supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestChange {
    pub technician_id: Option<DbId>,
    pub technician_price: Option<Amount>,
    pub final_price: Option<Amount>,
    pub client_price: Option<Amount>,
    pub scheduled_at: Option<Timestamp>,
    pub schedule_comment: Option<String>,
    pub accepted_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
}

impl RequestChange {
    /// Apply this change to an in-memory copy of the row.
    pub fn apply(&self, row: &mut ServiceRequest, to: RequestStatus, now: Timestamp) {
        row.status_id = to.id();
        if let Some(v) = self.technician_id {
            row.technician_id = Some(v);
        }
        if let Some(v) = self.technician_price {
            row.technician_price = Some(v);
        }
        if let Some(v) = self.final_price {
            row.final_price = Some(v);
        }
        if let Some(v) = self.client_price {
            row.client_price = v;
        }
        if let Some(v) = self.scheduled_at {
            row.scheduled_at = Some(v);
        }
        if let Some(v) = &self.schedule_comment {
            row.schedule_comment = Some(v.clone());
        }
        row.accepted_at = row.accepted_at.or(self.accepted_at);
        row.started_at = row.started_at.or(self.started_at);
        row.completed_at = row.completed_at.or(self.completed_at);
        row.cancelled_at = row.cancelled_at.or(self.cancelled_at);
        row.updated_at = now;
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body for `POST /service-requests`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateServiceRequest {
    pub appliance_id: DbId,
    #[validate(length(min = 1, max = 2000))]
    pub description: String,
    #[validate(range(min = 0))]
    pub client_price: Amount,
    /// Defaults to five minutes when omitted.
    #[validate(range(min = 1, max = 10080))]
    pub valid_minutes: Option<i64>,
}

/// Body for `PUT /service-requests/{id}/client-price`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateClientPriceRequest {
    #[validate(range(min = 0))]
    pub client_price: Amount,
}

/// Body for `POST /service-requests/{id}/accept`.
#[derive(Debug, Clone, Deserialize)]
pub struct AcceptByClientRequest {
    #[serde(default)]
    pub accept_client_price: bool,
}

/// Body for `POST /service-requests/{id}/schedule`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScheduleRequest {
    pub scheduled_at: Timestamp,
    #[validate(length(max = 1000))]
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn sample(now: Timestamp) -> ServiceRequest {
        ServiceRequest {
            id: 1,
            client_id: 10,
            appliance_id: 5,
            description: "Dryer will not spin".to_string(),
            client_price: 50_000,
            technician_price: None,
            final_price: None,
            status_id: RequestStatus::Pending.id(),
            technician_id: None,
            schedule_comment: None,
            expires_at: Some(now + Duration::minutes(5)),
            accepted_at: None,
            scheduled_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn overdue_only_when_pending_and_past_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut row = sample(now);
        assert!(!row.is_overdue(now));
        assert!(row.is_overdue(now + Duration::minutes(5)));

        row.status_id = RequestStatus::Offered.id();
        assert!(!row.is_overdue(now + Duration::hours(1)));
    }

    #[test]
    fn change_keeps_first_milestone_stamp() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut row = sample(now);
        row.accepted_at = Some(now);

        let later = now + Duration::minutes(3);
        let change = RequestChange {
            technician_id: Some(77),
            accepted_at: Some(later),
            ..Default::default()
        };
        change.apply(&mut row, RequestStatus::Accepted, later);

        assert_eq!(row.status(), Some(RequestStatus::Accepted));
        assert_eq!(row.technician_id, Some(77));
        assert_eq!(row.accepted_at, Some(now));
        assert_eq!(row.updated_at, later);
    }

    #[test]
    fn create_body_rejects_negative_price() {
        let body = CreateServiceRequest {
            appliance_id: 1,
            description: "Oven light".to_string(),
            client_price: -5,
            valid_minutes: None,
        };
        assert!(body.validate().is_err());
    }
}
