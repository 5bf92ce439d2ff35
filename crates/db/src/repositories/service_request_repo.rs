//! Repository for the `service_requests` table.
//!
//! Every status change is a compare-and-set: the `UPDATE` carries the
//! expected prior statuses in its `WHERE` clause and returns `None` when no
//! row matched, so a concurrent writer can never be silently overwritten.

use repairlink_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::alternative_date::AlternativeDateProposal;
use crate::models::offer::ServiceRequestOffer;
use crate::models::service_request::{NewServiceRequest, RequestChange, ServiceRequest};
use crate::models::status::{status_ids, RequestStatus};
use crate::repositories::{AlternativeDateRepo, OfferRepo};

/// Column list for `service_requests` queries.
pub(crate) const COLUMNS: &str = "\
    id, client_id, appliance_id, description, client_price, technician_price, \
    final_price, status_id, technician_id, schedule_comment, expires_at, \
    accepted_at, scheduled_at, started_at, completed_at, cancelled_at, \
    created_at, updated_at";

/// A guarded transition that also closed the request's open ledger rows.
#[derive(Debug, Clone)]
pub struct ClosedTransition {
    pub request: ServiceRequest,
    pub rejected_offers: Vec<ServiceRequestOffer>,
    pub rejected_proposals: Vec<AlternativeDateProposal>,
}

/// Provides guarded lifecycle writes and listing queries for service requests.
pub struct ServiceRequestRepo;

impl ServiceRequestRepo {
    /// Insert a new `Pending` request.
    pub async fn create(
        pool: &PgPool,
        input: &NewServiceRequest,
    ) -> Result<ServiceRequest, sqlx::Error> {
        let query = format!(
            "INSERT INTO service_requests \
                (client_id, appliance_id, description, client_price, status_id, \
                 expires_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ServiceRequest>(&query)
            .bind(input.client_id)
            .bind(input.appliance_id)
            .bind(&input.description)
            .bind(input.client_price)
            .bind(RequestStatus::Pending.id())
            .bind(input.expires_at)
            .bind(input.created_at)
            .fetch_one(pool)
            .await
    }

    /// Find a request by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ServiceRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM service_requests WHERE id = $1");
        sqlx::query_as::<_, ServiceRequest>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Move a request to `to` if its current status is one of `from`.
    ///
    /// Returns `None` when the row does not exist or its status no longer
    /// matches (the precondition failed).
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        from: &[RequestStatus],
        to: RequestStatus,
        change: &RequestChange,
    ) -> Result<Option<ServiceRequest>, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::transition_in(&mut conn, id, from, to, change).await
    }

    /// [`transition`](Self::transition) on an existing connection, for use
    /// inside a caller-owned transaction.
    pub(crate) async fn transition_in(
        conn: &mut PgConnection,
        id: DbId,
        from: &[RequestStatus],
        to: RequestStatus,
        change: &RequestChange,
    ) -> Result<Option<ServiceRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE service_requests SET \
                status_id = $3, \
                technician_id = COALESCE($4, technician_id), \
                technician_price = COALESCE($5, technician_price), \
                final_price = COALESCE($6, final_price), \
                client_price = COALESCE($7, client_price), \
                scheduled_at = COALESCE($8, scheduled_at), \
                schedule_comment = COALESCE($9, schedule_comment), \
                accepted_at = COALESCE(accepted_at, $10), \
                started_at = COALESCE(started_at, $11), \
                completed_at = COALESCE(completed_at, $12), \
                cancelled_at = COALESCE(cancelled_at, $13) \
             WHERE id = $1 AND status_id = ANY($2) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ServiceRequest>(&query)
            .bind(id)
            .bind(status_ids(from))
            .bind(to.id())
            .bind(change.technician_id)
            .bind(change.technician_price)
            .bind(change.final_price)
            .bind(change.client_price)
            .bind(change.scheduled_at)
            .bind(&change.schedule_comment)
            .bind(change.accepted_at)
            .bind(change.started_at)
            .bind(change.completed_at)
            .bind(change.cancelled_at)
            .fetch_optional(&mut *conn)
            .await
    }

    /// Guarded transition that also rejects every open offer and proposal on
    /// the request, all in one transaction.
    ///
    /// Used when the request leaves negotiation for good (cancellation,
    /// direct take by a technician).
    pub async fn transition_closing_ledgers(
        pool: &PgPool,
        id: DbId,
        from: &[RequestStatus],
        to: RequestStatus,
        change: &RequestChange,
        now: Timestamp,
    ) -> Result<Option<ClosedTransition>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(request) = Self::transition_in(&mut tx, id, from, to, change).await? else {
            return Ok(None);
        };
        let rejected_offers = OfferRepo::reject_pending_in(&mut tx, id, None, now).await?;
        let rejected_proposals =
            AlternativeDateRepo::reject_pending_in(&mut tx, id, None, now).await?;

        tx.commit().await?;
        Ok(Some(ClosedTransition {
            request,
            rejected_offers,
            rejected_proposals,
        }))
    }

    /// Open requests: `Pending` and not yet past `expires_at`, newest first.
    pub async fn list_open(
        pool: &PgPool,
        now: Timestamp,
    ) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM service_requests \
             WHERE status_id = $1 AND expires_at > $2 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, ServiceRequest>(&query)
            .bind(RequestStatus::Pending.id())
            .bind(now)
            .fetch_all(pool)
            .await
    }

    /// All requests posted by a client, newest first.
    pub async fn list_by_client(
        pool: &PgPool,
        client_id: DbId,
    ) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM service_requests \
             WHERE client_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, ServiceRequest>(&query)
            .bind(client_id)
            .fetch_all(pool)
            .await
    }

    /// All requests assigned to a technician, newest first.
    pub async fn list_by_technician(
        pool: &PgPool,
        technician_id: DbId,
    ) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM service_requests \
             WHERE technician_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, ServiceRequest>(&query)
            .bind(technician_id)
            .fetch_all(pool)
            .await
    }

    /// Expire a single request if it is still `Pending` and overdue.
    ///
    /// Returns the expired row, or `None` when nothing changed.
    pub async fn expire_if_overdue(
        pool: &PgPool,
        id: DbId,
        now: Timestamp,
    ) -> Result<Option<ServiceRequest>, sqlx::Error> {
        let mut expired = Self::expire_where(pool, Some(id), now).await?;
        Ok(expired.pop())
    }

    /// Expire every overdue `Pending` request. Returns the expired rows.
    pub async fn expire_overdue(
        pool: &PgPool,
        now: Timestamp,
    ) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        Self::expire_where(pool, None, now).await
    }

    /// Shared expiry statement. Expired rows get `cancelled_at` so the
    /// terminal-timestamp invariant holds; their open offers are rejected.
    async fn expire_where(
        pool: &PgPool,
        id: Option<DbId>,
        now: Timestamp,
    ) -> Result<Vec<ServiceRequest>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE service_requests SET \
                status_id = $1, \
                cancelled_at = COALESCE(cancelled_at, $3) \
             WHERE status_id = $2 AND expires_at <= $3 \
               AND ($4::BIGINT IS NULL OR id = $4) \
             RETURNING {COLUMNS}"
        );
        let expired = sqlx::query_as::<_, ServiceRequest>(&query)
            .bind(RequestStatus::Expired.id())
            .bind(RequestStatus::Pending.id())
            .bind(now)
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

        for request in &expired {
            OfferRepo::reject_pending_in(&mut tx, request.id, None, now).await?;
        }

        tx.commit().await?;
        Ok(expired)
    }
}
