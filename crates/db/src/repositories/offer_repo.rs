//! Repository for the `service_request_offers` ledger.

use repairlink_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::offer::{
    NewOffer, OfferAcceptance, OfferPlacement, OfferRejection, ServiceRequestOffer,
};
use crate::models::service_request::{RequestChange, ServiceRequest};
use crate::models::status::{status_ids, OfferStatus, RequestStatus};
use crate::repositories::service_request_repo::{self, ServiceRequestRepo};

/// Column list for `service_request_offers` queries.
const COLUMNS: &str = "\
    id, service_request_id, technician_id, client_id, price, status_id, \
    comment, created_at, resolved_at";

/// Provides append and resolve operations for the offer ledger.
pub struct OfferRepo;

impl OfferRepo {
    /// Insert a ledger row while the request is in one of `from`.
    ///
    /// The request row is guarded in the same transaction: when `to` is set
    /// the request moves to it, otherwise only the status check applies.
    /// Returns `None` if the request was not in an expected status.
    pub async fn place(
        pool: &PgPool,
        input: &NewOffer,
        from: &[RequestStatus],
        to: Option<RequestStatus>,
    ) -> Result<Option<OfferPlacement>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let guard = format!(
            "UPDATE service_requests SET status_id = COALESCE($3, status_id) \
             WHERE id = $1 AND status_id = ANY($2) \
             RETURNING {}",
            service_request_repo::COLUMNS
        );
        let request = sqlx::query_as::<_, ServiceRequest>(&guard)
            .bind(input.service_request_id)
            .bind(status_ids(from))
            .bind(to.map(RequestStatus::id))
            .fetch_optional(&mut *tx)
            .await?;
        let Some(request) = request else {
            return Ok(None);
        };

        let insert = format!(
            "INSERT INTO service_request_offers \
                (service_request_id, technician_id, client_id, price, status_id, comment, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        let offer = sqlx::query_as::<_, ServiceRequestOffer>(&insert)
            .bind(input.service_request_id)
            .bind(input.technician_id)
            .bind(input.client_id)
            .bind(input.price)
            .bind(OfferStatus::Pending.id())
            .bind(&input.comment)
            .bind(input.created_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(OfferPlacement { request, offer }))
    }

    /// Find an offer by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ServiceRequestOffer>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM service_request_offers WHERE id = $1");
        sqlx::query_as::<_, ServiceRequestOffer>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All offers on a request, newest first.
    pub async fn list_for_request(
        pool: &PgPool,
        service_request_id: DbId,
    ) -> Result<Vec<ServiceRequestOffer>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM service_request_offers \
             WHERE service_request_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, ServiceRequestOffer>(&query)
            .bind(service_request_id)
            .fetch_all(pool)
            .await
    }

    /// Accept one pending offer and move the request to `Accepted`.
    ///
    /// In one transaction: the request is CAS'd from `from` with `change`
    /// applied, the offer is CAS'd `Pending -> Accepted`, and every other
    /// pending offer on the request is rejected. Returns `None` if either
    /// guard fails; nothing is written in that case.
    ///
    /// The request row goes first. Its row lock makes a concurrent accept on
    /// a sibling offer wait, then match zero rows once this one commits.
    pub async fn accept(
        pool: &PgPool,
        service_request_id: DbId,
        offer_id: DbId,
        from: &[RequestStatus],
        change: &RequestChange,
        now: Timestamp,
    ) -> Result<Option<OfferAcceptance>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(request) = ServiceRequestRepo::transition_in(
            &mut tx,
            service_request_id,
            from,
            RequestStatus::Accepted,
            change,
        )
        .await?
        else {
            return Ok(None);
        };

        // Dropping `tx` on the early return rolls the request change back.
        let Some(accepted) = Self::resolve_in(
            &mut tx,
            service_request_id,
            offer_id,
            OfferStatus::Accepted,
            now,
        )
        .await?
        else {
            return Ok(None);
        };

        let rejected = Self::reject_pending_in(&mut tx, service_request_id, None, now).await?;

        tx.commit().await?;
        Ok(Some(OfferAcceptance {
            request,
            accepted,
            rejected,
        }))
    }

    /// Reject one pending offer.
    ///
    /// When the request is `Offered` and no technician offer is left open,
    /// it falls back to `Pending` in the same transaction.
    pub async fn reject(
        pool: &PgPool,
        service_request_id: DbId,
        offer_id: DbId,
        now: Timestamp,
    ) -> Result<Option<OfferRejection>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(offer) = Self::resolve_in(
            &mut tx,
            service_request_id,
            offer_id,
            OfferStatus::Rejected,
            now,
        )
        .await?
        else {
            return Ok(None);
        };

        let reopen = format!(
            "UPDATE service_requests SET status_id = $2 \
             WHERE id = $1 AND status_id = $3 \
               AND NOT EXISTS ( \
                   SELECT 1 FROM service_request_offers \
                   WHERE service_request_id = $1 AND status_id = $4 \
                     AND technician_id IS NOT NULL) \
             RETURNING {}",
            service_request_repo::COLUMNS
        );
        let reopened = sqlx::query_as::<_, ServiceRequest>(&reopen)
            .bind(service_request_id)
            .bind(RequestStatus::Pending.id())
            .bind(RequestStatus::Offered.id())
            .bind(OfferStatus::Pending.id())
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(OfferRejection { offer, reopened }))
    }

    /// Reject every pending offer on a request, optionally only those of one
    /// technician. Returns the rejected rows.
    pub(crate) async fn reject_pending_in(
        conn: &mut PgConnection,
        service_request_id: DbId,
        technician_id: Option<DbId>,
        now: Timestamp,
    ) -> Result<Vec<ServiceRequestOffer>, sqlx::Error> {
        let query = format!(
            "UPDATE service_request_offers SET status_id = $2, resolved_at = $3 \
             WHERE service_request_id = $1 AND status_id = $4 \
               AND ($5::BIGINT IS NULL OR technician_id = $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ServiceRequestOffer>(&query)
            .bind(service_request_id)
            .bind(OfferStatus::Rejected.id())
            .bind(now)
            .bind(OfferStatus::Pending.id())
            .bind(technician_id)
            .fetch_all(&mut *conn)
            .await
    }

    /// CAS a single offer from `Pending` to `to`.
    async fn resolve_in(
        conn: &mut PgConnection,
        service_request_id: DbId,
        offer_id: DbId,
        to: OfferStatus,
        now: Timestamp,
    ) -> Result<Option<ServiceRequestOffer>, sqlx::Error> {
        let query = format!(
            "UPDATE service_request_offers SET status_id = $3, resolved_at = $4 \
             WHERE id = $1 AND service_request_id = $2 AND status_id = $5 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ServiceRequestOffer>(&query)
            .bind(offer_id)
            .bind(service_request_id)
            .bind(to.id())
            .bind(now)
            .bind(OfferStatus::Pending.id())
            .fetch_optional(&mut *conn)
            .await
    }
}
