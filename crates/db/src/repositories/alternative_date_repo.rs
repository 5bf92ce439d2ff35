//! Repository for the `alternative_date_proposals` ledger.

use repairlink_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::alternative_date::{
    AlternativeDateProposal, NewProposal, ProposalAcceptance, ProposalSubmission,
};
use crate::models::service_request::RequestChange;
use crate::models::status::{ProposalStatus, RequestStatus, StatusId};
use crate::repositories::ServiceRequestRepo;

/// Column list for `alternative_date_proposals` queries.
const COLUMNS: &str = "\
    id, service_request_id, technician_id, proposed_date_time, status_id, \
    comment, proposal_count, created_at, resolved_at";

/// Provides propose and resolve operations for alternative-date proposals.
pub struct AlternativeDateRepo;

impl AlternativeDateRepo {
    /// Raise a proposal on a scheduled request.
    ///
    /// The request row is locked for the duration of the transaction; the
    /// call returns `None` unless it is `Scheduled` and assigned to the
    /// proposing technician. Earlier open proposals from the same technician
    /// are superseded and the new row gets the next `proposal_count`.
    pub async fn propose(
        pool: &PgPool,
        input: &NewProposal,
    ) -> Result<Option<ProposalSubmission>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let row: Option<(StatusId, Option<DbId>)> = sqlx::query_as(
            "SELECT status_id, technician_id FROM service_requests \
             WHERE id = $1 FOR UPDATE",
        )
        .bind(input.service_request_id)
        .fetch_optional(&mut *tx)
        .await?;

        let eligible = matches!(
            row,
            Some((status_id, Some(technician_id)))
                if status_id == RequestStatus::Scheduled.id()
                    && technician_id == input.technician_id
        );
        if !eligible {
            return Ok(None);
        }

        let superseded = Self::reject_pending_in(
            &mut tx,
            input.service_request_id,
            Some(input.technician_id),
            input.created_at,
        )
        .await?;

        let next_count: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(proposal_count), 0) + 1 FROM alternative_date_proposals \
             WHERE service_request_id = $1 AND technician_id = $2",
        )
        .bind(input.service_request_id)
        .bind(input.technician_id)
        .fetch_one(&mut *tx)
        .await?;

        let insert = format!(
            "INSERT INTO alternative_date_proposals \
                (service_request_id, technician_id, proposed_date_time, status_id, \
                 comment, proposal_count, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        let proposal = sqlx::query_as::<_, AlternativeDateProposal>(&insert)
            .bind(input.service_request_id)
            .bind(input.technician_id)
            .bind(input.proposed_date_time)
            .bind(ProposalStatus::Pending.id())
            .bind(&input.comment)
            .bind(next_count)
            .bind(input.created_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(ProposalSubmission {
            proposal,
            superseded,
        }))
    }

    /// Find a proposal by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<AlternativeDateProposal>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM alternative_date_proposals WHERE id = $1");
        sqlx::query_as::<_, AlternativeDateProposal>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All proposals on a request, newest first.
    pub async fn list_for_request(
        pool: &PgPool,
        service_request_id: DbId,
    ) -> Result<Vec<AlternativeDateProposal>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM alternative_date_proposals \
             WHERE service_request_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, AlternativeDateProposal>(&query)
            .bind(service_request_id)
            .fetch_all(pool)
            .await
    }

    /// Accept a pending proposal and move the request's `scheduled_at` to the
    /// proposed time. Other open proposals on the request are rejected.
    pub async fn accept(
        pool: &PgPool,
        service_request_id: DbId,
        proposal_id: DbId,
        now: Timestamp,
    ) -> Result<Option<ProposalAcceptance>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(accepted) = Self::resolve_in(
            &mut tx,
            service_request_id,
            proposal_id,
            ProposalStatus::Accepted,
            now,
        )
        .await?
        else {
            return Ok(None);
        };

        let change = RequestChange {
            scheduled_at: Some(accepted.proposed_date_time),
            ..Default::default()
        };
        let Some(request) = ServiceRequestRepo::transition_in(
            &mut tx,
            service_request_id,
            &[RequestStatus::Scheduled],
            RequestStatus::Scheduled,
            &change,
        )
        .await?
        else {
            return Ok(None);
        };

        let rejected = Self::reject_pending_in(&mut tx, service_request_id, None, now).await?;

        tx.commit().await?;
        Ok(Some(ProposalAcceptance {
            request,
            accepted,
            rejected,
        }))
    }

    /// Reject a pending proposal. `None` if it was already resolved.
    pub async fn reject(
        pool: &PgPool,
        service_request_id: DbId,
        proposal_id: DbId,
        now: Timestamp,
    ) -> Result<Option<AlternativeDateProposal>, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::resolve_in(
            &mut conn,
            service_request_id,
            proposal_id,
            ProposalStatus::Rejected,
            now,
        )
        .await
    }

    /// Reject every pending proposal on a request, optionally only those of
    /// one technician.
    pub(crate) async fn reject_pending_in(
        conn: &mut PgConnection,
        service_request_id: DbId,
        technician_id: Option<DbId>,
        now: Timestamp,
    ) -> Result<Vec<AlternativeDateProposal>, sqlx::Error> {
        let query = format!(
            "UPDATE alternative_date_proposals SET status_id = $2, resolved_at = $3 \
             WHERE service_request_id = $1 AND status_id = $4 \
               AND ($5::BIGINT IS NULL OR technician_id = $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AlternativeDateProposal>(&query)
            .bind(service_request_id)
            .bind(ProposalStatus::Rejected.id())
            .bind(now)
            .bind(ProposalStatus::Pending.id())
            .bind(technician_id)
            .fetch_all(&mut *conn)
            .await
    }

    async fn resolve_in(
        conn: &mut PgConnection,
        service_request_id: DbId,
        proposal_id: DbId,
        to: ProposalStatus,
        now: Timestamp,
    ) -> Result<Option<AlternativeDateProposal>, sqlx::Error> {
        let query = format!(
            "UPDATE alternative_date_proposals SET status_id = $3, resolved_at = $4 \
             WHERE id = $1 AND service_request_id = $2 AND status_id = $5 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AlternativeDateProposal>(&query)
            .bind(proposal_id)
            .bind(service_request_id)
            .bind(to.id())
            .bind(now)
            .bind(ProposalStatus::Pending.id())
            .fetch_optional(&mut *conn)
            .await
    }
}
