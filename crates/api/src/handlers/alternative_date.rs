//! Handlers for alternative visit-date proposals.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use repairlink_core::types::DbId;
use repairlink_db::models::alternative_date::{AlternativeDateProposal, ProposeDateRequest};
use repairlink_db::models::service_request::ServiceRequest;
use validator::Validate;

use crate::error::AppResult;
use crate::handlers::ensure_can_view;
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::{RequireClient, RequireTechnician};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/service-requests/{id}/alternative-dates
pub async fn list(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<AlternativeDateProposal>>>> {
    let request = state.engine.by_id(id).await?;
    ensure_can_view(&state.engine, &auth, &request).await?;
    let proposals = state.engine.proposals(id).await?;
    Ok(Json(DataResponse { data: proposals }))
}

/// POST /api/v1/service-requests/{id}/alternative-dates
pub async fn propose(
    RequireTechnician(user): RequireTechnician,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ProposeDateRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let proposal = state
        .engine
        .propose_alternative_date(id, user.user_id, &input)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: proposal })))
}

/// POST /api/v1/service-requests/{id}/alternative-dates/{proposal_id}/accept
pub async fn accept(
    RequireClient(user): RequireClient,
    State(state): State<AppState>,
    Path((id, proposal_id)): Path<(DbId, DbId)>,
) -> AppResult<Json<DataResponse<ServiceRequest>>> {
    let request = state
        .engine
        .accept_proposal(id, proposal_id, user.user_id)
        .await?;
    Ok(Json(DataResponse { data: request }))
}

/// POST /api/v1/service-requests/{id}/alternative-dates/{proposal_id}/reject
pub async fn reject(
    RequireClient(user): RequireClient,
    State(state): State<AppState>,
    Path((id, proposal_id)): Path<(DbId, DbId)>,
) -> AppResult<Json<DataResponse<AlternativeDateProposal>>> {
    let proposal = state
        .engine
        .reject_proposal(id, proposal_id, user.user_id)
        .await?;
    Ok(Json(DataResponse { data: proposal }))
}
