//! Handlers for the service-request lifecycle.
//!
//! Each command handler checks the token role, validates the body and hands
//! off to the lifecycle engine, which owns every state rule.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use repairlink_core::types::DbId;
use repairlink_db::models::service_request::{
    AcceptByClientRequest, CreateServiceRequest, ScheduleRequest, ServiceRequest,
    UpdateClientPriceRequest,
};
use validator::Validate;

use crate::error::AppResult;
use crate::handlers::ensure_can_view;
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::{RequireClient, RequireTechnician};
use crate::response::DataResponse;
use crate::state::AppState;

type RequestResponse = AppResult<Json<DataResponse<ServiceRequest>>>;
type RequestListResponse = AppResult<Json<DataResponse<Vec<ServiceRequest>>>>;

// ---------------------------------------------------------------------------
// Client commands
// ---------------------------------------------------------------------------

/// POST /api/v1/service-requests
pub async fn create(
    RequireClient(user): RequireClient,
    State(state): State<AppState>,
    Json(input): Json<CreateServiceRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let request = state.engine.create(user.user_id, &input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: request })))
}

/// PUT /api/v1/service-requests/{id}/client-price
pub async fn update_client_price(
    RequireClient(user): RequireClient,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateClientPriceRequest>,
) -> RequestResponse {
    input.validate()?;
    let request = state
        .engine
        .update_client_price(id, user.user_id, input.client_price)
        .await?;
    Ok(Json(DataResponse { data: request }))
}

/// POST /api/v1/service-requests/{id}/accept
///
/// Accept the latest technician offer. With `accept_client_price` the
/// client's own price becomes final.
pub async fn accept(
    RequireClient(user): RequireClient,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<AcceptByClientRequest>,
) -> RequestResponse {
    let request = state
        .engine
        .accept_by_client(id, user.user_id, input.accept_client_price)
        .await?;
    Ok(Json(DataResponse { data: request }))
}

/// POST /api/v1/service-requests/{id}/complete
pub async fn complete(
    RequireClient(user): RequireClient,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> RequestResponse {
    let request = state.engine.complete_by_client(id, user.user_id).await?;
    Ok(Json(DataResponse { data: request }))
}

/// POST /api/v1/service-requests/{id}/cancel
pub async fn cancel(
    RequireClient(user): RequireClient,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> RequestResponse {
    let request = state.engine.cancel_by_client(id, user.user_id).await?;
    Ok(Json(DataResponse { data: request }))
}

// ---------------------------------------------------------------------------
// Technician commands
// ---------------------------------------------------------------------------

/// POST /api/v1/service-requests/{id}/take
///
/// Take the request at the client's price; it is scheduled immediately.
pub async fn take(
    RequireTechnician(user): RequireTechnician,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> RequestResponse {
    let request = state.engine.accept_by_technician(id, user.user_id).await?;
    Ok(Json(DataResponse { data: request }))
}

/// POST /api/v1/service-requests/{id}/decline
pub async fn decline(
    RequireTechnician(user): RequireTechnician,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> RequestResponse {
    let request = state.engine.reject_by_technician(id, user.user_id).await?;
    Ok(Json(DataResponse { data: request }))
}

/// POST /api/v1/service-requests/{id}/schedule
pub async fn schedule(
    RequireTechnician(user): RequireTechnician,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ScheduleRequest>,
) -> RequestResponse {
    input.validate()?;
    let request = state.engine.schedule(id, user.user_id, &input).await?;
    Ok(Json(DataResponse { data: request }))
}

/// POST /api/v1/service-requests/{id}/start
pub async fn start(
    RequireTechnician(user): RequireTechnician,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> RequestResponse {
    let request = state.engine.start_work(id, user.user_id).await?;
    Ok(Json(DataResponse { data: request }))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// GET /api/v1/service-requests/{id}
pub async fn get_by_id(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> RequestResponse {
    let request = state.engine.by_id(id).await?;
    ensure_can_view(&state.engine, &auth, &request).await?;
    Ok(Json(DataResponse { data: request }))
}

/// GET /api/v1/clients/me/service-requests
pub async fn list_for_client(
    RequireClient(user): RequireClient,
    State(state): State<AppState>,
) -> RequestListResponse {
    let requests = state.engine.by_client(user.user_id).await?;
    Ok(Json(DataResponse { data: requests }))
}

/// GET /api/v1/technicians/me/service-requests
pub async fn list_for_technician(
    RequireTechnician(user): RequireTechnician,
    State(state): State<AppState>,
) -> RequestListResponse {
    let requests = state.engine.by_technician(user.user_id).await?;
    Ok(Json(DataResponse { data: requests }))
}

/// GET /api/v1/technicians/me/available
///
/// Open requests matching the technician's specialties.
pub async fn list_available(
    RequireTechnician(user): RequireTechnician,
    State(state): State<AppState>,
) -> RequestListResponse {
    let requests = state.engine.pending_for(user.user_id).await?;
    Ok(Json(DataResponse { data: requests }))
}
