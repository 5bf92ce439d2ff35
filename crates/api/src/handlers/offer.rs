//! Handlers for the offer ledger of a service request.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use repairlink_core::types::DbId;
use repairlink_db::models::offer::{OfferRequest, ServiceRequestOffer};
use repairlink_db::models::service_request::ServiceRequest;
use validator::Validate;

use crate::error::AppResult;
use crate::handlers::ensure_can_view;
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::{RequireClient, RequireTechnician};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/service-requests/{id}/offers
///
/// Newest first. A technician who is not the assignee sees only their own
/// offers and the client's counter-offers.
pub async fn list(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<ServiceRequestOffer>>>> {
    let request = state.engine.by_id(id).await?;
    ensure_can_view(&state.engine, &auth, &request).await?;

    let mut offers = state.engine.offers(id).await?;
    if auth.is_technician() && !request.is_assigned_to(auth.user_id) {
        offers.retain(|o| o.is_from_client() || o.technician_id == Some(auth.user_id));
    }
    Ok(Json(DataResponse { data: offers }))
}

/// POST /api/v1/service-requests/{id}/offer-price
///
/// First offer on a pending request.
pub async fn offer_price(
    RequireTechnician(user): RequireTechnician,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<OfferRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let offer = state.engine.offer_price(id, user.user_id, &input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: offer })))
}

/// POST /api/v1/service-requests/{id}/offers
pub async fn submit(
    RequireTechnician(user): RequireTechnician,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<OfferRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let offer = state.engine.submit_offer(id, user.user_id, &input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: offer })))
}

/// POST /api/v1/service-requests/{id}/counter-offers
pub async fn counter(
    RequireClient(user): RequireClient,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<OfferRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let offer = state
        .engine
        .counter_offer_by_client(id, user.user_id, &input)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: offer })))
}

/// POST /api/v1/service-requests/{id}/offers/{offer_id}/accept
pub async fn accept(
    RequireClient(user): RequireClient,
    State(state): State<AppState>,
    Path((id, offer_id)): Path<(DbId, DbId)>,
) -> AppResult<Json<DataResponse<ServiceRequest>>> {
    let request = state
        .engine
        .accept_specific_offer(id, offer_id, user.user_id)
        .await?;
    Ok(Json(DataResponse { data: request }))
}

/// POST /api/v1/service-requests/{id}/offers/{offer_id}/reject
pub async fn reject(
    RequireClient(user): RequireClient,
    State(state): State<AppState>,
    Path((id, offer_id)): Path<(DbId, DbId)>,
) -> AppResult<Json<DataResponse<ServiceRequestOffer>>> {
    let offer = state
        .engine
        .reject_offer_by_client(id, offer_id, user.user_id)
        .await?;
    Ok(Json(DataResponse { data: offer }))
}

/// POST /api/v1/service-requests/{id}/offers/{offer_id}/take
///
/// A technician takes a client counter-offer.
pub async fn take_counter(
    RequireTechnician(user): RequireTechnician,
    State(state): State<AppState>,
    Path((id, offer_id)): Path<(DbId, DbId)>,
) -> AppResult<Json<DataResponse<ServiceRequest>>> {
    let request = state
        .engine
        .accept_counter_offer(id, offer_id, user.user_id)
        .await?;
    Ok(Json(DataResponse { data: request }))
}
