pub mod health;
pub mod service_requests;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                                          WebSocket
///
/// /service-requests                            create (client)
/// /service-requests/{id}                       get
/// /service-requests/{id}/...                   lifecycle commands
/// /service-requests/{id}/offers/...            offer ledger
/// /service-requests/{id}/alternative-dates/... date proposals
///
/// /clients/me/service-requests                 own requests (client)
/// /technicians/me/service-requests             assigned requests (technician)
/// /technicians/me/available                    open requests by specialty
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/service-requests", service_requests::router())
        .nest("/clients/me", service_requests::client_router())
        .nest("/technicians/me", service_requests::technician_router())
}
