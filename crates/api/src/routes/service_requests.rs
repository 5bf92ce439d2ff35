//! Route definitions for service requests and their ledgers.
//!
//! Three routers are provided:
//! - `router()` mounted at `/service-requests`
//! - `client_router()` mounted at `/clients/me`
//! - `technician_router()` mounted at `/technicians/me`

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::{alternative_date, offer, service_request};
use crate::state::AppState;

/// Request-scoped routes mounted at `/service-requests`.
///
/// ```text
/// POST   /                                     -> create
/// GET    /{id}                                 -> get_by_id
/// PUT    /{id}/client-price                    -> update_client_price
/// POST   /{id}/accept                          -> accept
/// POST   /{id}/complete                        -> complete
/// POST   /{id}/cancel                          -> cancel
/// POST   /{id}/offer-price                     -> offer::offer_price
/// POST   /{id}/take                            -> take
/// POST   /{id}/decline                         -> decline
/// POST   /{id}/schedule                        -> schedule
/// POST   /{id}/start                           -> start
/// GET    /{id}/offers                          -> offer::list
/// POST   /{id}/offers                          -> offer::submit
/// POST   /{id}/counter-offers                  -> offer::counter
/// POST   /{id}/offers/{offer_id}/accept        -> offer::accept
/// POST   /{id}/offers/{offer_id}/reject        -> offer::reject
/// POST   /{id}/offers/{offer_id}/take          -> offer::take_counter
/// GET    /{id}/alternative-dates               -> alternative_date::list
/// POST   /{id}/alternative-dates               -> alternative_date::propose
/// POST   /{id}/alternative-dates/{pid}/accept  -> alternative_date::accept
/// POST   /{id}/alternative-dates/{pid}/reject  -> alternative_date::reject
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(service_request::create))
        .route("/{id}", get(service_request::get_by_id))
        .route(
            "/{id}/client-price",
            put(service_request::update_client_price),
        )
        .route("/{id}/accept", post(service_request::accept))
        .route("/{id}/complete", post(service_request::complete))
        .route("/{id}/cancel", post(service_request::cancel))
        .route("/{id}/offer-price", post(offer::offer_price))
        .route("/{id}/take", post(service_request::take))
        .route("/{id}/decline", post(service_request::decline))
        .route("/{id}/schedule", post(service_request::schedule))
        .route("/{id}/start", post(service_request::start))
        .route("/{id}/offers", get(offer::list).post(offer::submit))
        .route("/{id}/counter-offers", post(offer::counter))
        .route("/{id}/offers/{offer_id}/accept", post(offer::accept))
        .route("/{id}/offers/{offer_id}/reject", post(offer::reject))
        .route("/{id}/offers/{offer_id}/take", post(offer::take_counter))
        .route(
            "/{id}/alternative-dates",
            get(alternative_date::list).post(alternative_date::propose),
        )
        .route(
            "/{id}/alternative-dates/{proposal_id}/accept",
            post(alternative_date::accept),
        )
        .route(
            "/{id}/alternative-dates/{proposal_id}/reject",
            post(alternative_date::reject),
        )
}

/// Client views mounted at `/clients/me`.
pub fn client_router() -> Router<AppState> {
    Router::new().route("/service-requests", get(service_request::list_for_client))
}

/// Technician views mounted at `/technicians/me`.
pub fn technician_router() -> Router<AppState> {
    Router::new()
        .route(
            "/service-requests",
            get(service_request::list_for_technician),
        )
        .route("/available", get(service_request::list_available))
}
