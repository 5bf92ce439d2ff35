//! HTTP-level tests for the service-request lifecycle.
//!
//! Drive the real router over the in-memory store: role guards, status
//! codes, the `{data}` envelope, and the negotiation scenarios end to end.

mod common;

use axum::http::StatusCode;
use chrono::Duration;
use common::{
    body_json, get, get_auth, post_json, post_json_auth, put_json_auth, token, TestApp, ADMIN,
    CLIENT, OTHER_CLIENT, TECH_A, TECH_B, TECH_OVEN, WASHER,
};
use repairlink_db::models::status::{OfferStatus, RequestStatus};
use serde_json::{json, Value};

fn client() -> String {
    token(CLIENT, "client")
}

fn tech(id: i64) -> String {
    token(id, "technician")
}

/// Post a washer request as `CLIENT` and return its JSON.
async fn create_request(app: &TestApp, valid_minutes: Option<i64>) -> Value {
    let response = post_json_auth(
        app.router.clone(),
        "/api/v1/service-requests",
        json!({
            "appliance_id": WASHER,
            "description": "Drum does not turn",
            "client_price": 50_000,
            "valid_minutes": valid_minutes,
        }),
        &client(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

async fn place_offer(app: &TestApp, request_id: i64, technician: i64, price: i64) -> Value {
    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{request_id}/offers"),
        json!({ "price": price }),
        &tech(technician),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

fn status_of(json: &Value) -> i64 {
    json["status_id"].as_i64().unwrap()
}

// ---------------------------------------------------------------------------
// Test: client creates a request
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_creates_request_with_default_expiry() {
    let app = common::build_test_app();
    let data = create_request(&app, None).await;

    assert_eq!(data["client_id"], CLIENT);
    assert_eq!(data["client_price"], 50_000);
    assert_eq!(status_of(&data), i64::from(RequestStatus::Pending.id()));
    assert_eq!(data["expires_at"], "2026-03-02T09:05:00Z");
    assert!(data["technician_id"].is_null());
}

// ---------------------------------------------------------------------------
// Test: authentication and role guards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_token_returns_401() {
    let app = common::build_test_app();
    let response = post_json(
        app.router,
        "/api/v1/service-requests",
        json!({ "appliance_id": WASHER, "description": "x", "client_price": 1 }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn garbage_token_returns_401() {
    let app = common::build_test_app();
    let response = get_auth(
        app.router,
        "/api/v1/clients/me/service-requests",
        "not-a-jwt",
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn technician_cannot_create_request() {
    let app = common::build_test_app();
    let response = post_json_auth(
        app.router,
        "/api/v1/service-requests",
        json!({ "appliance_id": WASHER, "description": "x", "client_price": 1 }),
        &tech(TECH_A),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn client_cannot_place_offer() {
    let app = common::build_test_app();
    let request = create_request(&app, None).await;

    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{}/offer-price", request["id"]),
        json!({ "price": 40_000 }),
        &client(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_body_returns_validation_error() {
    let app = common::build_test_app();
    let response = post_json_auth(
        app.router,
        "/api/v1/service-requests",
        json!({ "appliance_id": WASHER, "description": "", "client_price": -1 }),
        &client(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

// ---------------------------------------------------------------------------
// Test: client accepts one of several offers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_accepts_specific_offer_over_http() {
    let app = common::build_test_app();
    let request = create_request(&app, None).await;
    let id = request["id"].as_i64().unwrap();

    let first = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/offer-price"),
        json!({ "price": 45_000, "comment": "Can come today" }),
        &tech(TECH_A),
    )
    .await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let offer_a = body_json(first).await["data"].clone();
    let offer_b = place_offer(&app, id, TECH_B, 40_000).await;

    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/offers/{}/accept", offer_b["id"]),
        json!({}),
        &client(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let accepted = body_json(response).await["data"].clone();
    assert_eq!(status_of(&accepted), i64::from(RequestStatus::Accepted.id()));
    assert_eq!(accepted["technician_id"], TECH_B);
    assert_eq!(accepted["final_price"], 40_000);

    let response = get_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/offers"),
        &client(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let offers = body_json(response).await["data"].clone();
    let offers = offers.as_array().unwrap();
    assert_eq!(offers.len(), 2);
    let status_for = |offer: &Value| {
        offers
            .iter()
            .find(|o| o["id"] == offer["id"])
            .map(|o| o["status_id"].as_i64().unwrap())
            .unwrap()
    };
    assert_eq!(status_for(&offer_a), i64::from(OfferStatus::Rejected.id()));
    assert_eq!(status_for(&offer_b), i64::from(OfferStatus::Accepted.id()));
}

// ---------------------------------------------------------------------------
// Test: technician takes a request directly
// ---------------------------------------------------------------------------

#[tokio::test]
async fn technician_take_schedules_and_hides_request() {
    let app = common::build_test_app();
    let request = create_request(&app, None).await;
    let id = request["id"].as_i64().unwrap();

    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/take"),
        json!({}),
        &tech(TECH_A),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let taken = body_json(response).await["data"].clone();
    assert_eq!(status_of(&taken), i64::from(RequestStatus::Scheduled.id()));
    assert_eq!(taken["technician_id"], TECH_A);
    assert_eq!(taken["final_price"], 50_000);

    // Gone from the open pool of the other washer technician.
    let response = get_auth(
        app.router.clone(),
        "/api/v1/technicians/me/available",
        &tech(TECH_B),
    )
    .await;
    assert!(body_json(response).await["data"]
        .as_array()
        .unwrap()
        .is_empty());

    // A second take loses.
    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/take"),
        json!({}),
        &tech(TECH_B),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = get_auth(
        app.router.clone(),
        "/api/v1/technicians/me/service-requests",
        &tech(TECH_A),
    )
    .await;
    assert_eq!(body_json(response).await["data"].as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: second offer-price on the same request conflicts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_offer_price_returns_409() {
    let app = common::build_test_app();
    let request = create_request(&app, None).await;
    let uri = format!("/api/v1/service-requests/{}/offer-price", request["id"]);

    let first = post_json_auth(
        app.router.clone(),
        &uri,
        json!({ "price": 45_000 }),
        &tech(TECH_A),
    )
    .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = post_json_auth(
        app.router.clone(),
        &uri,
        json!({ "price": 44_000 }),
        &tech(TECH_B),
    )
    .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(second).await["code"], "CONFLICT");
}

// ---------------------------------------------------------------------------
// Test: available list follows specialties and expiry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn available_list_follows_specialty_and_expiry() {
    let app = common::build_test_app();
    let request = create_request(&app, Some(1)).await;
    let id = request["id"].as_i64().unwrap();

    let response = get_auth(
        app.router.clone(),
        "/api/v1/technicians/me/available",
        &tech(TECH_A),
    )
    .await;
    let available = body_json(response).await["data"].clone();
    assert_eq!(available.as_array().unwrap().len(), 1);
    assert_eq!(available[0]["id"], id);

    let response = get_auth(
        app.router.clone(),
        "/api/v1/technicians/me/available",
        &tech(TECH_OVEN),
    )
    .await;
    assert!(body_json(response).await["data"]
        .as_array()
        .unwrap()
        .is_empty());

    app.clock.advance(Duration::seconds(61));

    let response = get_auth(
        app.router.clone(),
        "/api/v1/technicians/me/available",
        &tech(TECH_A),
    )
    .await;
    assert!(body_json(response).await["data"]
        .as_array()
        .unwrap()
        .is_empty());

    let response = get_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}"),
        &client(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let row = body_json(response).await["data"].clone();
    assert_eq!(status_of(&row), i64::from(RequestStatus::Expired.id()));
    assert!(!row["cancelled_at"].is_null());
}

// ---------------------------------------------------------------------------
// Test: full lifecycle with an alternative date
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_lifecycle_with_alternative_date() {
    let app = common::build_test_app();
    let request = create_request(&app, None).await;
    let id = request["id"].as_i64().unwrap();

    let offer = place_offer(&app, id, TECH_A, 45_000).await;
    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/offers/{}/accept", offer["id"]),
        json!({}),
        &client(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/schedule"),
        json!({ "scheduled_at": "2026-03-03T10:00:00Z", "comment": "Ring twice" }),
        &tech(TECH_A),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let scheduled = body_json(response).await["data"].clone();
    assert_eq!(scheduled["scheduled_at"], "2026-03-03T10:00:00Z");

    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/alternative-dates"),
        json!({ "proposed_date_time": "2026-03-04T15:00:00Z" }),
        &tech(TECH_A),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let proposal = body_json(response).await["data"].clone();

    let response = post_json_auth(
        app.router.clone(),
        &format!(
            "/api/v1/service-requests/{id}/alternative-dates/{}/accept",
            proposal["id"]
        ),
        json!({}),
        &client(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let moved = body_json(response).await["data"].clone();
    assert_eq!(moved["scheduled_at"], "2026-03-04T15:00:00Z");

    let response = get_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/alternative-dates"),
        &client(),
    )
    .await;
    assert_eq!(body_json(response).await["data"].as_array().unwrap().len(), 1);

    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/start"),
        json!({}),
        &tech(TECH_A),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/complete"),
        json!({}),
        &client(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let done = body_json(response).await["data"].clone();
    assert_eq!(status_of(&done), i64::from(RequestStatus::Completed.id()));

    // Terminal: cancelling now conflicts.
    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/cancel"),
        json!({}),
        &client(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// Test: client raises the price and accepts at their own price
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_updates_price_then_accepts_own_price() {
    let app = common::build_test_app();
    let request = create_request(&app, None).await;
    let id = request["id"].as_i64().unwrap();

    let response = put_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/client-price"),
        json!({ "client_price": 55_000 }),
        &client(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["client_price"], 55_000);

    place_offer(&app, id, TECH_A, 60_000).await;

    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/accept"),
        json!({ "accept_client_price": true }),
        &client(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let accepted = body_json(response).await["data"].clone();
    assert_eq!(accepted["technician_id"], TECH_A);
    assert_eq!(accepted["final_price"], 55_000);
}

// ---------------------------------------------------------------------------
// Test: counter-offer taken by a technician
// ---------------------------------------------------------------------------

#[tokio::test]
async fn technician_takes_client_counter_offer() {
    let app = common::build_test_app();
    let request = create_request(&app, None).await;
    let id = request["id"].as_i64().unwrap();
    place_offer(&app, id, TECH_A, 60_000).await;

    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/counter-offers"),
        json!({ "price": 52_000, "comment": "Meet me halfway" }),
        &client(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let counter = body_json(response).await["data"].clone();
    assert_eq!(counter["client_id"], CLIENT);

    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/offers/{}/take", counter["id"]),
        json!({}),
        &tech(TECH_A),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let accepted = body_json(response).await["data"].clone();
    assert_eq!(accepted["technician_id"], TECH_A);
    assert_eq!(accepted["final_price"], 52_000);
}

// ---------------------------------------------------------------------------
// Test: read access
// ---------------------------------------------------------------------------

#[tokio::test]
async fn other_client_cannot_view_request() {
    let app = common::build_test_app();
    let request = create_request(&app, None).await;
    let uri = format!("/api/v1/service-requests/{}", request["id"]);

    let response = get_auth(app.router.clone(), &uri, &token(OTHER_CLIENT, "client")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = get_auth(app.router.clone(), &uri, &token(ADMIN, "admin")).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Technicians who service the appliance may look while it is open.
    let response = get_auth(app.router.clone(), &uri, &tech(TECH_B)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get_auth(app.router.clone(), &uri, &tech(TECH_OVEN)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn technician_outside_specialty_cannot_offer() {
    let app = common::build_test_app();
    let request = create_request(&app, None).await;
    let id = request["id"].as_i64().unwrap();

    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/offer-price"),
        json!({ "price": 45_000 }),
        &tech(TECH_OVEN),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "FORBIDDEN");

    let response = post_json_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/take"),
        json!({}),
        &tech(TECH_OVEN),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn technician_sees_only_own_offers_on_open_request() {
    let app = common::build_test_app();
    let request = create_request(&app, None).await;
    let id = request["id"].as_i64().unwrap();
    place_offer(&app, id, TECH_A, 45_000).await;
    place_offer(&app, id, TECH_B, 44_000).await;

    let response = get_auth(
        app.router.clone(),
        &format!("/api/v1/service-requests/{id}/offers"),
        &tech(TECH_A),
    )
    .await;
    let offers = body_json(response).await["data"].clone();
    let offers = offers.as_array().unwrap();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0]["technician_id"], TECH_A);
}

#[tokio::test]
async fn unknown_request_returns_404() {
    let app = common::build_test_app();
    let response = get_auth(
        app.router,
        "/api/v1/service-requests/999999",
        &client(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn client_lists_own_requests() {
    let app = common::build_test_app();
    create_request(&app, None).await;
    create_request(&app, None).await;

    let response = get_auth(
        app.router.clone(),
        "/api/v1/clients/me/service-requests",
        &client(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"].as_array().unwrap().len(), 2);

    let response = get_auth(
        app.router,
        "/api/v1/clients/me/service-requests",
        &token(OTHER_CLIENT, "client"),
    )
    .await;
    assert!(body_json(response).await["data"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn health_is_public_but_api_is_not() {
    let app = common::build_test_app();
    let response = get(app.router.clone(), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(app.router, "/api/v1/technicians/me/available").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
