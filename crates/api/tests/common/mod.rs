#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use repairlink_core::types::DbId;
use repairlink_events::EventBus;
use repairlink_negotiation::clock::ManualClock;
use repairlink_negotiation::memory::{InMemoryStore, StaticDirectory};
use repairlink_negotiation::LifecycleEngine;
use tower::ServiceExt;

use repairlink_api::auth::jwt::{generate_access_token, JwtConfig};
use repairlink_api::config::{ServerConfig, DEFAULT_EXPIRY_SWEEP_INTERVAL_SECS};
use repairlink_api::router::build_app_router;
use repairlink_api::state::AppState;
use repairlink_api::ws::ConnectionRegistry;

pub const CLIENT: DbId = 1;
pub const OTHER_CLIENT: DbId = 2;
pub const TECH_A: DbId = 10;
pub const TECH_B: DbId = 11;
pub const TECH_OVEN: DbId = 12;
pub const ADMIN: DbId = 99;
pub const WASHER: DbId = 100;
pub const OVEN: DbId = 200;

/// Build a test `ServerConfig` with safe defaults and a fixed JWT secret.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        expiry_sweep_interval_secs: DEFAULT_EXPIRY_SWEEP_INTERVAL_SECS,
        jwt: test_jwt(),
    }
}

pub fn test_jwt() -> JwtConfig {
    JwtConfig {
        secret: "test-secret-for-integration-tests".to_string(),
        access_token_expiry_mins: 15,
    }
}

/// Two clients, two washer technicians, one oven technician and an admin.
pub fn test_directory() -> StaticDirectory {
    StaticDirectory::new()
        .with_user(CLIENT, "client", "Dana")
        .with_user(OTHER_CLIENT, "client", "Robin")
        .with_user(TECH_A, "technician", "Alex")
        .with_user(TECH_B, "technician", "Blair")
        .with_user(TECH_OVEN, "technician", "Casey")
        .with_user(ADMIN, "admin", "Sam")
        .with_appliance(WASHER, "washing_machine", "Bosch", "Serie 4")
        .with_appliance(OVEN, "oven", "Miele", "H 2265")
        .with_specialty(TECH_A, "washing_machine")
        .with_specialty(TECH_B, "washing_machine")
        .with_specialty(TECH_OVEN, "oven")
}

/// The router plus handles on everything behind it.
pub struct TestApp {
    pub router: Router,
    pub engine: Arc<LifecycleEngine>,
    pub clock: Arc<ManualClock>,
    pub registry: Arc<ConnectionRegistry>,
    pub event_bus: Arc<EventBus>,
}

/// Build the full application router over the in-memory store.
///
/// Uses the same `build_app_router` as the binary, so tests exercise the
/// production middleware stack.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
    ));
    let event_bus = Arc::new(EventBus::default());
    let engine = Arc::new(
        LifecycleEngine::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(test_directory()),
            Arc::clone(&event_bus),
        )
        .with_clock(clock.clone()),
    );
    let registry = Arc::new(ConnectionRegistry::new());

    let state = AppState {
        config: Arc::new(config.clone()),
        engine: Arc::clone(&engine),
        registry: Arc::clone(&registry),
        event_bus: Arc::clone(&event_bus),
    };

    TestApp {
        router: build_app_router(state, &config),
        engine,
        clock,
        registry,
        event_bus,
    }
}

/// Mint an access token the test app accepts.
pub fn token(user_id: DbId, role: &str) -> String {
    generate_access_token(user_id, role, &test_jwt()).unwrap()
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send_json_auth(app, Method::POST, uri, body, token).await
}

pub async fn put_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send_json_auth(app, Method::PUT, uri, body, token).await
}

async fn send_json_auth(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
