use std::sync::Arc;

use repairlink_events::EventBus;
use repairlink_negotiation::LifecycleEngine;

use crate::config::ServerConfig;
use crate::ws::ConnectionRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (JWT settings are read by the auth extractor).
    pub config: Arc<ServerConfig>,
    /// The service-request lifecycle engine. Owns persistence and the
    /// collaborator directory.
    pub engine: Arc<LifecycleEngine>,
    /// Live WebSocket connections and their room memberships.
    pub registry: Arc<ConnectionRegistry>,
    /// Bus the engine publishes lifecycle events on.
    pub event_bus: Arc<EventBus>,
}
