use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use repairlink_core::directory::Directory;
use repairlink_db::directory::PgDirectory;
use repairlink_events::EventBus;
use repairlink_negotiation::postgres::PgMarketStore;
use repairlink_negotiation::LifecycleEngine;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use repairlink_api::config::ServerConfig;
use repairlink_api::notifications::EventDispatcher;
use repairlink_api::router::build_app_router;
use repairlink_api::state::AppState;
use repairlink_api::{background, ws};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repairlink_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = repairlink_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    repairlink_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    repairlink_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // -- Engine and event plumbing --

    let event_bus = Arc::new(EventBus::default());
    let directory: Arc<dyn Directory> = Arc::new(PgDirectory::new(pool.clone()));
    let engine = Arc::new(LifecycleEngine::new(
        Arc::new(PgMarketStore::new(pool)),
        Arc::clone(&directory),
        Arc::clone(&event_bus),
    ));

    let registry = Arc::new(ws::ConnectionRegistry::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&registry));

    let dispatcher = EventDispatcher::new(Arc::clone(&registry), directory);
    let dispatcher_handle = tokio::spawn(dispatcher.run(event_bus.subscribe()));

    let sweep_cancel = CancellationToken::new();
    let sweep_handle = tokio::spawn(background::expiry_sweep::run(
        Arc::clone(&engine),
        Duration::from_secs(config.expiry_sweep_interval_secs),
        sweep_cancel.clone(),
    ));
    tracing::info!("Event dispatcher and expiry sweep started");

    let state = AppState {
        config: Arc::new(config.clone()),
        engine: Arc::clone(&engine),
        registry: Arc::clone(&registry),
        event_bus: Arc::clone(&event_bus),
    };

    let app = build_app_router(state, &config);

    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server stopped accepting connections, cleaning up");

    let grace = Duration::from_secs(config.shutdown_timeout_secs);

    sweep_cancel.cancel();
    let _ = tokio::time::timeout(grace, sweep_handle).await;
    tracing::info!("Expiry sweep stopped");

    // The dispatcher ends once every bus handle is gone.
    drop(engine);
    drop(event_bus);
    if tokio::time::timeout(grace, dispatcher_handle).await.is_err() {
        tracing::warn!("Event dispatcher did not stop in time");
    }

    let ws_count = registry.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    registry.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
