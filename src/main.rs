//! warroom - multi-tenant agent-team orchestrator
//!
//! Materializes declarative team descriptions as isolated runtimes: one
//! chat gateway, one shared workspace and one container per agent, with
//! chat routing, liveness tracking and a push channel for observers.

mod api;
mod auth;
mod broadcast;
mod chat;
mod config;
mod driver;
mod error;
mod events;
mod lifecycle;
mod liveness;
mod router;
mod sidecar;
mod store;

use api::{create_router, AppState};
use auth::StaticTenantDirectory;
use broadcast::Broadcaster;
use chat::irc::IrcConnector;
use chat::ChatConnector;
use config::{Config, DriverKind};
use driver::{compose::ComposeDriver, testing::MockDriver, ContainerDriver};
use lifecycle::LifecycleManager;
use liveness::LivenessTracker;
use router::Router;
use sidecar::SidecarControl;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use store::Database;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warroom=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "Opening store");
    let store = Database::open(&config.db_path)?;

    let driver: Arc<dyn ContainerDriver> = match config.driver {
        DriverKind::Compose => Arc::new(ComposeDriver::new(&config.state_dir)),
        DriverKind::Mock => {
            tracing::warn!("Running with the mock container driver; no containers will start");
            Arc::new(MockDriver::new())
        }
    };
    let chat: Arc<dyn ChatConnector> = Arc::new(IrcConnector);
    let tenants = Arc::new(StaticTenantDirectory::new(&config.api_keys));
    if config.api_keys.is_empty() {
        tracing::warn!("No API keys configured. Set WARROOM_API_KEYS=tenant:key[,tenant:key]");
    }

    // Core components
    let broadcaster = Arc::new(Broadcaster::new(config.subscriber_queue));
    let message_router = Arc::new(Router::new(
        config.channel_buffer_capacity,
        broadcaster.clone(),
    ));
    let sidecar = Arc::new(SidecarControl::new(driver.clone(), broadcaster.clone()));
    let liveness = Arc::new(LivenessTracker::new(
        store.clone(),
        broadcaster.clone(),
        sidecar.clone(),
        config.stall_timeout,
    ));
    let lifecycle = Arc::new(LifecycleManager::new(
        store.clone(),
        driver,
        chat,
        message_router,
        broadcaster.clone(),
        sidecar.clone(),
        liveness.clone(),
        config.startup_window,
        config.chat_port_base,
    ));

    // Reconcile persisted teams with whatever the container runtime still
    // has; never auto-starts anything.
    lifecycle.rehydrate().await?;

    // Escalation ticker
    let shutdown = CancellationToken::new();
    let ticker = tokio::spawn(liveness.clone().run(shutdown.clone()));

    // Create application state and router
    let state = AppState::new(lifecycle, broadcaster, liveness, sidecar, store, tenants);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state).layer(cors).layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("warroom orchestrator listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    shutdown.cancel();
    let _ = ticker.await;

    Ok(())
}
