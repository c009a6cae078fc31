//! Exchange Market Recorder API Server
//!
//! Runs the poll engine and serves its dashboard state, lifecycle commands
//! and the cached feed over HTTP.

mod error;
mod routes;

use axum::{
    http::{header, Method},
    Router,
};
use recorder_betfair::BetfairClient;
use recorder_core::PartialConfig;
use recorder_services::{EngineDeps, EngineOptions, RecorderEngine, SystemClock};
use recorder_storage::{ConfigStore, StateStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_RUNTIME_CONFIG_FILE: &str = "/tmp/recorder_runtime_config.json";
const DEFAULT_STATE_FILE: &str = "/tmp/recorder_state.json";
const DEFAULT_PORT: u16 = 8080;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RecorderEngine>,
}

/// Router with every endpoint mounted under `/api`
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .nest("/api", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,recorder_api=debug")),
        )
        .init();

    info!("Starting Exchange Market Recorder");

    // Environment tier, also used to locate the durable config object
    let env_layer = PartialConfig::from_env()?;
    let env_config = env_layer.clone().apply_to(Default::default());
    let env_store = recorder_storage::connect(&env_config).await;

    let runtime_config_file = std::env::var("RUNTIME_CONFIG_FILE")
        .unwrap_or_else(|_| DEFAULT_RUNTIME_CONFIG_FILE.to_string());
    let config_store = ConfigStore::new(env_layer, env_store.clone(), &runtime_config_file);
    let config = config_store.load_validated().await?;
    info!("Configuration resolved: {:?}", config.masked());

    // The resolved bucket may differ from the one named in the environment
    let store = if config.bucket_name == env_config.bucket_name
        && config.storage_endpoint == env_config.storage_endpoint
    {
        env_store
    } else {
        recorder_storage::connect(&config).await
    };

    let state_file =
        std::env::var("RECORDER_STATE_FILE").unwrap_or_else(|_| DEFAULT_STATE_FILE.to_string());

    let engine = RecorderEngine::new(EngineDeps {
        client: Arc::new(BetfairClient::new()),
        clock: Arc::new(SystemClock),
        config,
        store,
        config_store,
        state_store: StateStore::new(state_file),
        options: EngineOptions::default(),
    });

    if engine.restore_state() {
        info!("Engine was running before restart, resuming");
        if let Err(e) = engine.start().await {
            error!("Failed to resume engine: {}", e);
        }
    }

    let app = app(AppState {
        engine: engine.clone(),
    });

    // Start server
    let port = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
