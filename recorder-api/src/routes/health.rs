//! Health check endpoints

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use recorder_core::EngineStatus;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    engine: EngineStatus,
    service: &'static str,
}

/// Health check handler. A rejected session reports degraded.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let engine = state.engine.status();

    let (code, status) = if engine == EngineStatus::AuthError {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "healthy")
    };

    let response = HealthResponse {
        status,
        engine,
        service: "market-recorder",
    };

    (code, Json(response))
}

/// Simple liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
}
