//! Dashboard state and engine lifecycle endpoints

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use recorder_core::{CycleReport, EngineStatus};
use recorder_services::DashboardState;
use serde::Serialize;
use tracing::info;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize)]
struct LifecycleResponse {
    status: &'static str,
    engine: EngineStatus,
}

impl LifecycleResponse {
    fn ok(engine: EngineStatus) -> Json<Self> {
        Json(Self {
            status: "ok",
            engine,
        })
    }
}

/// Create engine routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/state", get(get_state))
        .route("/engine/start", post(start_engine))
        .route("/engine/stop", post(stop_engine))
        .route("/engine/poll", post(poll_now))
}

async fn get_state(State(state): State<AppState>) -> Json<DashboardState> {
    Json(state.engine.dashboard())
}

async fn start_engine(
    State(state): State<AppState>,
) -> Result<Json<LifecycleResponse>, ApiError> {
    let status = state.engine.start().await?;
    info!("Engine start requested over HTTP");
    Ok(LifecycleResponse::ok(status))
}

async fn stop_engine(State(state): State<AppState>) -> Json<LifecycleResponse> {
    LifecycleResponse::ok(state.engine.stop().await)
}

/// Run one cycle now. Answers 409 while another is in flight.
async fn poll_now(State(state): State<AppState>) -> Result<Json<CycleReport>, ApiError> {
    Ok(Json(state.engine.run_once().await?))
}
