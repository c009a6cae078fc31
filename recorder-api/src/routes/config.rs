//! Runtime configuration endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    routing::get,
    Router,
};
use recorder_core::{PartialConfig, RecorderConfig, RecorderError};
use recorder_services::ConfigUpdate;

use crate::error::ApiError;
use crate::AppState;

/// Create config routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/config", get(get_config).post(update_config))
}

/// Current configuration with secrets masked
async fn get_config(State(state): State<AppState>) -> Json<RecorderConfig> {
    Json(state.engine.config().masked())
}

/// Merge the posted fields over the current configuration
async fn update_config(
    State(state): State<AppState>,
    payload: Result<Json<PartialConfig>, JsonRejection>,
) -> Result<Json<ConfigUpdate>, ApiError> {
    let Json(update) =
        payload.map_err(|e| RecorderError::parse(format!("Invalid config body: {}", e)))?;
    Ok(Json(state.engine.update_config(update).await?))
}
