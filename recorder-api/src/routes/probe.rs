//! Connectivity probes

use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};
use recorder_services::SessionProbe;
use serde::Serialize;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize)]
struct StorageProbeResponse {
    ok: bool,
    message: String,
}

/// Create probe routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/probe/session", post(probe_session))
        .route("/probe/storage", post(probe_storage))
}

/// Validate the stored session. Restarts the engine when it was in AUTH_ERROR.
async fn probe_session(State(state): State<AppState>) -> (StatusCode, Json<SessionProbe>) {
    let probe = state.engine.probe_session().await;
    let code = if probe.validation.valid {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };
    (code, Json(probe))
}

async fn probe_storage(
    State(state): State<AppState>,
) -> Result<Json<StorageProbeResponse>, ApiError> {
    let message = state.engine.probe_storage().await?;
    Ok(Json(StorageProbeResponse { ok: true, message }))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{post, TestApp};
    use axum::http::StatusCode;
    use recorder_storage::ObjectStore;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_session_probe() {
        let app = TestApp::new();
        let (status, body) = post(&app, "/api/probe/session", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], true);
        assert_eq!(body["restarted"], false);

        app.client.reject_session.store(true, Ordering::SeqCst);
        let (status, body) = post(&app, "/api/probe/session", json!({})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["valid"], false);
    }

    #[tokio::test]
    async fn test_storage_probe() {
        let app = TestApp::new();
        app.store
            .put("probe/seed.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();

        let (status, body) = post(&app, "/api/probe/storage", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["message"], "1 objects in memory");
    }
}
