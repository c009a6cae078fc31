//! In-process router fixture for handler tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use recorder_betfair::{CatalogueRequest, MarketDataClient};
use recorder_core::{
    Credentials, MarketBook, MarketCatalogue, PartialConfig, PriceData, RecorderConfig,
    RecorderError, RecorderResult,
};
use recorder_services::{EngineDeps, EngineOptions, ManualClock, RecorderEngine};
use recorder_storage::{ConfigStore, MemoryObjectStore, ObjectStore, StateStore};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::AppState;

pub const TOKEN: &str = "api-test-session-token-42";

/// Exchange stub serving two fixed markets
#[derive(Default)]
pub struct StubClient {
    pub reject_session: AtomicBool,
}

pub fn market(id: &str, hour: u32) -> MarketCatalogue {
    serde_json::from_value(json!({
        "marketId": id,
        "marketName": "R1 5f Hcap",
        "marketStartTime": format!("2026-05-02T{:02}:15:00Z", hour),
        "totalMatched": 42.0,
        "event": {"id": "31", "name": "Chester 2nd May", "countryCode": "GB", "venue": "Chester"},
        "runners": [{"selectionId": 7, "runnerName": "Seven", "handicap": 0, "sortPriority": 1}]
    }))
    .unwrap()
}

pub fn book(id: &str) -> MarketBook {
    serde_json::from_value(json!({
        "marketId": id,
        "status": "OPEN",
        "inplay": false,
        "totalMatched": 120,
        "runners": [{"selectionId": 7, "status": "ACTIVE"}]
    }))
    .unwrap()
}

#[async_trait]
impl MarketDataClient for StubClient {
    async fn fetch_catalogue(
        &self,
        _credentials: &Credentials,
        _request: &CatalogueRequest,
    ) -> RecorderResult<Vec<MarketCatalogue>> {
        Ok(vec![market("1.201", 14), market("1.202", 15)])
    }

    async fn fetch_books(
        &self,
        _credentials: &Credentials,
        market_ids: &[String],
        _price_projection: &[PriceData],
    ) -> RecorderResult<Vec<MarketBook>> {
        Ok(market_ids.iter().map(|id| book(id)).collect())
    }

    async fn keepalive(&self, _credentials: &Credentials) -> RecorderResult<()> {
        Ok(())
    }

    async fn validate_session(&self, _credentials: &Credentials) -> RecorderResult<()> {
        if self.reject_session.load(Ordering::SeqCst) {
            return Err(RecorderError::auth("INVALID_SESSION_INFORMATION"));
        }
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub engine: Arc<RecorderEngine>,
    pub client: Arc<StubClient>,
    pub store: Arc<MemoryObjectStore>,
    pub dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(StubClient::default());
        let store = Arc::new(MemoryObjectStore::new());
        let durable: Arc<dyn ObjectStore> = store.clone();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 2, 11, 0, 0).unwrap(),
        ));

        let config = RecorderConfig {
            app_key: "api-test-app-key".to_string(),
            session_token: TOKEN.to_string(),
            bucket_name: "recorder-api-test".to_string(),
            ..RecorderConfig::default()
        };

        let engine = RecorderEngine::new(EngineDeps {
            client: client.clone(),
            clock,
            config,
            store: Some(durable.clone()),
            config_store: ConfigStore::new(
                PartialConfig::default(),
                Some(durable),
                dir.path().join("runtime_config.json"),
            ),
            state_store: StateStore::new(dir.path().join("state.json")),
            options: EngineOptions {
                batch_pause: Duration::ZERO,
            },
        });

        let router = crate::app(AppState {
            engine: engine.clone(),
        });

        Self {
            router,
            engine,
            client,
            store,
            dir,
        }
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

pub async fn get(app: &TestApp, uri: &str) -> (StatusCode, Value) {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn post(app: &TestApp, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    send(app, request).await
}
