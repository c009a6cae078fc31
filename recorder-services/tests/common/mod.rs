//! Shared fixtures for engine tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use recorder_betfair::{CatalogueRequest, MarketDataClient};
use recorder_core::{
    Credentials, MarketBook, MarketCatalogue, PartialConfig, PriceData, RecorderConfig,
    RecorderError, RecorderResult,
};
use recorder_services::{EngineDeps, EngineOptions, ManualClock, RecorderEngine};
use recorder_storage::{ConfigStore, MemoryObjectStore, ObjectStore, StateStore};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Validate,
    Keepalive,
    Catalogue,
    Books(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Auth,
    Transport,
    Empty,
    Weight,
}

impl Failure {
    fn error(&self) -> RecorderError {
        match self {
            Failure::Auth => RecorderError::auth("INVALID_SESSION_INFORMATION"),
            Failure::Transport => RecorderError::transport("connection reset"),
            Failure::Empty => RecorderError::empty("no markets"),
            Failure::Weight => RecorderError::weight_exceeded(470, 200),
        }
    }
}

/// Exchange client that answers from a script and records every call
#[derive(Default)]
pub struct ScriptedClient {
    pub calls: Mutex<Vec<Call>>,
    pub markets: Mutex<Vec<MarketCatalogue>>,
    pub catalogue_failure: Mutex<Option<Failure>>,
    pub book_failure: Mutex<Option<Failure>>,
    /// Any batch containing one of these ids fails with a transport error
    pub failing_ids: Mutex<HashSet<String>>,
    pub keepalive_failure: Mutex<Option<Failure>>,
    pub session_failure: Mutex<Option<Failure>>,
    pub catalogue_delay: Mutex<Duration>,
}

impl ScriptedClient {
    pub fn with_markets(ids: &[&str]) -> Arc<Self> {
        let client = Self::default();
        *client.markets.lock() = ids
            .iter()
            .enumerate()
            .map(|(i, id)| market(id, 13 + i as u32))
            .collect();
        Arc::new(client)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn book_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Books(_)))
            .count()
    }
}

#[async_trait]
impl MarketDataClient for ScriptedClient {
    async fn fetch_catalogue(
        &self,
        _credentials: &Credentials,
        _request: &CatalogueRequest,
    ) -> RecorderResult<Vec<MarketCatalogue>> {
        self.calls.lock().push(Call::Catalogue);
        let delay = *self.catalogue_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = *self.catalogue_failure.lock() {
            return Err(failure.error());
        }
        Ok(self.markets.lock().clone())
    }

    async fn fetch_books(
        &self,
        _credentials: &Credentials,
        market_ids: &[String],
        _price_projection: &[PriceData],
    ) -> RecorderResult<Vec<MarketBook>> {
        self.calls.lock().push(Call::Books(market_ids.to_vec()));
        if let Some(failure) = *self.book_failure.lock() {
            return Err(failure.error());
        }
        if market_ids
            .iter()
            .any(|id| self.failing_ids.lock().contains(id))
        {
            return Err(Failure::Transport.error());
        }
        Ok(market_ids.iter().map(|id| book(id)).collect())
    }

    async fn keepalive(&self, _credentials: &Credentials) -> RecorderResult<()> {
        self.calls.lock().push(Call::Keepalive);
        match *self.keepalive_failure.lock() {
            Some(failure) => Err(failure.error()),
            None => Ok(()),
        }
    }

    async fn validate_session(&self, _credentials: &Credentials) -> RecorderResult<()> {
        self.calls.lock().push(Call::Validate);
        match *self.session_failure.lock() {
            Some(failure) => Err(failure.error()),
            None => Ok(()),
        }
    }
}

pub fn market(id: &str, hour: u32) -> MarketCatalogue {
    serde_json::from_value(json!({
        "marketId": id,
        "marketName": format!("Race {}", id),
        "marketStartTime": format!("2026-03-10T{:02}:30:00Z", hour),
        "totalMatched": 250.5,
        "event": {"id": "1", "name": "Kempton 10th Mar", "countryCode": "GB", "venue": "Kempton"},
        "runners": [
            {"selectionId": 1, "runnerName": "One", "handicap": 0, "sortPriority": 1},
            {"selectionId": 2, "runnerName": "Two", "handicap": 0, "sortPriority": 2}
        ]
    }))
    .unwrap()
}

pub fn book(id: &str) -> MarketBook {
    serde_json::from_value(json!({
        "marketId": id,
        "status": "OPEN",
        "inplay": false,
        "totalMatched": 1000,
        "runners": [
            {"selectionId": 1, "status": "ACTIVE", "ex": {"availableToBack": [{"price": 2.5, "size": 10}], "availableToLay": []}},
            {"selectionId": 2, "status": "ACTIVE", "ex": {"availableToBack": [], "availableToLay": [{"price": 4.0, "size": 3}]}}
        ]
    }))
    .unwrap()
}

pub const TOKEN: &str = "session-token-0123456789abcdef";

pub fn test_config() -> RecorderConfig {
    RecorderConfig {
        app_key: "test-app-key".to_string(),
        session_token: TOKEN.to_string(),
        bucket_name: "recorder-test".to_string(),
        countries: vec!["GB".to_string()],
        ..RecorderConfig::default()
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

pub struct Harness {
    pub engine: Arc<RecorderEngine>,
    pub client: Arc<ScriptedClient>,
    pub store: Arc<MemoryObjectStore>,
    pub clock: Arc<ManualClock>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(client: Arc<ScriptedClient>) -> Self {
        Self::with_config(client, test_config())
    }

    pub fn with_config(client: Arc<ScriptedClient>, config: RecorderConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(start_time()));
        let store = Arc::new(MemoryObjectStore::new());
        let engine = build_engine(&dir, client.clone(), clock.clone(), store.clone(), config);

        Self {
            engine,
            client,
            store,
            clock,
            dir,
        }
    }

    /// A second engine over the same local files, as after a restart
    pub fn restarted(&self) -> Arc<RecorderEngine> {
        build_engine(
            &self.dir,
            self.client.clone(),
            self.clock.clone(),
            self.store.clone(),
            test_config(),
        )
    }

    pub fn state_path(&self) -> std::path::PathBuf {
        self.dir.path().join("state.json")
    }

    pub fn config_path(&self) -> std::path::PathBuf {
        self.dir.path().join("runtime_config.json")
    }

    /// Lines of the stored object `key`
    pub fn lines(&self, key: &str) -> Vec<serde_json::Value> {
        let object = self.store.object(key).expect("object written");
        String::from_utf8(object.body)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }
}

fn build_engine(
    dir: &TempDir,
    client: Arc<ScriptedClient>,
    clock: Arc<ManualClock>,
    store: Arc<MemoryObjectStore>,
    config: RecorderConfig,
) -> Arc<RecorderEngine> {
    let store: Arc<dyn ObjectStore> = store;
    RecorderEngine::new(EngineDeps {
        client,
        clock,
        config,
        store: Some(store.clone()),
        config_store: ConfigStore::new(
            PartialConfig::default(),
            Some(store),
            dir.path().join("runtime_config.json"),
        ),
        state_store: StateStore::new(dir.path().join("state.json")),
        options: EngineOptions {
            batch_pause: Duration::ZERO,
        },
    })
}

/// Poll until `check` holds or two seconds pass
pub async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
