//! Recorder engine: poll scheduler and lifecycle state machine
//!
//! ```text
//! STOPPED --start--> STARTING --first answered cycle--> RUNNING
//! RUNNING -> POLLING -> WRITING -> RUNNING          (each cycle)
//! any --session rejected--> AUTH_ERROR              (loop ends)
//! AUTH_ERROR --start / good session probe--> STARTING
//! active --stop--> STOPPED                          (after the in-flight cycle)
//! ```
//!
//! At most one cycle runs at a time. The periodic loop and manual polls both
//! go through a single-permit semaphore; a trigger that finds it taken is
//! dropped, never queued.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use recorder_betfair::{compute_batch_size, plan_batches, CatalogueRequest, MarketDataClient};
use recorder_core::{
    mask_secret, ActivityEntry, CycleOutcome, CycleReport, EngineState, EngineStats, EngineStatus,
    ErrorEntry, LogLevel, MarketBook, MarketCatalogue, MarketSummary, PartialConfig,
    PollCycleRecord, RecorderConfig, RecorderError, RecorderResult,
};
use recorder_storage::{
    encode_records, object_key, ConfigStore, FlushReport, ObjectStore, RecordWriter, SaveReport,
    StateStore, Stream,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::session::{SessionManager, SessionStatus, SessionValidation};
use crate::snapshot_cache::{FeedAggregates, FeedSnapshot, SnapshotCache};

/// State and config are snapshotted every this many polls
const PERSIST_EVERY_POLLS: u64 = 5;
const DASHBOARD_ERRORS: usize = 20;
const DASHBOARD_ACTIVITY: usize = 50;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Pause between book batches
    pub batch_pause: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            batch_pause: Duration::from_millis(200),
        }
    }
}

/// Everything the engine needs, wired up by the binary
pub struct EngineDeps {
    pub client: Arc<dyn MarketDataClient>,
    pub clock: Arc<dyn Clock>,
    pub config: RecorderConfig,
    pub store: Option<Arc<dyn ObjectStore>>,
    pub config_store: ConfigStore,
    pub state_store: StateStore,
    pub options: EngineOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStatus {
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub pending_writes: usize,
}

/// Everything the dashboard shows, cloned out of the engine
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub status: EngineStatus,
    pub authenticated: bool,
    pub session: SessionStatus,
    pub current_date: chrono::NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_poll_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_poll_duration_ms: Option<u64>,
    pub poll_count: u64,
    pub poll_interval_seconds: u64,
    pub stats: EngineStats,
    pub markets_cached: usize,
    pub books_cached: usize,
    pub feed: FeedAggregates,
    pub storage: StorageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_catalogue_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_books_key: Option<String>,
    pub markets: Vec<MarketSummary>,
    pub errors: Vec<ErrorEntry>,
    pub cycles: Vec<PollCycleRecord>,
    pub activity: Vec<ActivityEntry>,
    pub config: RecorderConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    /// The new configuration, token masked
    pub config: RecorderConfig,
    pub saved: SaveReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProbe {
    #[serde(flatten)]
    pub validation: SessionValidation,
    /// The engine left AUTH_ERROR and restarted
    pub restarted: bool,
    pub status: EngineStatus,
}

/// Values shown instead of the real token never overwrite it
fn is_masked_token(token: &str) -> bool {
    token.starts_with("...") || token == "***"
}

pub struct RecorderEngine {
    client: Arc<dyn MarketDataClient>,
    clock: Arc<dyn Clock>,
    session: SessionManager,
    cache: SnapshotCache,
    state: RwLock<EngineState>,
    config: RwLock<Arc<RecorderConfig>>,
    store: RwLock<Option<Arc<dyn ObjectStore>>>,
    config_store: ConfigStore,
    state_store: StateStore,
    writer: tokio::sync::Mutex<RecordWriter>,
    pending_writes: AtomicUsize,
    /// Single-flight guard for poll cycles
    cycle_guard: Semaphore,
    /// Serializes start and stop
    lifecycle: tokio::sync::Mutex<()>,
    stop_requested: AtomicBool,
    loop_active: AtomicBool,
    wake: Notify,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    options: EngineOptions,
}

impl RecorderEngine {
    pub fn new(deps: EngineDeps) -> Arc<Self> {
        let today = deps.clock.today();
        let session = SessionManager::new(
            deps.client.clone(),
            deps.clock.clone(),
            deps.config.credentials(),
        );

        let mut state = EngineState::new(today);
        state.log(deps.clock.now(), LogLevel::Info, "Recorder initialised");

        Arc::new(Self {
            client: deps.client,
            clock: deps.clock,
            session,
            cache: SnapshotCache::new(),
            state: RwLock::new(state),
            config: RwLock::new(Arc::new(deps.config)),
            store: RwLock::new(deps.store),
            config_store: deps.config_store,
            state_store: deps.state_store,
            writer: tokio::sync::Mutex::new(RecordWriter::new()),
            pending_writes: AtomicUsize::new(0),
            cycle_guard: Semaphore::new(1),
            lifecycle: tokio::sync::Mutex::new(()),
            stop_requested: AtomicBool::new(false),
            loop_active: AtomicBool::new(false),
            wake: Notify::new(),
            loop_handle: Mutex::new(None),
            options: deps.options,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn status(&self) -> EngineStatus {
        self.state.read().status
    }

    pub fn config(&self) -> Arc<RecorderConfig> {
        self.config.read().clone()
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn is_loop_active(&self) -> bool {
        self.loop_active.load(Ordering::SeqCst)
    }

    fn store(&self) -> Option<Arc<dyn ObjectStore>> {
        self.store.read().clone()
    }

    fn update_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        f(&mut *self.state.write())
    }

    fn set_status(&self, status: EngineStatus) {
        self.update_state(|s| s.status = status);
    }

    fn log_activity(&self, level: LogLevel, message: impl Into<String>) {
        let now = self.clock.now();
        self.update_state(|s| s.log(now, level, message));
    }

    fn record_error(&self, message: impl Into<String>) {
        let now = self.clock.now();
        self.update_state(|s| s.record_error(now, message));
    }

    fn persist_state(&self) {
        let persisted = self.state.read().to_persisted(self.clock.now());
        if let Err(e) = self.state_store.save(&persisted) {
            warn!("Failed to persist engine state: {}", e);
        }
    }

    /// State file plus the local config snapshot
    fn persist_snapshot(&self) {
        self.persist_state();
        if let Err(e) = self.config_store.save_local(&self.config()) {
            warn!("Failed to snapshot config: {}", e);
        }
    }

    /// Clone out the dashboard view
    pub fn dashboard(&self) -> DashboardState {
        let now = self.clock.now();
        let config = self.config();
        let snapshot = self.cache.snapshot();
        let session = self.session.status();
        let store = self.store();
        let state = self.state.read();

        DashboardState {
            status: state.status,
            authenticated: session.valid == Some(true),
            session,
            current_date: state.current_date,
            last_poll_at: state.last_poll_at,
            last_poll_duration_ms: state.last_poll_duration_ms,
            poll_count: state.poll_count,
            poll_interval_seconds: config.poll_interval_seconds,
            stats: state.stats.clone(),
            markets_cached: snapshot.catalogue.len(),
            books_cached: snapshot.books.len(),
            feed: snapshot.aggregates.clone(),
            storage: StorageStatus {
                configured: store.is_some(),
                location: store.as_ref().map(|s| s.location()),
                pending_writes: self.pending_writes.load(Ordering::SeqCst),
            },
            last_catalogue_key: state.last_catalogue_key.clone(),
            last_books_key: state.last_books_key.clone(),
            markets: snapshot.summaries(now),
            errors: state.errors.tail(DASHBOARD_ERRORS),
            cycles: state.cycles.iter().cloned().collect(),
            activity: state.activity.tail(DASHBOARD_ACTIVITY),
            config: config.masked(),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Restore same-day state from the state file. Returns true when the
    /// engine was active at the time and should resume.
    pub fn restore_state(&self) -> bool {
        let Some(persisted) = self.state_store.load(self.clock.today()) else {
            return false;
        };

        let resume = persisted.was_active();
        let status = if persisted.status == EngineStatus::AuthError {
            EngineStatus::AuthError
        } else {
            EngineStatus::Stopped
        };
        let polls = persisted.poll_count;

        self.update_state(|s| {
            s.restore(persisted);
            s.status = status;
        });
        self.log_activity(
            LogLevel::Info,
            format!("Restored state with {} polls today", polls),
        );
        resume
    }

    /// Validate the session and start the periodic loop
    pub async fn start(self: &Arc<Self>) -> RecorderResult<EngineStatus> {
        let _lifecycle = self.lifecycle.lock().await;

        if !self.session.has_credentials() {
            return Err(RecorderError::auth("No app key or session token configured"));
        }
        if self.is_loop_active() || self.status().is_active() {
            return Err(RecorderError::busy("Engine is already running"));
        }

        let validation = self.session.validate_current().await;
        if !validation.valid {
            warn!("Start refused, session invalid: {}", validation.message);
            self.update_state(|s| s.status = EngineStatus::AuthError);
            self.record_error(format!("Session validation failed: {}", validation.message));
            self.persist_state();
            return Err(RecorderError::auth(validation.message));
        }

        self.launch();
        Ok(self.status())
    }

    /// Spawn the loop. Caller holds the lifecycle lock and has validated the session.
    fn launch(self: &Arc<Self>) {
        self.stop_requested.store(false, Ordering::SeqCst);
        self.loop_active.store(true, Ordering::SeqCst);
        self.set_status(EngineStatus::Starting);
        self.log_activity(LogLevel::Info, "Engine started");
        info!("Recorder engine starting");

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            engine.run_loop().await;
        });
        *self.loop_handle.lock() = Some(handle);
    }

    /// Ask the loop to stop after any in-flight cycle. Does not wait.
    pub async fn stop(&self) -> EngineStatus {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_requested.store(true, Ordering::SeqCst);

        if self.is_loop_active() {
            info!("Stop requested");
            self.log_activity(LogLevel::Info, "Stop requested");
            self.wake.notify_one();
        } else {
            self.set_status(EngineStatus::Stopped);
            self.log_activity(LogLevel::Info, "Engine stopped");
            self.persist_snapshot();
        }
        self.status()
    }

    /// Stop and wait for the loop to finish
    pub async fn shutdown(&self) {
        self.stop().await;
        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Engine loop ended abnormally: {}", e);
            }
        }
        info!("Recorder engine shut down");
    }

    async fn run_loop(self: Arc<Self>) {
        let mut period = Duration::from_secs(self.config().poll_interval_seconds);
        let mut ticker = interval_at(tokio::time::Instant::now(), period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Poll loop running every {}s", period.as_secs());

        loop {
            let ticked = tokio::select! {
                _ = ticker.tick() => true,
                _ = self.wake.notified() => false,
            };

            if self.stop_requested.load(Ordering::SeqCst) {
                break;
            }

            if !ticked {
                let configured = Duration::from_secs(self.config().poll_interval_seconds);
                if configured != period {
                    info!("Poll interval changed to {}s", configured.as_secs());
                    period = configured;
                    ticker = interval_at(tokio::time::Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                }
                continue;
            }

            match self.cycle_guard.try_acquire() {
                Ok(_permit) => {
                    self.run_cycle().await;
                }
                Err(_) => debug!("Cycle already in flight, skipping tick"),
            }

            if self.stop_requested.load(Ordering::SeqCst) {
                break;
            }
            if self.status() == EngineStatus::AuthError {
                warn!("Session rejected, poll loop ending");
                break;
            }
        }

        // Let a manual cycle in flight finish before settling the status
        let _permit = self.cycle_guard.acquire().await;
        self.loop_active.store(false, Ordering::SeqCst);

        if self.stop_requested.load(Ordering::SeqCst) {
            self.set_status(EngineStatus::Stopped);
            self.log_activity(LogLevel::Info, "Engine stopped");
            info!("Recorder engine stopped");
            self.persist_snapshot();
        } else {
            self.persist_state();
        }
    }

    // ========================================================================
    // Cycles
    // ========================================================================

    /// Run one cycle now. Rejected with `Busy` while another is in flight.
    pub async fn run_once(&self) -> RecorderResult<CycleReport> {
        let _permit = self
            .cycle_guard
            .try_acquire()
            .map_err(|_| RecorderError::busy("A poll cycle is already running"))?;

        if !self.session.has_credentials() {
            return Err(RecorderError::auth("No app key or session token configured"));
        }

        Ok(self.run_cycle().await)
    }

    /// Status to settle on after a cycle. Any tick that got an answer from
    /// the exchange, even an empty or failed catalogue, moves STARTING on.
    fn resting_status(&self, prior: EngineStatus, outcome: CycleOutcome) -> EngineStatus {
        if outcome == CycleOutcome::AuthError {
            EngineStatus::AuthError
        } else if self.is_loop_active() && !self.stop_requested.load(Ordering::SeqCst) {
            let answered = matches!(outcome, CycleOutcome::Completed | CycleOutcome::Degraded);
            if answered || prior == EngineStatus::Running {
                EngineStatus::Running
            } else {
                EngineStatus::Starting
            }
        } else if prior == EngineStatus::AuthError {
            EngineStatus::AuthError
        } else {
            EngineStatus::Stopped
        }
    }

    fn enter_auth_error(&self, error: &RecorderError) {
        warn!("Session rejected: {}", error);
        self.session.mark_invalid(error.to_string());
        let now = self.clock.now();
        self.update_state(|s| {
            s.status = EngineStatus::AuthError;
            s.record_error(now, format!("Session rejected: {}", error));
        });
        self.persist_state();
    }

    /// One full cycle. Caller holds the cycle guard.
    async fn run_cycle(&self) -> CycleReport {
        let started_at = self.clock.now();
        let timer = Instant::now();
        let config = self.config();
        let today = started_at.date_naive();

        // Day rollover
        if self.update_state(|s| s.roll_over(today)) {
            self.cache.clear();
            self.log_activity(LogLevel::Info, format!("New day {}, counters reset", today));
            info!("Day rollover to {}", today);
            self.persist_state();
        }

        let (cycle_number, prior) = self.update_state(|s| {
            s.poll_count += 1;
            (s.poll_count, s.status)
        });

        let mut report = CycleReport {
            cycle_number,
            outcome: CycleOutcome::Completed,
            markets_polled: 0,
            books_fetched: 0,
            failed: 0,
            objects_written: 0,
            storage_errors: 0,
            duration_ms: 0,
            message: None,
        };

        // Keepalive
        let mut session_ok = true;
        if self.session.keepalive_due(started_at) {
            if let Err(e) = self.session.keepalive().await {
                self.enter_auth_error(&e);
                report.outcome = CycleOutcome::AuthError;
                report.message = Some(e.to_string());
                session_ok = false;
            }
        }

        if session_ok {
            let fetched = self.fetch_cycle(&config, today, &mut report).await;

            // Retry queue drains every cycle, new payloads only when there are any
            let (catalogue, books): (&[MarketCatalogue], &[MarketBook]) = match &fetched {
                Some((catalogue, books, _)) => {
                    self.set_status(EngineStatus::Writing);
                    (catalogue.as_slice(), books.as_slice())
                }
                None => (&[], &[]),
            };
            self.write_payloads(&config, started_at, catalogue, books, &mut report)
                .await;

            if let Some((catalogue, books, failed_ids)) = fetched {
                self.publish(catalogue, books, failed_ids);
            }
        }

        report.duration_ms = timer.elapsed().as_millis() as u64;
        let completed = report.outcome == CycleOutcome::Completed;
        let resting = self.resting_status(prior, report.outcome);

        self.update_state(|s| {
            s.cycles.push(PollCycleRecord {
                cycle_number,
                timestamp: started_at,
                markets_polled: report.markets_polled,
                saved: report.books_fetched,
                failed: report.failed,
                duration_ms: report.duration_ms,
            });
            s.stats.total_polls += 1;
            s.stats.total_markets_recorded += report.markets_polled as u64;
            s.stats.total_books_recorded += report.books_fetched as u64;
            s.last_poll_at = Some(started_at);
            s.last_poll_duration_ms = Some(report.duration_ms);
            s.status = resting;
        });

        let level = if completed { LogLevel::Info } else { LogLevel::Warn };
        self.log_activity(
            level,
            format!(
                "Poll #{}: {} markets, {} books, {} failed in {}ms",
                cycle_number,
                report.markets_polled,
                report.books_fetched,
                report.failed,
                report.duration_ms
            ),
        );
        info!(
            "Poll #{} {:?}: {} markets, {} books, {} failed, {} written in {}ms",
            cycle_number,
            report.outcome,
            report.markets_polled,
            report.books_fetched,
            report.failed,
            report.objects_written,
            report.duration_ms
        );

        if cycle_number % PERSIST_EVERY_POLLS == 0 {
            self.persist_snapshot();
        }

        report
    }

    /// Catalogue then books. `None` when there is nothing new to write or publish.
    async fn fetch_cycle(
        &self,
        config: &RecorderConfig,
        today: chrono::NaiveDate,
        report: &mut CycleReport,
    ) -> Option<(Vec<MarketCatalogue>, Vec<MarketBook>, HashSet<String>)> {
        self.set_status(EngineStatus::Polling);
        let credentials = self.session.credentials();
        let request = CatalogueRequest::for_day(config, today);

        let catalogue = match self.client.fetch_catalogue(&credentials, &request).await {
            Ok(markets) => markets,
            Err(e) if e.is_auth() => {
                self.enter_auth_error(&e);
                report.outcome = CycleOutcome::AuthError;
                report.message = Some(e.to_string());
                return None;
            }
            Err(e) => {
                warn!("Catalogue fetch failed: {}", e);
                self.update_state(|s| s.stats.api_errors += 1);
                self.record_error(format!("Catalogue fetch failed: {}", e));
                report.outcome = CycleOutcome::Degraded;
                report.message = Some(e.to_string());
                return None;
            }
        };

        report.markets_polled = catalogue.len();
        let (books, failed_ids) = self.fetch_all_books(config, &catalogue, report).await?;
        Some((catalogue, books, failed_ids))
    }

    /// Fetch books batch by batch. `None` when the cycle must stop here
    /// (session rejected or the request is over the weight budget).
    async fn fetch_all_books(
        &self,
        config: &RecorderConfig,
        catalogue: &[MarketCatalogue],
        report: &mut CycleReport,
    ) -> Option<(Vec<MarketBook>, HashSet<String>)> {
        let market_ids: Vec<String> = catalogue.iter().map(|m| m.market_id.clone()).collect();
        let batch_size = compute_batch_size(&config.price_projection);
        let batches = plan_batches(&market_ids, batch_size);
        let batch_count = batches.len();
        let credentials = self.session.credentials();

        debug!(
            "Fetching {} books in {} batches of up to {}",
            market_ids.len(),
            batch_count,
            batch_size
        );

        let mut books = Vec::with_capacity(market_ids.len());
        let mut failed_ids = HashSet::new();

        for (index, batch) in batches.into_iter().enumerate() {
            if index > 0 && !self.options.batch_pause.is_zero() {
                tokio::time::sleep(self.options.batch_pause).await;
            }

            match self
                .client
                .fetch_books(&credentials, &batch, &config.price_projection)
                .await
            {
                Ok(batch_books) => books.extend(batch_books),
                Err(e) if e.is_auth() => {
                    self.enter_auth_error(&e);
                    report.outcome = CycleOutcome::AuthError;
                    report.message = Some(e.to_string());
                    return None;
                }
                Err(e @ RecorderError::WeightExceeded { .. }) => {
                    error!("Book request over budget, cycle aborted: {}", e);
                    self.update_state(|s| s.stats.api_errors += 1);
                    self.record_error(format!("Cycle aborted: {}", e));
                    report.outcome = CycleOutcome::Aborted;
                    report.message = Some(e.to_string());
                    report.books_fetched = books.len();
                    return None;
                }
                Err(e) => {
                    warn!("Book batch {}/{} failed: {}", index + 1, batch_count, e);
                    report.failed += batch.len();
                    self.update_state(|s| s.stats.api_errors += 1);
                    self.record_error(format!(
                        "Book batch {}/{} ({} markets) failed: {}",
                        index + 1,
                        batch_count,
                        batch.len(),
                        e
                    ));
                    failed_ids.extend(batch);
                }
            }
        }

        report.books_fetched = books.len();
        Some((books, failed_ids))
    }

    async fn write_payloads(
        &self,
        config: &RecorderConfig,
        started_at: DateTime<Utc>,
        catalogue: &[MarketCatalogue],
        books: &[MarketBook],
        report: &mut CycleReport,
    ) {
        let Some(store) = self.store() else {
            return;
        };

        let mut writer = self.writer.lock().await;
        let mut flush = writer.retry_pending(store.as_ref()).await;

        let base_path = config.normalized_base_path();
        let recorded_at = self.clock.now();
        let mut current_keys = Vec::new();

        if !catalogue.is_empty() {
            let key = object_key(base_path, &config.event_type_id, started_at, Stream::Catalogue);
            match encode_records(catalogue, Stream::Catalogue, recorded_at) {
                Ok(body) => {
                    flush.merge(writer.write(store.as_ref(), key.clone(), body).await);
                    current_keys.push((Stream::Catalogue, key));
                }
                Err(e) => self.record_error(format!("Failed to encode catalogue: {}", e)),
            }
        }

        if !books.is_empty() {
            let key = object_key(base_path, &config.event_type_id, started_at, Stream::Books);
            match encode_records(books, Stream::Books, recorded_at) {
                Ok(body) => {
                    flush.merge(writer.write(store.as_ref(), key.clone(), body).await);
                    current_keys.push((Stream::Books, key));
                }
                Err(e) => self.record_error(format!("Failed to encode books: {}", e)),
            }
        }

        self.pending_writes
            .store(writer.pending_len(), Ordering::SeqCst);
        drop(writer);

        self.apply_flush(&flush, &current_keys, report);
    }

    fn apply_flush(
        &self,
        flush: &FlushReport,
        current_keys: &[(Stream, String)],
        report: &mut CycleReport,
    ) {
        report.objects_written += flush.written.len();
        report.storage_errors += flush.failed.len();

        let now = self.clock.now();
        self.update_state(|s| {
            s.stats.total_storage_writes += flush.written.len() as u64;
            s.stats.storage_errors += flush.failed.len() as u64;

            for (stream, key) in current_keys {
                if flush.written.contains(key) {
                    match stream {
                        Stream::Catalogue => s.last_catalogue_key = Some(key.clone()),
                        Stream::Books => s.last_books_key = Some(key.clone()),
                    }
                }
            }
            for (key, message) in &flush.failed {
                s.record_error(now, format!("Storage write failed for {}: {}", key, message));
            }
            for key in &flush.evicted {
                s.log(now, LogLevel::Warn, format!("Dropped unwritten object {}", key));
            }
        });
    }

    /// Swap in the new snapshot. Markets whose batch failed keep their last book.
    fn publish(
        &self,
        catalogue: Vec<MarketCatalogue>,
        fetched: Vec<MarketBook>,
        failed_ids: HashSet<String>,
    ) {
        let previous = self.cache.snapshot();
        let mut books: HashMap<String, MarketBook> = HashMap::with_capacity(catalogue.len());

        for id in &failed_ids {
            if let Some(book) = previous.books.get(id) {
                books.insert(id.clone(), book.clone());
            }
        }
        for book in fetched {
            books.insert(book.market_id.clone(), book);
        }

        self.cache
            .publish(FeedSnapshot::new(catalogue, books, self.clock.now()));
    }

    // ========================================================================
    // Configuration and probes
    // ========================================================================

    /// Merge `update` over the current configuration, validate it and
    /// replace the active one. The prior configuration stays on error.
    pub async fn update_config(&self, mut update: PartialConfig) -> RecorderResult<ConfigUpdate> {
        if update
            .session_token
            .as_deref()
            .is_some_and(is_masked_token)
        {
            update.session_token = None;
        }

        let current = self.config();
        let next = update.apply_to((*current).clone());
        next.validate()?;

        if next.bucket_name != current.bucket_name || next.storage_endpoint != current.storage_endpoint {
            let store = recorder_storage::connect(&next).await;
            *self.store.write() = store;
        }

        self.session.update_credentials(next.credentials());
        let interval_changed = next.poll_interval_seconds != current.poll_interval_seconds;
        *self.config.write() = Arc::new(next.clone());

        let saved = self.config_store.save(&next).await;
        if interval_changed && self.is_loop_active() {
            self.wake.notify_one();
        }

        self.log_activity(
            LogLevel::Info,
            format!(
                "Configuration updated (token {})",
                mask_secret(&next.session_token)
            ),
        );

        Ok(ConfigUpdate {
            config: next.masked(),
            saved,
        })
    }

    /// Validate the stored session. From AUTH_ERROR a good result restarts the engine.
    pub async fn probe_session(self: &Arc<Self>) -> SessionProbe {
        let validation = self.session.validate_current().await;
        let mut restarted = false;

        if validation.valid {
            let _lifecycle = self.lifecycle.lock().await;
            if self.status() == EngineStatus::AuthError && !self.is_loop_active() {
                info!("Session valid again, restarting engine");
                self.launch();
                restarted = true;
            }
        } else {
            self.log_activity(
                LogLevel::Warn,
                format!("Session probe failed: {}", validation.message),
            );
        }

        SessionProbe {
            validation,
            restarted,
            status: self.status(),
        }
    }

    pub async fn probe_storage(&self) -> RecorderResult<String> {
        match self.store() {
            Some(store) => store.probe().await,
            None => Err(RecorderError::storage("Storage is not configured")),
        }
    }
}
