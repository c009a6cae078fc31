//! Engine state records shared by the scheduler, the state store and the API

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bounded::BoundedLog;

pub const CYCLE_LOG_CAPACITY: usize = 100;
pub const ACTIVITY_LOG_CAPACITY: usize = 250;
pub const ERROR_LOG_CAPACITY: usize = 200;

/// Lifecycle status of the recorder engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Polling,
    Writing,
    AuthError,
}

impl EngineStatus {
    /// Whether the periodic loop is (or should be) running
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            EngineStatus::Starting | EngineStatus::Running | EngineStatus::Polling | EngineStatus::Writing
        )
    }

    /// Inside a cycle
    pub fn is_busy(&self) -> bool {
        matches!(self, EngineStatus::Polling | EngineStatus::Writing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineStatus::Stopped => "STOPPED",
            EngineStatus::Starting => "STARTING",
            EngineStatus::Running => "RUNNING",
            EngineStatus::Polling => "POLLING",
            EngineStatus::Writing => "WRITING",
            EngineStatus::AuthError => "AUTH_ERROR",
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed poll cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollCycleRecord {
    pub cycle_number: u64,
    pub timestamp: DateTime<Utc>,
    pub markets_polled: usize,
    /// Books fetched successfully
    pub saved: usize,
    /// Markets whose book batch failed
    pub failed: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Dashboard activity line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Per-day running totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineStats {
    pub total_polls: u64,
    pub total_markets_recorded: u64,
    pub total_books_recorded: u64,
    pub total_storage_writes: u64,
    pub storage_errors: u64,
    pub api_errors: u64,
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CycleOutcome {
    /// Catalogue fetched and the cache swapped
    Completed,
    /// Catalogue fetch failed; cache left as it was
    Degraded,
    /// Book request over the weight budget; nothing written or swapped
    Aborted,
    /// Session rejected; the engine is in AUTH_ERROR
    AuthError,
}

/// Structured result of one cycle, returned by manual polls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub cycle_number: u64,
    pub outcome: CycleOutcome,
    pub markets_polled: usize,
    pub books_fetched: usize,
    pub failed: usize,
    pub objects_written: usize,
    pub storage_errors: usize,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Mutable engine state, owned by the scheduler
#[derive(Debug, Clone)]
pub struct EngineState {
    pub status: EngineStatus,
    pub current_date: NaiveDate,
    pub poll_count: u64,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_poll_duration_ms: Option<u64>,
    pub stats: EngineStats,
    pub errors: BoundedLog<ErrorEntry>,
    pub cycles: BoundedLog<PollCycleRecord>,
    pub activity: BoundedLog<ActivityEntry>,
    pub last_catalogue_key: Option<String>,
    pub last_books_key: Option<String>,
}

impl EngineState {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            status: EngineStatus::Stopped,
            current_date: today,
            poll_count: 0,
            last_poll_at: None,
            last_poll_duration_ms: None,
            stats: EngineStats::default(),
            errors: BoundedLog::new(ERROR_LOG_CAPACITY),
            cycles: BoundedLog::new(CYCLE_LOG_CAPACITY),
            activity: BoundedLog::new(ACTIVITY_LOG_CAPACITY),
            last_catalogue_key: None,
            last_books_key: None,
        }
    }

    /// Advance to `today`, clearing the per-day counters. Returns false when
    /// the date has not changed.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if today == self.current_date {
            return false;
        }
        self.current_date = today;
        self.poll_count = 0;
        self.last_poll_at = None;
        self.last_poll_duration_ms = None;
        self.stats = EngineStats::default();
        self.errors.clear();
        self.cycles.clear();
        self.last_catalogue_key = None;
        self.last_books_key = None;
        true
    }

    pub fn record_error(&mut self, at: DateTime<Utc>, message: impl Into<String>) {
        let message = message.into();
        self.activity.push(ActivityEntry {
            timestamp: at,
            level: LogLevel::Error,
            message: message.clone(),
        });
        self.errors.push(ErrorEntry { timestamp: at, message });
    }

    pub fn log(&mut self, at: DateTime<Utc>, level: LogLevel, message: impl Into<String>) {
        self.activity.push(ActivityEntry {
            timestamp: at,
            level,
            message: message.into(),
        });
    }

    pub fn to_persisted(&self, saved_at: DateTime<Utc>) -> PersistedState {
        PersistedState {
            status: self.status,
            current_date: self.current_date,
            poll_count: self.poll_count,
            last_poll_at: self.last_poll_at,
            last_poll_duration_ms: self.last_poll_duration_ms,
            stats: self.stats.clone(),
            errors: self.errors.iter().cloned().collect(),
            cycles: self.cycles.iter().cloned().collect(),
            last_catalogue_key: self.last_catalogue_key.clone(),
            last_books_key: self.last_books_key.clone(),
            saved_at,
        }
    }

    /// Restore counters and logs from a same-day snapshot. Status is left
    /// for the caller to decide.
    pub fn restore(&mut self, persisted: PersistedState) {
        self.current_date = persisted.current_date;
        self.poll_count = persisted.poll_count;
        self.last_poll_at = persisted.last_poll_at;
        self.last_poll_duration_ms = persisted.last_poll_duration_ms;
        self.stats = persisted.stats;
        self.errors.clear();
        self.errors.extend(persisted.errors);
        self.cycles.clear();
        self.cycles.extend(persisted.cycles);
        self.last_catalogue_key = persisted.last_catalogue_key;
        self.last_books_key = persisted.last_books_key;
    }
}

/// Engine state as written to the local state file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub status: EngineStatus,
    pub current_date: NaiveDate,
    pub poll_count: u64,
    #[serde(default)]
    pub last_poll_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_poll_duration_ms: Option<u64>,
    #[serde(default)]
    pub stats: EngineStats,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
    #[serde(default)]
    pub cycles: Vec<PollCycleRecord>,
    #[serde(default)]
    pub last_catalogue_key: Option<String>,
    #[serde(default)]
    pub last_books_key: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl PersistedState {
    /// The engine was running when this was saved
    pub fn was_active(&self) -> bool {
        self.status.is_active()
    }
}
