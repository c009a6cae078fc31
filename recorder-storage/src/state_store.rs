//! Local engine-state file used for restart recovery

use chrono::NaiveDate;
use recorder_core::{PersistedState, RecorderError, RecorderResult};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config_store::write_file_atomic;

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, state: &PersistedState) -> RecorderResult<()> {
        let body = serde_json::to_vec_pretty(state)
            .map_err(|e| RecorderError::internal(format!("Failed to serialize state: {}", e)))?;
        write_file_atomic(&self.path, &body)
    }

    /// Restore state saved on `today`. A file from an earlier day is deleted.
    pub fn load(&self, today: NaiveDate) -> Option<PersistedState> {
        if !self.path.exists() {
            return None;
        }

        let state: PersistedState = match std::fs::read(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()))
        {
            Ok(state) => state,
            Err(e) => {
                warn!("Ignoring unreadable state file {}: {}", self.path.display(), e);
                return None;
            }
        };

        if state.current_date != today {
            info!(
                "Discarding state from {} (today is {})",
                state.current_date, today
            );
            self.clear();
            return None;
        }

        info!(
            "Restored state from {}: {} polls, status {}",
            self.path.display(),
            state.poll_count,
            state.status
        );
        Some(state)
    }

    pub fn clear(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use recorder_core::{EngineState, EngineStatus};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, d).unwrap()
    }

    fn saved(date: NaiveDate, status: EngineStatus) -> PersistedState {
        let mut state = EngineState::new(date);
        state.status = status;
        state.poll_count = 12;
        state.to_persisted(Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap())
    }

    #[test]
    fn test_same_day_restore() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store.save(&saved(day(1), EngineStatus::Running)).unwrap();

        let restored = store.load(day(1)).unwrap();
        assert_eq!(restored.poll_count, 12);
        assert!(restored.was_active());
    }

    #[test]
    fn test_stale_state_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store.save(&saved(day(1), EngineStatus::Stopped)).unwrap();

        assert!(store.load(day(2)).is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_missing_or_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(store.load(day(1)).is_none());

        std::fs::write(store.path(), "{").unwrap();
        assert!(store.load(day(1)).is_none());
    }
}
