//! Services for the exchange market recorder
//!
//! This crate provides the session manager, the feed snapshot cache and the
//! recorder engine that drives poll cycles.

pub mod clock;
pub mod engine;
pub mod session;
pub mod snapshot_cache;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    ConfigUpdate, DashboardState, EngineDeps, EngineOptions, RecorderEngine, SessionProbe,
    StorageStatus,
};
pub use session::{SessionManager, SessionStatus, SessionValidation, KEEPALIVE_INTERVAL_MINUTES};
pub use snapshot_cache::{FeedAggregates, FeedSnapshot, SnapshotCache};
