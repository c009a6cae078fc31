//! Core types for the exchange market recorder
//!
//! This crate defines the shared data structures used across the recorder:
//! exchange market shapes, engine state records, configuration and the
//! error taxonomy.

pub mod bounded;
pub mod config;
pub mod engine;
pub mod error;
pub mod market;

pub use bounded::BoundedLog;
pub use config::{
    mask_secret, ConfigError, Credentials, MarketProjection, PartialConfig, PriceData,
    RecorderConfig,
};
pub use engine::{
    ActivityEntry, CycleOutcome, CycleReport, EngineState, EngineStats, EngineStatus, ErrorEntry,
    LogLevel, PersistedState, PollCycleRecord,
};
pub use error::{RecorderError, RecorderResult};
pub use market::{
    Event, ExchangePrices, MarketBook, MarketCatalogue, MarketStatus, MarketSummary, PriceSize,
    Runner, RunnerCatalog,
};
