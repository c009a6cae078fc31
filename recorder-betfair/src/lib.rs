//! Betfair exchange integration for the market recorder
//!
//! This crate provides the remote market client used by the poll engine: the
//! JSON-RPC wire types, the request weight model and batch planner, and the
//! reqwest-backed client itself.

pub mod client;
pub mod types;
pub mod weight;

use async_trait::async_trait;
use recorder_core::{Credentials, MarketBook, MarketCatalogue, PriceData, RecorderResult};

pub use client::BetfairClient;
pub use types::CatalogueRequest;
pub use weight::{compute_batch_size, plan_batches, total_weight, WEIGHT_BUDGET};

/// Source of catalogue and book snapshots
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Markets matching the request. An empty catalogue is an `Empty` error.
    async fn fetch_catalogue(
        &self,
        credentials: &Credentials,
        request: &CatalogueRequest,
    ) -> RecorderResult<Vec<MarketCatalogue>>;

    /// Books for one batch of markets. Over-weight requests are refused
    /// before any I/O.
    async fn fetch_books(
        &self,
        credentials: &Credentials,
        market_ids: &[String],
        price_projection: &[PriceData],
    ) -> RecorderResult<Vec<MarketBook>>;

    /// Extend the session
    async fn keepalive(&self, credentials: &Credentials) -> RecorderResult<()>;

    /// Lightweight authenticated call with no side effects
    async fn validate_session(&self, credentials: &Credentials) -> RecorderResult<()>;
}
