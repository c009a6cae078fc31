//! Persistence layer for the market recorder
//!
//! Provides the object-store capability (S3 or in-memory), the line-delimited
//! record writer, the layered configuration store and the local engine-state
//! file.

pub mod config_store;
pub mod memory;
pub mod s3;
pub mod state_store;
pub mod writer;

use async_trait::async_trait;
use recorder_core::{RecorderConfig, RecorderResult};
use std::sync::Arc;
use tracing::info;

pub use config_store::{ConfigProvider, ConfigStore, SaveReport};
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;
pub use state_store::StateStore;
pub use writer::{encode_records, object_key, FlushReport, RecordWriter, Stream, NDJSON_CONTENT_TYPE};

/// Minimal object storage capability
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write one object in a single put
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> RecorderResult<()>;

    /// Read one object. `None` when the key does not exist.
    async fn get(&self, key: &str) -> RecorderResult<Option<Vec<u8>>>;

    /// Check the store is reachable, returning a short description
    async fn probe(&self) -> RecorderResult<String>;

    /// Human readable location, e.g. `s3://bucket`
    fn location(&self) -> String;
}

/// Object store for `config`, or `None` when storage is not configured
pub async fn connect(config: &RecorderConfig) -> Option<Arc<dyn ObjectStore>> {
    if !config.is_storage_configured() {
        info!("Storage not configured, durable writes disabled");
        return None;
    }

    let store = S3ObjectStore::connect(&config.bucket_name, config.storage_endpoint.as_deref()).await;
    info!("Object storage initialized: {}", store.location());
    Some(Arc::new(store))
}
