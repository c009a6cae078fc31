//! Layered configuration store
//!
//! Configuration is resolved from an ordered list of providers, lowest
//! priority first:
//!
//! 1. environment variables
//! 2. the durable object `{basePath}/config/runtime_config.json`
//! 3. the local fallback file
//!
//! A provider that cannot be read is logged and treated as absent. The
//! durable object is located with the environment tier's bucket and base
//! path, so it can always be found again after a restart.

use async_trait::async_trait;
use recorder_core::{PartialConfig, RecorderConfig, RecorderError, RecorderResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ObjectStore;

pub const CONFIG_OBJECT_NAME: &str = "config/runtime_config.json";

/// Key of the durable configuration object under `base_path`
pub fn config_object_key(base_path: &str) -> String {
    format!("{}/{}", base_path.trim_matches('/'), CONFIG_OBJECT_NAME)
}

/// One configuration source
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// The layer this source contributes, `None` when it has nothing
    async fn load(&self) -> RecorderResult<Option<PartialConfig>>;
}

/// Environment tier, captured once at startup
pub struct EnvProvider {
    layer: PartialConfig,
}

impl EnvProvider {
    pub fn new(layer: PartialConfig) -> Self {
        Self { layer }
    }
}

#[async_trait]
impl ConfigProvider for EnvProvider {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn load(&self) -> RecorderResult<Option<PartialConfig>> {
        Ok(Some(self.layer.clone()))
    }
}

/// Durable configuration object
pub struct ObjectProvider {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl ObjectProvider {
    pub fn new(store: Arc<dyn ObjectStore>, key: String) -> Self {
        Self { store, key }
    }
}

#[async_trait]
impl ConfigProvider for ObjectProvider {
    fn name(&self) -> &'static str {
        "durable object"
    }

    async fn load(&self) -> RecorderResult<Option<PartialConfig>> {
        match self.store.get(&self.key).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                RecorderError::parse(format!("Invalid config object {}: {}", self.key, e))
            }),
            None => Ok(None),
        }
    }
}

/// Local fallback file
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigProvider for FileProvider {
    fn name(&self) -> &'static str {
        "local file"
    }

    async fn load(&self) -> RecorderResult<Option<PartialConfig>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.path).map_err(|e| {
            RecorderError::storage(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            RecorderError::parse(format!("Invalid config file {}: {}", self.path.display(), e))
        })
    }
}

/// Which targets a save reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    /// `None` when there is no durable target
    pub durable: Option<bool>,
    pub local: bool,
}

impl SaveReport {
    pub fn any_succeeded(&self) -> bool {
        self.local || self.durable == Some(true)
    }
}

/// Loads and saves the recorder configuration across all tiers
pub struct ConfigStore {
    env: PartialConfig,
    durable: Option<Arc<dyn ObjectStore>>,
    durable_key: String,
    local_path: PathBuf,
}

impl ConfigStore {
    /// `durable` should be the store the environment tier points at
    pub fn new(
        env: PartialConfig,
        durable: Option<Arc<dyn ObjectStore>>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        let env_config = RecorderConfig::resolve([env.clone()]);
        Self {
            durable_key: config_object_key(env_config.normalized_base_path()),
            env,
            durable,
            local_path: local_path.into(),
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn durable_key(&self) -> &str {
        &self.durable_key
    }

    fn providers(&self) -> Vec<Box<dyn ConfigProvider>> {
        let mut providers: Vec<Box<dyn ConfigProvider>> =
            vec![Box::new(EnvProvider::new(self.env.clone()))];
        if let Some(store) = &self.durable {
            providers.push(Box::new(ObjectProvider::new(
                store.clone(),
                self.durable_key.clone(),
            )));
        }
        providers.push(Box::new(FileProvider::new(self.local_path.clone())));
        providers
    }

    /// Resolve the configuration from every tier
    pub async fn load(&self) -> RecorderConfig {
        let mut layers = Vec::new();
        for provider in self.providers() {
            match provider.load().await {
                Ok(Some(layer)) => {
                    debug!("Loaded config layer from {}", provider.name());
                    layers.push(layer);
                }
                Ok(None) => debug!("No config in {}", provider.name()),
                Err(e) => warn!("Ignoring config from {}: {}", provider.name(), e),
            }
        }
        RecorderConfig::resolve(layers)
    }

    /// `load`, checked. When the stored tiers resolve to an invalid config
    /// the environment tier is used on its own; an invalid environment is
    /// an error.
    pub async fn load_validated(&self) -> RecorderResult<RecorderConfig> {
        let config = self.load().await;
        match config.validate() {
            Ok(()) => Ok(config),
            Err(e) => {
                warn!("Resolved config rejected ({}), using environment only", e);
                let env_config = RecorderConfig::resolve([self.env.clone()]);
                env_config.validate()?;
                Ok(env_config)
            }
        }
    }

    /// Write `config` to the durable object and the local file. Either may
    /// fail without affecting the other.
    pub async fn save(&self, config: &RecorderConfig) -> SaveReport {
        let body = match serde_json::to_vec_pretty(config) {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to serialize config: {}", e);
                return SaveReport::default();
            }
        };

        let durable = match &self.durable {
            Some(store) => match store
                .put(&self.durable_key, body.clone(), "application/json")
                .await
            {
                Ok(()) => Some(true),
                Err(e) => {
                    warn!("Failed to save config to {}: {}", store.location(), e);
                    Some(false)
                }
            },
            None => None,
        };

        let local = match write_file_atomic(&self.local_path, &body) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to save config locally: {}", e);
                false
            }
        };

        info!(
            "Config saved (durable: {:?}, local: {})",
            durable, local
        );
        SaveReport { durable, local }
    }

    /// Local file only, used for periodic snapshots
    pub fn save_local(&self, config: &RecorderConfig) -> RecorderResult<()> {
        let body = serde_json::to_vec_pretty(config)
            .map_err(|e| RecorderError::internal(format!("Failed to serialize config: {}", e)))?;
        write_file_atomic(&self.local_path, &body)
    }
}

/// Write through a sibling temp file and rename into place
pub(crate) fn write_file_atomic(path: &Path, body: &[u8]) -> RecorderResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RecorderError::storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
    }

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, body)
        .map_err(|e| RecorderError::storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| RecorderError::storage(format!("Failed to move {}: {}", path.display(), e)))
}
