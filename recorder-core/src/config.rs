//! Recorder configuration and its layered resolution
//!
//! A [`RecorderConfig`] is always complete. Each configuration source produces
//! a [`PartialConfig`]; sources are folded left to right over the defaults and
//! a field from a later source wins only when it is present.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Price detail the book query can ask for. Each one has a request weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceData {
    SpAvailable,
    SpTraded,
    ExBestOffers,
    ExAllOffers,
    ExTraded,
}

impl PriceData {
    pub const ALL: [PriceData; 5] = [
        PriceData::SpAvailable,
        PriceData::SpTraded,
        PriceData::ExBestOffers,
        PriceData::ExAllOffers,
        PriceData::ExTraded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceData::SpAvailable => "SP_AVAILABLE",
            PriceData::SpTraded => "SP_TRADED",
            PriceData::ExBestOffers => "EX_BEST_OFFERS",
            PriceData::ExAllOffers => "EX_ALL_OFFERS",
            PriceData::ExTraded => "EX_TRADED",
        }
    }
}

impl fmt::Display for PriceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceData {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PriceData::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown price data: {}", s))
    }
}

/// Catalogue detail the catalogue query can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketProjection {
    Competition,
    Event,
    EventType,
    MarketStartTime,
    MarketDescription,
    RunnerDescription,
    RunnerMetadata,
}

/// Configuration validation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

pub const DEFAULT_BASE_PATH: &str = "betfair-live";
/// Horse racing
pub const DEFAULT_EVENT_TYPE_ID: &str = "7";
pub const MIN_POLL_INTERVAL_SECS: u64 = 10;
pub const MAX_POLL_INTERVAL_SECS: u64 = 3600;

/// Complete recorder configuration. Replaced wholesale on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderConfig {
    pub app_key: String,
    /// Session token for the exchange. Never echoed in full, see [`RecorderConfig::masked`].
    pub session_token: String,
    pub storage_project: String,
    pub bucket_name: String,
    pub base_path: String,
    /// Custom S3-compatible endpoint, provider default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_endpoint: Option<String>,
    pub poll_interval_seconds: u64,
    pub event_type_id: String,
    pub countries: Vec<String>,
    /// Empty means every market type
    pub market_types: Vec<String>,
    pub price_projection: Vec<PriceData>,
    pub catalogue_projection: Vec<MarketProjection>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            session_token: String::new(),
            storage_project: String::new(),
            bucket_name: String::new(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            storage_endpoint: None,
            poll_interval_seconds: 60,
            event_type_id: DEFAULT_EVENT_TYPE_ID.to_string(),
            countries: vec!["GB".to_string(), "IE".to_string()],
            market_types: vec!["WIN".to_string()],
            price_projection: vec![
                PriceData::ExBestOffers,
                PriceData::ExAllOffers,
                PriceData::ExTraded,
                PriceData::SpAvailable,
                PriceData::SpTraded,
            ],
            catalogue_projection: vec![
                MarketProjection::Event,
                MarketProjection::MarketStartTime,
                MarketProjection::RunnerDescription,
            ],
        }
    }
}

impl RecorderConfig {
    /// Fold configuration layers over the defaults, lowest priority first
    pub fn resolve(layers: impl IntoIterator<Item = PartialConfig>) -> Self {
        layers
            .into_iter()
            .fold(Self::default(), |config, layer| layer.apply_to(config))
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials().is_complete()
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.app_key.clone(), self.session_token.clone())
    }

    pub fn is_storage_configured(&self) -> bool {
        !self.bucket_name.is_empty()
    }

    /// Base path without leading or trailing slashes
    pub fn normalized_base_path(&self) -> &str {
        self.base_path.trim_matches('/')
    }

    /// Copy safe to show on the dashboard
    pub fn masked(&self) -> Self {
        Self {
            session_token: mask_secret(&self.session_token),
            ..self.clone()
        }
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&self.poll_interval_seconds) {
            return Err(ConfigError::invalid(
                "pollIntervalSeconds",
                format!(
                    "{} is outside {}..={}",
                    self.poll_interval_seconds, MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS
                ),
            ));
        }

        if self.countries.is_empty() {
            return Err(ConfigError::invalid("countries", "at least one country is required"));
        }
        if let Some(bad) = self
            .countries
            .iter()
            .find(|c| c.len() != 2 || !c.chars().all(|ch| ch.is_ascii_uppercase()))
        {
            return Err(ConfigError::invalid(
                "countries",
                format!("{:?} is not a two-letter upper-case country code", bad),
            ));
        }

        if self.normalized_base_path().is_empty() {
            return Err(ConfigError::invalid("basePath", "must not be empty"));
        }

        if self.event_type_id.is_empty() || !self.event_type_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::invalid(
                "eventTypeId",
                format!("{:?} is not a numeric id", self.event_type_id),
            ));
        }

        if !self.bucket_name.is_empty() {
            let valid_chars = self.bucket_name.chars().all(|c| {
                c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.' | '_')
            });
            if !(3..=63).contains(&self.bucket_name.len()) || !valid_chars {
                return Err(ConfigError::invalid(
                    "bucketName",
                    format!("{:?} is not a valid bucket name", self.bucket_name),
                ));
            }
        }

        Ok(())
    }
}

/// Show only the tail of a secret, and nothing of short ones
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 12 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 8..].iter().collect();
    format!("...{}", tail)
}

/// Exchange credentials used for every remote call
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub app_key: String,
    pub session_token: String,
}

impl Credentials {
    pub fn new(app_key: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            session_token: session_token.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.app_key.is_empty() && !self.session_token.is_empty()
    }
}

// Keep tokens out of debug logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_key", &self.app_key)
            .field("session_token", &mask_secret(&self.session_token))
            .finish()
    }
}

/// One configuration source. Absent fields leave lower layers untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialConfig {
    pub app_key: Option<String>,
    pub session_token: Option<String>,
    pub storage_project: Option<String>,
    pub bucket_name: Option<String>,
    pub base_path: Option<String>,
    pub storage_endpoint: Option<String>,
    pub poll_interval_seconds: Option<u64>,
    pub event_type_id: Option<String>,
    pub countries: Option<Vec<String>>,
    pub market_types: Option<Vec<String>>,
    pub price_projection: Option<Vec<PriceData>>,
    pub catalogue_projection: Option<Vec<MarketProjection>>,
}

fn present_str(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn present_vec<T>(value: Option<Vec<T>>) -> Option<Vec<T>> {
    value.filter(|v| !v.is_empty())
}

impl PartialConfig {
    /// Read the environment tier
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the environment tier from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let list = |key: &str| {
            lookup(key).map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
        };

        let poll_interval_seconds = match lookup("POLL_INTERVAL") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
                var: "POLL_INTERVAL",
                value: raw.clone(),
            })?),
            None => None,
        };

        let price_projection = match lookup("RECORDER_PRICE_PROJECTION") {
            Some(raw) => Some(
                raw.split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(PriceData::from_str)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| ConfigError::InvalidEnv {
                        var: "RECORDER_PRICE_PROJECTION",
                        value: raw.clone(),
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            app_key: lookup("BETFAIR_APP_KEY"),
            session_token: lookup("BETFAIR_SSOID"),
            storage_project: lookup("STORAGE_PROJECT_ID"),
            bucket_name: lookup("STORAGE_BUCKET"),
            base_path: lookup("STORAGE_BASE_PATH"),
            storage_endpoint: lookup("STORAGE_ENDPOINT"),
            poll_interval_seconds,
            event_type_id: lookup("RECORDER_EVENT_TYPE_ID"),
            countries: list("RECORDER_COUNTRIES"),
            market_types: list("RECORDER_MARKET_TYPES"),
            price_projection,
            catalogue_projection: None,
        })
    }

    /// Overlay this layer on `base`; present fields win
    pub fn apply_to(self, base: RecorderConfig) -> RecorderConfig {
        RecorderConfig {
            app_key: present_str(self.app_key).unwrap_or(base.app_key),
            session_token: present_str(self.session_token).unwrap_or(base.session_token),
            storage_project: present_str(self.storage_project).unwrap_or(base.storage_project),
            bucket_name: present_str(self.bucket_name).unwrap_or(base.bucket_name),
            base_path: present_str(self.base_path).unwrap_or(base.base_path),
            storage_endpoint: present_str(self.storage_endpoint).or(base.storage_endpoint),
            poll_interval_seconds: self
                .poll_interval_seconds
                .filter(|s| *s > 0)
                .unwrap_or(base.poll_interval_seconds),
            event_type_id: present_str(self.event_type_id).unwrap_or(base.event_type_id),
            countries: present_vec(self.countries).unwrap_or(base.countries),
            // An empty list is meaningful here: every market type
            market_types: self.market_types.unwrap_or(base.market_types),
            price_projection: present_vec(self.price_projection).unwrap_or(base.price_projection),
            catalogue_projection: present_vec(self.catalogue_projection)
                .unwrap_or(base.catalogue_projection),
        }
    }
}

impl From<RecorderConfig> for PartialConfig {
    fn from(config: RecorderConfig) -> Self {
        Self {
            app_key: Some(config.app_key),
            session_token: Some(config.session_token),
            storage_project: Some(config.storage_project),
            bucket_name: Some(config.bucket_name),
            base_path: Some(config.base_path),
            storage_endpoint: config.storage_endpoint,
            poll_interval_seconds: Some(config.poll_interval_seconds),
            event_type_id: Some(config.event_type_id),
            countries: Some(config.countries),
            market_types: Some(config.market_types),
            price_projection: Some(config.price_projection),
            catalogue_projection: Some(config.catalogue_projection),
        }
    }
}
