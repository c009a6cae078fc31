//! Error types for the recorder

use thiserror::Error;

use crate::config::ConfigError;

/// Recorder-wide error type
#[derive(Error, Debug)]
pub enum RecorderError {
    /// Session token rejected or expired. Never auto-recovered.
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// The exchange answered but returned no usable result
    #[error("Empty response: {0}")]
    Empty(String),

    #[error("Request weight {weight} exceeds the per-call budget of {budget}")]
    WeightExceeded { weight: u32, budget: u32 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A poll cycle is already in flight
    #[error("Busy: {0}")]
    Busy(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RecorderError {
    pub fn auth(msg: impl Into<String>) -> Self {
        RecorderError::Auth(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        RecorderError::Transport(msg.into())
    }

    pub fn empty(msg: impl Into<String>) -> Self {
        RecorderError::Empty(msg.into())
    }

    pub fn weight_exceeded(weight: u32, budget: u32) -> Self {
        RecorderError::WeightExceeded { weight, budget }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        RecorderError::Storage(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        RecorderError::Parse(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        RecorderError::NotFound(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        RecorderError::Busy(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        RecorderError::Internal(msg.into())
    }

    /// Whether this error means the session is no longer usable
    pub fn is_auth(&self) -> bool {
        matches!(self, RecorderError::Auth(_))
    }
}

/// Result type alias for recorder operations
pub type RecorderResult<T> = Result<T, RecorderError>;
