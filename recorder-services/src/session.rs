//! Session manager
//!
//! Owns the operator-supplied credentials and tracks when they were last
//! validated and kept alive. Tokens are never refreshed behind the
//! operator's back: only [`SessionManager::update_credentials`] changes them.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use recorder_betfair::MarketDataClient;
use recorder_core::{Credentials, RecorderResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;

/// A keepalive is due once this much time has passed since the last one
pub const KEEPALIVE_INTERVAL_MINUTES: i64 = 15;

/// Outcome of a session check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionValidation {
    pub valid: bool,
    pub message: String,
}

/// Snapshot of session bookkeeping for the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub has_credentials: bool,
    /// `None` until the first validation
    pub valid: Option<bool>,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub last_keepalive_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

#[derive(Debug, Default)]
struct SessionInner {
    credentials: Credentials,
    valid: Option<bool>,
    last_validated_at: Option<DateTime<Utc>>,
    last_keepalive_at: Option<DateTime<Utc>>,
    message: Option<String>,
}

pub struct SessionManager {
    client: Arc<dyn MarketDataClient>,
    clock: Arc<dyn Clock>,
    inner: RwLock<SessionInner>,
}

impl SessionManager {
    pub fn new(client: Arc<dyn MarketDataClient>, clock: Arc<dyn Clock>, credentials: Credentials) -> Self {
        Self {
            client,
            clock,
            inner: RwLock::new(SessionInner {
                credentials,
                ..Default::default()
            }),
        }
    }

    pub fn credentials(&self) -> Credentials {
        self.inner.read().credentials.clone()
    }

    pub fn has_credentials(&self) -> bool {
        self.inner.read().credentials.is_complete()
    }

    /// Replace the stored credentials. Restarts the keepalive clock.
    pub fn update_credentials(&self, credentials: Credentials) {
        let mut inner = self.inner.write();
        if inner.credentials == credentials {
            return;
        }
        info!("Session credentials updated");
        inner.credentials = credentials;
        inner.valid = None;
        inner.last_validated_at = None;
        inner.last_keepalive_at = None;
        inner.message = None;
    }

    /// Check `credentials` against the exchange without touching stored state
    pub async fn validate(&self, credentials: &Credentials) -> SessionValidation {
        if !credentials.is_complete() {
            return SessionValidation {
                valid: false,
                message: "App key and session token are required".to_string(),
            };
        }

        match self.client.validate_session(credentials).await {
            Ok(()) => SessionValidation {
                valid: true,
                message: "Session valid".to_string(),
            },
            Err(e) => SessionValidation {
                valid: false,
                message: e.to_string(),
            },
        }
    }

    /// Validate the stored credentials and record the result
    pub async fn validate_current(&self) -> SessionValidation {
        let credentials = self.credentials();
        let result = self.validate(&credentials).await;

        let mut inner = self.inner.write();
        // Credentials may have been swapped while the call was in flight
        if inner.credentials == credentials {
            inner.valid = Some(result.valid);
            inner.last_validated_at = Some(self.clock.now());
            inner.message = Some(result.message.clone());
        }
        debug!("Session validation: {}", result.message);
        result
    }

    pub fn keepalive_due(&self, now: DateTime<Utc>) -> bool {
        match self.inner.read().last_keepalive_at {
            None => true,
            Some(last) => now.signed_duration_since(last) > Duration::minutes(KEEPALIVE_INTERVAL_MINUTES),
        }
    }

    /// Extend the session. On failure the session is marked invalid and the
    /// caller is expected to enter AUTH_ERROR.
    pub async fn keepalive(&self) -> RecorderResult<()> {
        let credentials = self.credentials();
        match self.client.keepalive(&credentials).await {
            Ok(()) => {
                self.record_keepalive(self.clock.now());
                debug!("Keepalive sent");
                Ok(())
            }
            Err(e) => {
                warn!("Keepalive failed: {}", e);
                let mut inner = self.inner.write();
                inner.valid = Some(false);
                inner.message = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn record_keepalive(&self, at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        inner.last_keepalive_at = Some(at);
        inner.valid = Some(true);
    }

    /// Mark the session unusable after an auth failure on any call
    pub fn mark_invalid(&self, message: impl Into<String>) {
        let mut inner = self.inner.write();
        inner.valid = Some(false);
        inner.message = Some(message.into());
    }

    pub fn status(&self) -> SessionStatus {
        let inner = self.inner.read();
        SessionStatus {
            has_credentials: inner.credentials.is_complete(),
            valid: inner.valid,
            last_validated_at: inner.last_validated_at,
            last_keepalive_at: inner.last_keepalive_at,
            message: inner.message.clone(),
        }
    }
}
