//! Line-delimited record writer
//!
//! Each record becomes one JSON object per line, tagged with the capture time
//! and the stream it belongs to. Objects are keyed
//! `{basePath}/{eventTypeId}/{date}/{stream}/{HH-MM-SS}.ndjson`.

use chrono::{DateTime, SecondsFormat, Utc};
use recorder_core::{RecorderError, RecorderResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, warn};

use crate::ObjectStore;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Failed objects kept for the next cycle
pub const PENDING_CAPACITY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Catalogue,
    Books,
}

impl Stream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Catalogue => "catalogue",
            Stream::Books => "books",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn object_key(
    base_path: &str,
    event_type_id: &str,
    poll_started: DateTime<Utc>,
    stream: Stream,
) -> String {
    format!(
        "{}/{}/{}/{}/{}.ndjson",
        base_path.trim_matches('/'),
        event_type_id,
        poll_started.format("%Y-%m-%d"),
        stream,
        poll_started.format("%H-%M-%S")
    )
}

/// Serialize `records` as newline-terminated JSON lines with `_recorded_at`
/// and `_data_type` merged into each object
pub fn encode_records<T: Serialize>(
    records: &[T],
    stream: Stream,
    recorded_at: DateTime<Utc>,
) -> RecorderResult<Vec<u8>> {
    let timestamp = recorded_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut out = Vec::new();

    for record in records {
        let value = serde_json::to_value(record)
            .map_err(|e| RecorderError::internal(format!("Failed to serialize record: {}", e)))?;
        let mut object = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        object.insert("_recorded_at".to_string(), Value::String(timestamp.clone()));
        object.insert("_data_type".to_string(), Value::String(stream.to_string()));

        serde_json::to_writer(&mut out, &Value::Object(object))
            .map_err(|e| RecorderError::internal(format!("Failed to encode record: {}", e)))?;
        out.push(b'\n');
    }

    Ok(out)
}

/// An encoded object waiting for a successful put
#[derive(Debug, Clone, PartialEq)]
pub struct PendingObject {
    pub key: String,
    pub body: Vec<u8>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    /// Keys written successfully
    pub written: Vec<String>,
    /// Keys that failed, with the error message
    pub failed: Vec<(String, String)>,
    /// Keys dropped from the pending queue to make room
    pub evicted: Vec<String>,
}

impl FlushReport {
    pub fn merge(&mut self, other: FlushReport) {
        self.written.extend(other.written);
        self.failed.extend(other.failed);
        self.evicted.extend(other.evicted);
    }
}

/// Writes record objects and carries failed puts over to the next cycle
#[derive(Debug, Default)]
pub struct RecordWriter {
    pending: VecDeque<PendingObject>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_keys(&self) -> Vec<String> {
        self.pending.iter().map(|p| p.key.clone()).collect()
    }

    /// Re-put everything that failed on earlier cycles
    pub async fn retry_pending(&mut self, store: &dyn ObjectStore) -> FlushReport {
        let mut report = FlushReport::default();
        let queued: Vec<PendingObject> = self.pending.drain(..).collect();

        for mut object in queued {
            object.attempts += 1;
            match store
                .put(&object.key, object.body.clone(), NDJSON_CONTENT_TYPE)
                .await
            {
                Ok(()) => {
                    debug!("Retried {} after {} attempts", object.key, object.attempts);
                    report.written.push(object.key);
                }
                Err(e) => {
                    report.failed.push((object.key.clone(), e.to_string()));
                    self.enqueue(object, &mut report);
                }
            }
        }

        report
    }

    /// Put one encoded object. Failures are queued, not retried here.
    pub async fn write(&mut self, store: &dyn ObjectStore, key: String, body: Vec<u8>) -> FlushReport {
        let mut report = FlushReport::default();
        match store.put(&key, body.clone(), NDJSON_CONTENT_TYPE).await {
            Ok(()) => report.written.push(key),
            Err(e) => {
                warn!("Write failed for {}, queued for next cycle: {}", key, e);
                report.failed.push((key.clone(), e.to_string()));
                self.enqueue(
                    PendingObject {
                        key,
                        body,
                        attempts: 1,
                    },
                    &mut report,
                );
            }
        }
        report
    }

    fn enqueue(&mut self, object: PendingObject, report: &mut FlushReport) {
        if self.pending.len() == PENDING_CAPACITY {
            if let Some(dropped) = self.pending.pop_front() {
                warn!("Pending queue full, dropping {}", dropped.key);
                report.evicted.push(dropped.key);
            }
        }
        self.pending.push_back(object);
    }
}
