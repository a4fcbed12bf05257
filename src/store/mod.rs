//! Time-indexed summary storage over a prefix-listable key-value store.
//!
//! Each summary is stored under its ISO-8601 timestamp. The averages and
//! count ride along as key metadata so a listing returns them without extra
//! reads; the concept list is the value body and is fetched one key at a
//! time. The backing store can only list by prefix, so a time range is
//! split into hour prefixes (`YYYY-MM-DDTHH`) that are listed page by page
//! and then filtered to the exact bounds.

mod memory;
#[cfg(not(target_arch = "wasm32"))]
mod rest;
#[cfg(not(target_arch = "wasm32"))]
mod retry;
#[cfg(target_arch = "wasm32")]
mod workers;

pub use memory::MemoryKv;
#[cfg(not(target_arch = "wasm32"))]
pub use rest::RestKv;
#[cfg(target_arch = "wasm32")]
pub use workers::WorkersKv;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::clock::{floor_hour, format_iso, parse_iso, HOUR_MS};
use crate::types::{MeterReading, SentimentMetrics, SummaryRecord, TopConcepts};

/// Length of the `YYYY-MM-DDTHH` prefix of an ISO-8601 timestamp.
pub const HOUR_PREFIX_LEN: usize = 13;

#[derive(Debug)]
pub enum StoreError {
    Backend(String),
    Serialize(String),
    InvalidTimestamp(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Backend(msg) => write!(f, "storage backend error: {}", msg),
            StoreError::Serialize(msg) => write!(f, "serialization error: {}", msg),
            StoreError::InvalidTimestamp(ts) => write!(f, "invalid timestamp: {}", ts),
        }
    }
}

impl std::error::Error for StoreError {}

/// One key from a listing, with its attached metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ListKey {
    pub name: String,
    pub metadata: Option<JsonValue>,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub keys: Vec<ListKey>,
    pub cursor: Option<String>,
    pub list_complete: bool,
}

/// Minimal key-value contract: put with metadata, paged prefix listing in
/// lexicographic order, and point reads.
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
pub trait KvBackend {
    async fn put(&self, key: &str, value: String, metadata: JsonValue) -> Result<(), StoreError>;

    async fn list(&self, prefix: &str, cursor: Option<String>) -> Result<ListPage, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// Summary store keyed by timestamp.
pub struct TimeIndexedStore<B> {
    backend: B,
}

impl<B: KvBackend> TimeIndexedStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Write a summary. An existing entry with the same timestamp is replaced.
    #[tracing::instrument(name = "store_put", skip_all, fields(timestamp = %record.timestamp))]
    pub async fn put(&self, record: &SummaryRecord) -> Result<(), StoreError> {
        let metadata = serde_json::to_value(record.metrics)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        let body = serde_json::to_string(&record.top_concepts)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;

        self.backend.put(&record.timestamp, body, metadata).await?;
        debug!(concepts = record.top_concepts.len(), "summary stored");
        Ok(())
    }

    /// All readings with `start <= timestamp <= end`, oldest first.
    #[tracing::instrument(name = "store_range", skip(self))]
    pub async fn get_range(&self, start_ms: i64, end_ms: i64) -> Result<Vec<MeterReading>, StoreError> {
        let mut readings: Vec<(i64, MeterReading)> = Vec::new();

        for prefix in hour_prefixes(start_ms, end_ms) {
            let mut cursor = None;
            loop {
                let page = self.backend.list(&prefix, cursor.take()).await?;

                for key in page.keys {
                    let Some(ts) = parse_iso(&key.name) else {
                        warn!(key = %key.name, "skipping key that is not a timestamp");
                        continue;
                    };
                    if ts < start_ms || ts > end_ms {
                        continue;
                    }
                    match key.metadata.map(serde_json::from_value::<SentimentMetrics>) {
                        Some(Ok(metrics)) => readings.push((
                            ts,
                            MeterReading {
                                timestamp: key.name,
                                metrics,
                            },
                        )),
                        Some(Err(e)) => {
                            warn!(key = %key.name, error = %e, "skipping key with invalid metadata")
                        }
                        None => warn!(key = %key.name, "skipping key without metadata"),
                    }
                }

                match page.cursor {
                    Some(next) if !page.list_complete => cursor = Some(next),
                    _ => break,
                }
            }
        }

        readings.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.timestamp.cmp(&b.1.timestamp)));
        debug!(count = readings.len(), "range query complete");
        Ok(readings.into_iter().map(|(_, r)| r).collect())
    }

    /// Concept list for an exact timestamp, or `None` if nothing is stored.
    pub async fn get_concepts(&self, timestamp: &str) -> Result<Option<TopConcepts>, StoreError> {
        match self.backend.get(timestamp).await? {
            Some(body) => serde_json::from_str(&body)
                .map(Some)
                .map_err(|e| StoreError::Serialize(e.to_string())),
            None => Ok(None),
        }
    }
}

/// Hour prefixes covering `[start_ms, end_ms]`, oldest first.
pub fn hour_prefixes(start_ms: i64, end_ms: i64) -> Vec<String> {
    if start_ms > end_ms {
        return Vec::new();
    }
    let last = floor_hour(end_ms);
    let mut hour = floor_hour(start_ms);
    let mut prefixes = Vec::new();
    while hour <= last {
        let mut key = format_iso(hour);
        key.truncate(HOUR_PREFIX_LEN);
        prefixes.push(key);
        hour += HOUR_MS;
    }
    prefixes
}
