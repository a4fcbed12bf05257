//! HTTP handlers shared by the native and Worker adapters.
//!
//! Each handler returns an [`ApiResponse`]; the adapters only translate it
//! into their own response type and add CORS headers.

use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, error};

use crate::clock::HOUR_MS;
use crate::store::{KvBackend, StoreError, TimeIndexedStore};

/// Trailing window served by `/api/meters`.
pub const METERS_WINDOW_MS: i64 = 24 * HOUR_MS;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: JsonValue,
}

impl ApiResponse {
    fn ok<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Self { status: 200, body },
            Err(e) => {
                error!(error = %e, "failed to serialize response");
                Self::internal_error()
            }
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
        }
    }

    pub fn not_found() -> Self {
        Self::error(404, "Not found")
    }

    pub fn internal_error() -> Self {
        Self::error(500, "Uncaught exception")
    }

    fn from_store_error(e: StoreError) -> Self {
        error!(error = %e, "store request failed");
        Self::internal_error()
    }
}

/// `GET /api/meters`: readings for `[now - 24h, now]`, ascending.
#[tracing::instrument(name = "api_meters", skip(store))]
pub async fn meters<B: KvBackend>(store: &TimeIndexedStore<B>, now_ms: i64) -> ApiResponse {
    match store.get_range(now_ms - METERS_WINDOW_MS, now_ms).await {
        Ok(readings) => {
            debug!(count = readings.len(), "meters served");
            ApiResponse::ok(&readings)
        }
        Err(e) => ApiResponse::from_store_error(e),
    }
}

/// `GET /api/concepts?timestamp=`: the concept mapping stored under one key.
#[tracing::instrument(name = "api_concepts", skip(store))]
pub async fn concepts<B: KvBackend>(
    store: &TimeIndexedStore<B>,
    timestamp: Option<&str>,
) -> ApiResponse {
    let Some(timestamp) = timestamp.filter(|t| !t.is_empty()) else {
        return ApiResponse::error(400, "Missing timestamp parameter");
    };

    match store.get_concepts(timestamp).await {
        Ok(Some(concepts)) => ApiResponse::ok(&concepts),
        Ok(None) => ApiResponse::error(404, "No data found for timestamp"),
        Err(e) => ApiResponse::from_store_error(e),
    }
}
