//! Wall clock, timers and ISO-8601 helpers that work on both targets.

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::{select, Either};
use std::future::Future;
use std::time::Duration;

pub const HOUR_MS: i64 = 60 * 60 * 1000;

/// Current time in milliseconds since epoch.
#[cfg(target_arch = "wasm32")]
pub fn now_ms() -> i64 {
    worker::Date::now().as_millis() as i64
}

#[cfg(not(target_arch = "wasm32"))]
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(target_arch = "wasm32")]
pub async fn sleep(duration: Duration) {
    gloo_timers::future::TimeoutFuture::new(duration.as_millis() as u32).await;
}

#[cfg(not(target_arch = "wasm32"))]
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Resolve `fut`, or `None` if `limit` elapses first.
pub async fn with_timeout<F: Future>(limit: Duration, fut: F) -> Option<F::Output> {
    let fut = Box::pin(fut);
    let timer = Box::pin(sleep(limit));
    match select(fut, timer).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(_) => None,
    }
}

/// Millisecond-precision UTC timestamp, e.g. `2025-01-03T17:00:00.000Z`.
pub fn format_iso(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_iso() -> String {
    format_iso(now_ms())
}

/// Parse any RFC 3339 timestamp into milliseconds since epoch.
pub fn parse_iso(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
}

pub fn floor_hour(ms: i64) -> i64 {
    ms - ms.rem_euclid(HOUR_MS)
}
