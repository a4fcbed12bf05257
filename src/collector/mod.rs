//! Bounded collection of stream events into an in-memory batch.
//!
//! Collection runs until the first of: the event ceiling is reached, the
//! duration ceiling elapses, or the remote end closes the subscription.
//! Transport errors are reported and counted but never end collection.

pub mod jetstream;

use futures::future::{select, Either};
use futures::{pin_mut, Stream, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock;
use crate::types::RawMessage;

/// Collection type of Bluesky posts.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

#[derive(Debug)]
pub enum CollectError {
    /// Neither an event nor a duration ceiling was configured.
    NoStopCondition,
    Connect(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::NoStopCondition => {
                write!(f, "at least one of an event limit or a duration is required")
            }
            CollectError::Connect(msg) => write!(f, "stream connect failed: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {}

/// When to stop collecting. At least one ceiling is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopCondition {
    max_events: Option<usize>,
    max_duration: Option<Duration>,
}

impl StopCondition {
    pub fn new(
        max_events: Option<usize>,
        max_duration: Option<Duration>,
    ) -> Result<Self, CollectError> {
        if max_events.is_none() && max_duration.is_none() {
            return Err(CollectError::NoStopCondition);
        }
        Ok(Self {
            max_events,
            max_duration,
        })
    }

    pub fn events(limit: usize) -> Self {
        Self {
            max_events: Some(limit),
            max_duration: None,
        }
    }

    pub fn duration(limit: Duration) -> Self {
        Self {
            max_events: None,
            max_duration: Some(limit),
        }
    }

    pub fn max_events(&self) -> Option<usize> {
        self.max_events
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration
    }

    /// True when a ceiling of zero makes subscribing pointless.
    pub fn is_exhausted(&self) -> bool {
        self.max_events == Some(0) || self.max_duration == Some(Duration::ZERO)
    }
}

/// Content filter: the collection types to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFilter {
    pub collections: Vec<String>,
}

impl StreamFilter {
    pub fn posts() -> Self {
        Self {
            collections: vec![POST_COLLECTION.to_string()],
        }
    }

    pub fn matches(&self, collection: &str) -> bool {
        self.collections.iter().any(|c| c == collection)
    }
}

impl Default for StreamFilter {
    fn default() -> Self {
        Self::posts()
    }
}

/// A decoded event from a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Message(RawMessage),
    Error(String),
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EventLimit,
    Deadline,
    RemoteClosed,
}

#[derive(Debug)]
pub struct CollectOutcome {
    pub messages: Vec<RawMessage>,
    pub errors: usize,
    pub stop_reason: StopReason,
}

/// Drain `events` into a batch until `stop` triggers or the stream ends.
///
/// The caller owns the underlying connection and closes it afterwards; this
/// function only stops polling.
pub async fn collect<S>(events: S, stop: &StopCondition) -> CollectOutcome
where
    S: Stream<Item = StreamEvent>,
{
    pin_mut!(events);

    let mut messages = Vec::new();
    let mut errors = 0;

    if stop.is_exhausted() {
        return CollectOutcome {
            messages,
            errors,
            stop_reason: if stop.max_events == Some(0) {
                StopReason::EventLimit
            } else {
                StopReason::Deadline
            },
        };
    }

    let mut deadline = stop.max_duration.map(|d| Box::pin(clock::sleep(d)));

    let stop_reason = loop {
        let next = match deadline.as_mut() {
            Some(timer) => match select(events.next(), timer).await {
                Either::Left((event, _)) => event,
                Either::Right(_) => break StopReason::Deadline,
            },
            None => events.next().await,
        };

        match next {
            Some(StreamEvent::Message(message)) => {
                messages.push(message);
                if stop.max_events.is_some_and(|limit| messages.len() >= limit) {
                    break StopReason::EventLimit;
                }
            }
            Some(StreamEvent::Error(e)) => {
                errors += 1;
                warn!(error = %e, "stream error");
            }
            Some(StreamEvent::Closed) | None => break StopReason::RemoteClosed,
        }
    };

    debug!(buffered = messages.len(), errors, ?stop_reason, "collection stopped");

    CollectOutcome {
        messages,
        errors,
        stop_reason,
    }
}

/// Subscribe to Jetstream at `endpoint` and collect one batch.
#[tracing::instrument(name = "collect", skip(filter, stop), fields(endpoint = %endpoint))]
pub async fn collect_from_jetstream(
    endpoint: &str,
    filter: &StreamFilter,
    stop: &StopCondition,
) -> Result<CollectOutcome, CollectError> {
    if stop.is_exhausted() {
        return Ok(collect(futures::stream::empty(), stop).await);
    }

    let url = jetstream::subscribe_url(endpoint, filter);
    let mut subscription = jetstream::Subscription::open(&url).await?;
    info!(url = %url, "stream subscription opened");

    let outcome = collect(subscription.events(filter), stop).await;

    subscription.close().await;
    info!(
        buffered = outcome.messages.len(),
        errors = outcome.errors,
        stop_reason = ?outcome.stop_reason,
        "stream subscription closed"
    );

    Ok(outcome)
}
