//! One bounded sampling run: collect, classify and aggregate, store.

use serde::Serialize;
use tracing::info;

use crate::aggregator::{aggregate, OutcomeCounts};
use crate::classifier::Classifier;
use crate::collector::{
    collect_from_jetstream, jetstream, CollectError, StopCondition, StopReason, StreamFilter,
};
use crate::store::{KvBackend, StoreError, TimeIndexedStore};
use crate::types::{RawMessage, SummaryRecord};

#[derive(Debug)]
pub enum RunError {
    Collect(CollectError),
    Store(StoreError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Collect(e) => write!(f, "collection failed: {}", e),
            RunError::Store(e) => write!(f, "storing summary failed: {}", e),
        }
    }
}

impl std::error::Error for RunError {}

impl From<CollectError> for RunError {
    fn from(e: CollectError) -> Self {
        RunError::Collect(e)
    }
}

impl From<StoreError> for RunError {
    fn from(e: StoreError) -> Self {
        RunError::Store(e)
    }
}

/// Where and how much to sample.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub endpoint: String,
    pub filter: StreamFilter,
    pub stop: StopCondition,
}

impl RunConfig {
    pub fn new(stop: StopCondition) -> Self {
        Self {
            endpoint: jetstream::DEFAULT_ENDPOINT.to_string(),
            filter: StreamFilter::posts(),
            stop,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub collected: usize,
    pub stream_errors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    pub outcomes: OutcomeCounts,
    /// Timestamp of the stored summary, if one was produced.
    pub stored: Option<String>,
}

/// Collect one batch from the stream and process it.
#[tracing::instrument(name = "run", skip_all, fields(endpoint = %config.endpoint))]
pub async fn run<C, B>(
    config: &RunConfig,
    classifier: &C,
    store: &TimeIndexedStore<B>,
) -> Result<RunReport, RunError>
where
    C: Classifier + ?Sized,
    B: KvBackend,
{
    let collected = collect_from_jetstream(&config.endpoint, &config.filter, &config.stop).await?;

    let mut report = process_batch(&collected.messages, classifier, store).await?;
    report.stream_errors = collected.errors;
    report.stop_reason = Some(collected.stop_reason);
    Ok(report)
}

/// Classify and aggregate a collected batch, storing the summary if any.
pub async fn process_batch<C, B>(
    messages: &[RawMessage],
    classifier: &C,
    store: &TimeIndexedStore<B>,
) -> Result<RunReport, RunError>
where
    C: Classifier + ?Sized,
    B: KvBackend,
{
    let aggregated = aggregate(messages, classifier).await;

    let stored = match aggregated.summary {
        Some(summary) => Some(store_summary(store, summary).await?),
        None => {
            info!(collected = messages.len(), "no summary produced for this run");
            None
        }
    };

    Ok(RunReport {
        collected: messages.len(),
        stream_errors: 0,
        stop_reason: None,
        outcomes: aggregated.counts,
        stored,
    })
}

async fn store_summary<B: KvBackend>(
    store: &TimeIndexedStore<B>,
    summary: SummaryRecord,
) -> Result<String, StoreError> {
    store.put(&summary).await?;
    info!(
        timestamp = %summary.timestamp,
        message_count = summary.metrics.message_count,
        concepts = summary.top_concepts.len(),
        "summary stored"
    );
    Ok(summary.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::parse_reply;
    use crate::store::MemoryKv;
    use crate::types::ClassificationOutcome;

    struct FixedReply(&'static str);

    #[async_trait::async_trait]
    impl Classifier for FixedReply {
        async fn classify(&self, _text: &str) -> ClassificationOutcome {
            parse_reply(self.0)
        }
    }

    fn batch(n: usize) -> Vec<RawMessage> {
        (0..n)
            .map(|i| RawMessage {
                text: format!("post {}", i),
                author_id: "did:plc:x".to_string(),
                collection_id: "app.bsky.feed.post".to_string(),
                record_key: i.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn stores_one_summary_per_batch() {
        let store = TimeIndexedStore::new(MemoryKv::new());
        let classifier = FixedReply(
            "happiness:6\nsadness:2\nanger:1\nfear:0\nsurprise:4\ndisgust:0\nconcepts:news,Sky",
        );

        let report = process_batch(&batch(4), &classifier, &store).await.unwrap();

        assert_eq!(report.collected, 4);
        assert_eq!(report.outcomes.succeeded, 4);
        let ts = report.stored.expect("stored timestamp");
        assert_eq!(store.backend().len(), 1);

        let concepts = store.get_concepts(&ts).await.unwrap().unwrap();
        assert_eq!(concepts.get("sky"), Some(&4));
        assert_eq!(concepts.get("news"), Some(&4));
    }

    #[tokio::test]
    async fn nothing_stored_without_successes() {
        let store = TimeIndexedStore::new(MemoryKv::new());
        let report = process_batch(&batch(3), &FixedReply("NO SENTIMENT"), &store)
            .await
            .unwrap();

        assert_eq!(report.stored, None);
        assert_eq!(report.outcomes.no_sentiment, 3);
        assert!(store.backend().is_empty());
    }

    #[test]
    fn report_serializes_camel_case() {
        let report = RunReport {
            collected: 2,
            stream_errors: 1,
            stop_reason: Some(StopReason::EventLimit),
            outcomes: OutcomeCounts::default(),
            stored: None,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["streamErrors"], 1);
        assert_eq!(value["stopReason"], "event_limit");
        assert_eq!(value["outcomes"]["noSentiment"], 0);
    }
}
