//! Concurrent classification of a batch and reduction into one summary.

mod stats;

pub use stats::{rank_concepts, OutcomeCounts, SentimentAccumulator, TOP_CONCEPTS_LIMIT};

use futures::future::join_all;
use tracing::{debug, info};

use crate::classifier::Classifier;
use crate::clock;
use crate::types::{RawMessage, SummaryRecord};

/// Result of aggregating one batch.
#[derive(Debug)]
pub struct AggregateReport {
    pub summary: Option<SummaryRecord>,
    pub counts: OutcomeCounts,
}

/// Classify every message concurrently, then reduce the outcomes.
///
/// All calls are awaited; a failing call only affects its own message. The
/// summary timestamp is taken once every call has finished.
#[tracing::instrument(name = "aggregate", skip_all, fields(batch = messages.len()))]
pub async fn aggregate<C>(messages: &[RawMessage], classifier: &C) -> AggregateReport
where
    C: Classifier + ?Sized,
{
    let outcomes = join_all(messages.iter().map(|m| classifier.classify(&m.text))).await;

    let mut acc = SentimentAccumulator::default();
    for outcome in &outcomes {
        acc.accumulate(outcome);
    }
    let counts = acc.counts();

    info!(
        succeeded = counts.succeeded,
        no_sentiment = counts.no_sentiment,
        failed = counts.failed,
        "batch classified"
    );

    let summary = acc.finish(clock::now_iso());
    if summary.is_none() {
        debug!("no successful classifications, no summary produced");
    }

    AggregateReport { summary, counts }
}
