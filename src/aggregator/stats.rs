//! Reduction of classification outcomes into a summary.

use indexmap::IndexMap;
use serde::Serialize;

use crate::types::{
    ClassificationOutcome, SentimentMetrics, SentimentScores, SummaryRecord, TopConcepts,
};

/// Maximum concepts kept in a summary.
pub const TOP_CONCEPTS_LIMIT: usize = 200;

/// Outcome counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeCounts {
    pub succeeded: u64,
    pub no_sentiment: u64,
    pub failed: u64,
}

/// Running sums and concept frequencies over successful classifications.
#[derive(Debug, Default)]
pub struct SentimentAccumulator {
    counts: OutcomeCounts,
    sums: [f64; 6],
    /// Lower-cased concept → count, in first-seen order.
    concepts: IndexMap<String, u64>,
}

impl SentimentAccumulator {
    pub fn accumulate(&mut self, outcome: &ClassificationOutcome) {
        match outcome {
            ClassificationOutcome::Success(c) => {
                self.counts.succeeded += 1;
                for (sum, score) in self.sums.iter_mut().zip(c.scores.to_array()) {
                    *sum += score;
                }
                let mut seen: Vec<String> = Vec::with_capacity(c.concepts.len());
                for concept in &c.concepts {
                    let key = concept.to_lowercase();
                    if !seen.contains(&key) {
                        *self.concepts.entry(key.clone()).or_insert(0) += 1;
                        seen.push(key);
                    }
                }
            }
            ClassificationOutcome::Failure(f) if f.is_no_sentiment() => {
                self.counts.no_sentiment += 1;
            }
            ClassificationOutcome::Failure(_) => {
                self.counts.failed += 1;
            }
        }
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.counts
    }

    /// Build the summary, or `None` when nothing succeeded.
    pub fn finish(self, timestamp: String) -> Option<SummaryRecord> {
        let n = self.counts.succeeded;
        if n == 0 {
            return None;
        }

        let means = SentimentScores::from_array(self.sums.map(|sum| sum / n as f64));

        Some(SummaryRecord {
            timestamp,
            metrics: SentimentMetrics::from_means(n, means),
            top_concepts: rank_concepts(self.concepts, TOP_CONCEPTS_LIMIT),
        })
    }
}

/// Sort by count descending, keeping first-seen order among ties.
pub fn rank_concepts(concepts: IndexMap<String, u64>, limit: usize) -> TopConcepts {
    let mut ranked: Vec<(String, u64)> = concepts.into_iter().collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(limit);
    ranked.into_iter().collect()
}
