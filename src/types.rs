//! Shared data model for a sampling run.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Concept → occurrence count, ordered by rank.
pub type TopConcepts = IndexMap<String, u64>;

/// Sentinel reason reported when the model declines to score a message.
pub const NO_SENTIMENT: &str = "NO SENTIMENT";

/// One sampled stream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub text: String,
    pub author_id: String,
    pub collection_id: String,
    pub record_key: String,
}

/// The six emotion scores, in reply order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentScores {
    pub happiness: f64,
    pub sadness: f64,
    pub anger: f64,
    pub fear: f64,
    pub surprise: f64,
    pub disgust: f64,
}

impl SentimentScores {
    /// Reply labels, in the order the instruction lists them.
    pub const LABELS: [&'static str; 6] =
        ["happiness", "sadness", "anger", "fear", "surprise", "disgust"];

    pub fn from_array(values: [f64; 6]) -> Self {
        let [happiness, sadness, anger, fear, surprise, disgust] = values;
        Self {
            happiness,
            sadness,
            anger,
            fear,
            surprise,
            disgust,
        }
    }

    pub fn to_array(self) -> [f64; 6] {
        [
            self.happiness,
            self.sadness,
            self.anger,
            self.fear,
            self.surprise,
            self.disgust,
        ]
    }
}

/// A successfully parsed classifier reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub scores: SentimentScores,
    /// Between zero and three concepts, unique ignoring case.
    pub concepts: Vec<String>,
}

/// Why a message produced no scores.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationFailure {
    /// The model replied with the `NO SENTIMENT` sentinel.
    NoSentiment,
    /// The reply did not follow the grammar. Carries the raw reply.
    Malformed { reply: String },
    /// The request could not be made or did not succeed.
    Transport(String),
}

impl ClassificationFailure {
    /// Reason string: the sentinel, the raw reply, or the transport error.
    pub fn reason(&self) -> &str {
        match self {
            ClassificationFailure::NoSentiment => NO_SENTIMENT,
            ClassificationFailure::Malformed { reply } => reply,
            ClassificationFailure::Transport(msg) => msg,
        }
    }

    pub fn is_no_sentiment(&self) -> bool {
        matches!(self, ClassificationFailure::NoSentiment)
    }
}

impl std::fmt::Display for ClassificationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassificationFailure::NoSentiment => write!(f, "{}", NO_SENTIMENT),
            ClassificationFailure::Malformed { reply } => write!(f, "malformed reply: {}", reply),
            ClassificationFailure::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationOutcome {
    Success(Classification),
    Failure(ClassificationFailure),
}

impl ClassificationOutcome {
    pub fn transport(msg: impl Into<String>) -> Self {
        ClassificationOutcome::Failure(ClassificationFailure::Transport(msg.into()))
    }
}

/// Averages and count for one run. Stored as key metadata, so kept small.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentMetrics {
    pub message_count: u64,
    pub happiness_avg: f64,
    pub sadness_avg: f64,
    pub anger_avg: f64,
    pub fear_avg: f64,
    pub surprise_avg: f64,
    pub disgust_avg: f64,
}

impl SentimentMetrics {
    pub fn from_means(message_count: u64, means: SentimentScores) -> Self {
        Self {
            message_count,
            happiness_avg: means.happiness,
            sadness_avg: means.sadness,
            anger_avg: means.anger,
            fear_avg: means.fear,
            surprise_avg: means.surprise,
            disgust_avg: means.disgust,
        }
    }
}

/// A summary without its concept list, as returned by range queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterReading {
    pub timestamp: String,
    #[serde(flatten)]
    pub metrics: SentimentMetrics,
}

/// One aggregation result, keyed by the instant aggregation finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub timestamp: String,
    #[serde(flatten)]
    pub metrics: SentimentMetrics,
    pub top_concepts: TopConcepts,
}

impl SummaryRecord {
    pub fn reading(&self) -> MeterReading {
        MeterReading {
            timestamp: self.timestamp.clone(),
            metrics: self.metrics,
        }
    }
}
