// src/lib.rs
pub mod aggregator;
pub mod classifier;
pub mod clock;
pub mod collector;
pub mod handler;
pub mod pipeline;
pub mod store;
pub mod types;

// Re-export tracing for use in other modules
pub use tracing;

pub use aggregator::{aggregate, AggregateReport, OutcomeCounts};
pub use classifier::{parse_reply, Classifier, OpenAiClassifier};
pub use collector::{collect, CollectError, CollectOutcome, StopCondition, StreamEvent, StreamFilter};
pub use pipeline::{process_batch, run, RunConfig, RunError, RunReport};
pub use store::{KvBackend, MemoryKv, StoreError, TimeIndexedStore};
pub use types::{
    Classification, ClassificationFailure, ClassificationOutcome, MeterReading, RawMessage,
    SentimentMetrics, SentimentScores, SummaryRecord, TopConcepts,
};

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(not(target_arch = "wasm32"))]
pub mod native;

#[cfg(not(target_arch = "wasm32"))]
pub use native::build_router;
