//! Core pipeline orchestration and domain logic for trackermerge.
//!
//! This crate ties together source loading, fetching, raw aggregation, and
//! deduplication into the end-to-end `run` pipeline.

pub mod aggregate;
pub mod dedup;
pub mod pipeline;
pub mod sources;

pub use aggregate::{AggregateSummary, AggregateWriter};
pub use dedup::{
    DedupProgress, Deduplicator, NoDedupProgress, SeparatorState, dedup_file, dedup_str,
    dedup_stream,
};
pub use pipeline::{
    CleanupOutcome, PipelineDedupProgress, PipelineState, ProgressReporter, RunReport,
    SilentProgress, remove_transient, run,
};
pub use sources::{load_sources, parse_sources};
