//! Shared types, error model, and configuration for trackermerge.
//!
//! This crate is the foundation depended on by all other trackermerge crates.
//! It provides:
//! - [`TrackerMergeError`] — the unified error type
//! - Domain types ([`SourceUrl`], [`FetchResult`], [`FetchStats`], [`DedupStats`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BootstrapConfig, DedupConfig, FetchPolicyConfig, FetchSettings, PathsConfig,
    PipelineConfig, USER_AGENT, config_dir, config_file_path, init_config, init_config_at,
    load_config, load_config_from, same_location,
};
pub use error::{Phase, Result, TrackerMergeError};
pub use types::{
    DedupStats, FailureKind, FetchError, FetchResult, FetchStats, SourceFailure, SourceUrl,
};
