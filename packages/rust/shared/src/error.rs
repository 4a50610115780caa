//! Error types for trackermerge.
//!
//! Library crates use [`TrackerMergeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;

/// Pipeline phase in which an artifact error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Loading the seed list.
    LoadSources,
    /// Fetching sources and writing the raw artifact.
    Fetch,
    /// Deduplicating the raw artifact into the output artifact.
    Dedup,
    /// Removing transient files.
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::LoadSources => "load-sources",
            Phase::Fetch => "fetch",
            Phase::Dedup => "dedup",
            Phase::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Top-level error type for all trackermerge operations.
#[derive(Debug, thiserror::Error)]
pub enum TrackerMergeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The seed list is missing or unreadable.
    #[error("cannot read source list {path:?}: {source}")]
    SourceList {
        path: PathBuf,
        source: std::io::Error,
    },

    /// HTTP client construction or bootstrap download error.
    #[error("network error: {0}")]
    Network(String),

    /// The raw or output artifact could not be opened, written, or read.
    #[error("{phase} phase failed on {path:?}: {source}")]
    Artifact {
        phase: Phase,
        path: PathBuf,
        source: std::io::Error,
    },

    /// Removing a transient file failed.
    #[error("cleanup of {path:?} failed: {source}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Filesystem I/O error outside the pipeline artifacts.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TrackerMergeError>;

impl TrackerMergeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` raised while reading the seed list.
    pub fn source_list(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SourceList {
            path: path.into(),
            source,
        }
    }

    /// Wrap a `std::io::Error` raised on a pipeline artifact.
    pub fn artifact(phase: Phase, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Artifact {
            phase,
            path: path.into(),
            source,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The pipeline phase this error belongs to, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::SourceList { .. } => Some(Phase::LoadSources),
            Self::Artifact { phase, .. } => Some(*phase),
            Self::Cleanup { .. } => Some(Phase::Cleanup),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = TrackerMergeError::config("concurrency must be at least 1");
        assert_eq!(err.to_string(), "config error: concurrency must be at least 1");

        let err = TrackerMergeError::artifact(
            Phase::Dedup,
            "output_trackers.txt",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().starts_with("dedup phase failed"));
        assert_eq!(err.phase(), Some(Phase::Dedup));
    }

    #[test]
    fn source_list_error_names_load_phase() {
        let err = TrackerMergeError::source_list(
            "main_url.txt",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert_eq!(err.phase(), Some(Phase::LoadSources));
        assert!(err.to_string().contains("main_url.txt"));
    }
}
