//! Core domain types shared by the fetcher and the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SourceUrl
// ---------------------------------------------------------------------------

/// An opaque address of a remote tracker list, one per seed-file line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceUrl(pub String);

impl SourceUrl {
    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceUrl {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SourceUrl {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Fetch outcome
// ---------------------------------------------------------------------------

/// Why a single source could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// Not parseable, or missing a scheme or host.
    InvalidUrl,
    /// The server answered with a non-2xx status.
    HttpStatus { status: u16 },
    /// The request exceeded its timeout.
    Timeout,
    /// Connection-level failure.
    Network,
    /// The response body could not be read.
    Body,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus { status } => write!(f, "http status {status}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Body => write!(f, "body read failed"),
        }
    }
}

/// A per-source fetch failure. Recorded and logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of fetching one source. Exactly one is produced per source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Success { url: SourceUrl, body: String },
    Failure { url: SourceUrl, error: FetchError },
}

impl FetchResult {
    /// The source this result belongs to.
    pub fn url(&self) -> &SourceUrl {
        match self {
            FetchResult::Success { url, .. } | FetchResult::Failure { url, .. } => url,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success { .. })
    }
}

// ---------------------------------------------------------------------------
// Run statistics
// ---------------------------------------------------------------------------

/// A failed source and the reason, as reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub url: String,
    pub cause: String,
}

/// Summary of the fetch phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStats {
    /// Sources whose body was appended to the raw artifact.
    pub succeeded: usize,
    /// Sources that failed, in source order.
    pub failures: Vec<SourceFailure>,
    /// Total bytes of body text received.
    pub bytes: u64,
}

impl FetchStats {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Record one result.
    pub fn record(&mut self, result: &FetchResult) {
        match result {
            FetchResult::Success { body, .. } => {
                self.succeeded += 1;
                self.bytes += body.len() as u64;
            }
            FetchResult::Failure { url, error } => self.failures.push(SourceFailure {
                url: url.to_string(),
                cause: error.to_string(),
            }),
        }
    }
}

/// Summary of one deduplication pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    /// Lines read from the input, blank ones included.
    pub lines_read: u64,
    /// Distinct entries written to the output.
    pub kept: u64,
    /// Non-blank lines dropped because they were already emitted.
    pub duplicates: u64,
    /// Blank (or whitespace-only) lines skipped.
    pub blank: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_stats_records_success_and_failure() {
        let mut stats = FetchStats::default();
        stats.record(&FetchResult::Success {
            url: "http://a/tr.txt".into(),
            body: "udp://x:80\n".into(),
        });
        stats.record(&FetchResult::Failure {
            url: "http://b/tr.txt".into(),
            error: FetchError::new(FailureKind::HttpStatus { status: 404 }, "404 Not Found"),
        });

        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.bytes, 11);
        assert_eq!(stats.failures[0].url, "http://b/tr.txt");
        assert_eq!(stats.failures[0].cause, "http status 404: 404 Not Found");
    }

    #[test]
    fn failure_kind_serializes_tagged() {
        let json = serde_json::to_string(&FailureKind::HttpStatus { status: 503 }).unwrap();
        assert_eq!(json, r#"{"kind":"http_status","status":503}"#);
    }
}
