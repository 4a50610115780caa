//! Raw artifact writer: the ordered concatenation of every fetched body.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use trackermerge_shared::{FetchResult, Phase, Result, TrackerMergeError};

/// Single writer for the raw artifact.
///
/// Opening truncates any previous artifact, so re-runs never append to stale
/// content. Bodies must be appended in source order.
pub struct AggregateWriter {
    path: PathBuf,
    out: BufWriter<File>,
    bodies: usize,
    bytes: u64,
}

/// What was written once the artifact is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSummary {
    pub path: PathBuf,
    pub bodies: usize,
    pub bytes: u64,
}

impl AggregateWriter {
    /// Create (or truncate) the raw artifact at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| artifact_error(parent, e))?;
        }
        let file = File::create(path).map_err(|e| artifact_error(path, e))?;
        debug!(path = %path.display(), "raw artifact reset");

        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            bodies: 0,
            bytes: 0,
        })
    }

    /// Append one body, terminating it with a newline unless it already ends
    /// with one. Empty bodies contribute nothing.
    pub fn append(&mut self, body: &str) -> Result<()> {
        if body.is_empty() {
            return Ok(());
        }

        self.out
            .write_all(body.as_bytes())
            .map_err(|e| artifact_error(&self.path, e))?;
        self.bytes += body.len() as u64;

        if !body.ends_with('\n') {
            self.out
                .write_all(b"\n")
                .map_err(|e| artifact_error(&self.path, e))?;
            self.bytes += 1;
        }

        self.bodies += 1;
        Ok(())
    }

    /// Append the body of a successful result; failures contribute nothing.
    /// Returns whether anything was appended.
    pub fn append_result(&mut self, result: &FetchResult) -> Result<bool> {
        match result {
            FetchResult::Success { body, .. } => {
                let before = self.bodies;
                self.append(body)?;
                Ok(self.bodies > before)
            }
            FetchResult::Failure { .. } => Ok(false),
        }
    }

    /// Flush and close the artifact.
    pub fn finish(self) -> Result<AggregateSummary> {
        let Self {
            path,
            out,
            bodies,
            bytes,
        } = self;

        let file = out
            .into_inner()
            .map_err(|e| artifact_error(&path, e.into_error()))?;
        file.sync_all().map_err(|e| artifact_error(&path, e))?;

        debug!(path = %path.display(), bodies, bytes, "raw artifact closed");
        Ok(AggregateSummary { path, bodies, bytes })
    }
}

fn artifact_error(path: &Path, e: std::io::Error) -> TrackerMergeError {
    TrackerMergeError::artifact(Phase::Fetch, path, e)
}
