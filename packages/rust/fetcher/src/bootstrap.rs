//! One-shot download of the seed list.

use std::path::Path;

use tracing::{info, instrument};

use trackermerge_shared::{Result, TrackerMergeError};

use crate::fetch::{Fetcher, parse_well_formed};

/// What [`Fetcher::bootstrap_seed_file`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The seed file already existed and was left alone.
    Skipped,
    /// The seed file was downloaded.
    Downloaded { bytes: u64 },
}

impl Fetcher {
    /// Download `manifest_url` into `seed_path` unless the file already exists.
    #[instrument(skip_all, fields(manifest_url = %manifest_url, seed = %seed_path.display()))]
    pub async fn bootstrap_seed_file(
        &self,
        manifest_url: &str,
        seed_path: &Path,
    ) -> Result<BootstrapOutcome> {
        if seed_path.exists() {
            info!("seed file already present, skipping download");
            return Ok(BootstrapOutcome::Skipped);
        }

        let url = parse_well_formed(manifest_url)
            .map_err(|e| TrackerMergeError::config(format!("invalid manifest URL: {e}")))?;

        let response = self
            .client()
            .get(url)
            .send()
            .await
            .map_err(|e| TrackerMergeError::Network(format!("{manifest_url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerMergeError::Network(format!(
                "{manifest_url}: HTTP {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TrackerMergeError::Network(format!("{manifest_url}: body read failed: {e}")))?;

        if let Some(parent) = seed_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TrackerMergeError::io(parent, e))?;
        }
        tokio::fs::write(seed_path, body.as_bytes())
            .await
            .map_err(|e| TrackerMergeError::io(seed_path, e))?;

        let bytes = body.len() as u64;
        info!(bytes, "seed file downloaded");
        Ok(BootstrapOutcome::Downloaded { bytes })
    }
}
