//! Ordered, failure-isolating fetcher for remote tracker lists.
//!
//! Every source URL is fetched once with a shared client. Requests fan out up
//! to the configured concurrency, but results are handed back strictly in
//! source order, so the caller can append them to the raw artifact as they
//! arrive without reordering.

use std::collections::VecDeque;

use reqwest::Client;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, instrument, warn};
use url::Url;

use trackermerge_shared::{
    FailureKind, FetchError, FetchResult, FetchSettings, FetchStats, Result, SourceUrl,
    TrackerMergeError,
};

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// HTTP fetcher sharing one connection pool across all sources.
pub struct Fetcher {
    client: Client,
    settings: FetchSettings,
}

impl Fetcher {
    /// Create a new fetcher with the given settings.
    pub fn new(settings: FetchSettings) -> Result<Self> {
        if settings.concurrency == 0 {
            return Err(TrackerMergeError::config("fetch concurrency must be at least 1"));
        }

        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| {
                TrackerMergeError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, settings })
    }

    /// The shared HTTP client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Fetch a single source.
    pub async fn fetch_one(&self, url: &SourceUrl) -> FetchResult {
        fetch_source(&self.client, url.clone()).await
    }

    /// Fetch every source and hand each result to `visit` in source order.
    ///
    /// At most `concurrency` requests are spawned ahead of the visitor, so a
    /// slow source holds back at most that many finished bodies. Per-source
    /// failures are passed to `visit` like successes and never stop the batch.
    /// An error returned by `visit` aborts the outstanding requests and is
    /// returned as is.
    #[instrument(skip_all, fields(sources = urls.len(), concurrency = self.settings.concurrency))]
    pub async fn fetch_ordered<F>(&self, urls: &[SourceUrl], mut visit: F) -> Result<FetchStats>
    where
        F: FnMut(usize, FetchResult) -> Result<()>,
    {
        let window = self.settings.concurrency.max(1);
        let mut queued = urls.iter().cloned();
        let mut in_flight: VecDeque<(SourceUrl, JoinHandle<FetchResult>)> =
            queued.by_ref().take(window).map(|url| self.spawn_fetch(url)).collect();

        info!("starting fetch");

        let mut stats = FetchStats::default();
        let mut index = 0;

        while let Some((url, handle)) = in_flight.pop_front() {
            let result = handle.await.unwrap_or_else(|e| task_failure(url, e));

            if let Some(next) = queued.next() {
                in_flight.push_back(self.spawn_fetch(next));
            }

            if let FetchResult::Failure { url, error } = &result {
                warn!(%url, %error, "source failed, skipping");
            }
            stats.record(&result);

            if let Err(err) = visit(index, result) {
                for (_, rest) in in_flight {
                    rest.abort();
                }
                return Err(err);
            }
            index += 1;
        }

        info!(
            succeeded = stats.succeeded,
            failed = stats.failed(),
            bytes = stats.bytes,
            "fetch completed"
        );

        Ok(stats)
    }

    /// Fetch every source and collect the results in source order.
    pub async fn fetch_all(&self, urls: &[SourceUrl]) -> Result<Vec<FetchResult>> {
        let mut results = Vec::with_capacity(urls.len());
        self.fetch_ordered(urls, |_, result| {
            results.push(result);
            Ok(())
        })
        .await?;
        Ok(results)
    }

    fn spawn_fetch(&self, url: SourceUrl) -> (SourceUrl, JoinHandle<FetchResult>) {
        let client = self.client.clone();
        let task_url = url.clone();
        let handle = tokio::spawn(async move { fetch_source(&client, task_url).await });
        (url, handle)
    }
}

// ---------------------------------------------------------------------------
// URL guard
// ---------------------------------------------------------------------------

/// Parse `raw` and require a scheme and a host.
pub fn parse_well_formed(raw: &str) -> std::result::Result<Url, FetchError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| FetchError::new(FailureKind::InvalidUrl, format!("{raw}: {e}")))?;
    if !url.has_host() {
        return Err(FetchError::new(
            FailureKind::InvalidUrl,
            format!("{raw}: missing host"),
        ));
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Source fetching
// ---------------------------------------------------------------------------

async fn fetch_source(client: &Client, url: SourceUrl) -> FetchResult {
    match fetch_body(client, &url).await {
        Ok(body) => FetchResult::Success { url, body },
        Err(error) => FetchResult::Failure { url, error },
    }
}

async fn fetch_body(client: &Client, source: &SourceUrl) -> std::result::Result<String, FetchError> {
    let url = parse_well_formed(source.as_str())?;
    debug!(%url, "fetching source");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(map_reqwest_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::new(
            FailureKind::HttpStatus {
                status: status.as_u16(),
            },
            status.to_string(),
        ));
    }

    let body = response.text().await.map_err(|e| {
        if e.is_timeout() {
            map_reqwest_error(e)
        } else {
            FetchError::new(FailureKind::Body, e.to_string())
        }
    })?;

    debug!(url = %source, bytes = body.len(), "source fetched");
    Ok(body)
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}

fn task_failure(url: SourceUrl, err: JoinError) -> FetchResult {
    FetchResult::Failure {
        url,
        error: FetchError::new(FailureKind::Network, format!("fetch task failed: {err}")),
    }
}
