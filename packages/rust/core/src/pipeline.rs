//! End-to-end `run` pipeline: seed list → fetch → raw artifact → dedup → cleanup.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use trackermerge_fetcher::Fetcher;
use trackermerge_shared::{
    DedupStats, FetchResult, FetchStats, PipelineConfig, Result, TrackerMergeError,
};

use crate::aggregate::AggregateWriter;
use crate::dedup::{self, DedupProgress};
use crate::sources;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Pipeline stages, entered strictly in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    SourcesLoaded,
    Fetching,
    RawWritten,
    Deduplicated,
    CleanedUp,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Init => "Loading source list",
            PipelineState::SourcesLoaded => "Source list loaded",
            PipelineState::Fetching => "Fetching tracker lists",
            PipelineState::RawWritten => "Raw tracker list written",
            PipelineState::Deduplicated => "Trackers deduplicated",
            PipelineState::CleanedUp => "Transient files cleaned up",
            PipelineState::Done => "Done",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What happened to transient files at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupOutcome {
    /// Cleanup is not configured.
    Disabled,
    Removed { path: PathBuf },
    /// The file was already gone.
    AlreadyAbsent { path: PathBuf },
    /// Removal failed; the run still succeeded.
    Failed { path: PathBuf, message: String },
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Number of sources in the seed list.
    pub sources: usize,
    pub fetch: FetchStats,
    /// `None` when the run short-circuited on an empty source list.
    pub dedup: Option<DedupStats>,
    pub raw_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub cleanup: CleanupOutcome,
    /// The seed list was empty; nothing was fetched or written.
    pub nothing_to_process: bool,
    pub elapsed_ms: u128,
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new state.
    fn phase(&self, state: PipelineState);
    /// Called for each source, in source order, once its result is known.
    fn source_fetched(&self, url: &str, succeeded: bool, current: usize, total: usize);
    /// Called periodically during deduplication.
    fn lines_processed(&self, lines: u64);
    /// Called when the pipeline completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _state: PipelineState) {}
    fn source_fetched(&self, _url: &str, _succeeded: bool, _current: usize, _total: usize) {}
    fn lines_processed(&self, _lines: u64) {}
    fn done(&self, _report: &RunReport) {}
}

/// Adapts a `ProgressReporter` to the `DedupProgress` interface.
pub struct PipelineDedupProgress<'a> {
    pub inner: &'a dyn ProgressReporter,
}

impl DedupProgress for PipelineDedupProgress<'_> {
    fn lines_processed(&self, lines: u64) {
        self.inner.lines_processed(lines);
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Run the full pipeline.
///
/// 1. Load the seed list (fatal if missing)
/// 2. Fetch every source, appending successful bodies to the raw artifact
/// 3. Deduplicate the raw artifact into the output artifact
/// 4. Remove transient files, if configured
///
/// Per-source fetch failures are recorded in the report and never fail the run.
#[instrument(skip_all, fields(seed = %config.seed_file.display()))]
pub async fn run(
    config: &PipelineConfig,
    fetcher: &Fetcher,
    progress: &dyn ProgressReporter,
) -> Result<RunReport> {
    let start = Instant::now();
    config.validate()?;

    // --- Init → SourcesLoaded ---
    enter(progress, PipelineState::Init);
    let sources = sources::load_sources(&config.seed_file)?;
    enter(progress, PipelineState::SourcesLoaded);

    if sources.is_empty() {
        info!("nothing to process: source list is empty");
        let report = RunReport {
            sources: 0,
            fetch: FetchStats::default(),
            dedup: None,
            raw_file: None,
            output_file: None,
            cleanup: CleanupOutcome::Disabled,
            nothing_to_process: true,
            elapsed_ms: start.elapsed().as_millis(),
        };
        enter(progress, PipelineState::Done);
        progress.done(&report);
        return Ok(report);
    }

    // --- Fetching → RawWritten ---
    enter(progress, PipelineState::Fetching);
    let mut writer = AggregateWriter::create(&config.raw_file)?;
    let total = sources.len();

    let fetch_stats = fetcher
        .fetch_ordered(&sources, |index, result: FetchResult| {
            progress.source_fetched(result.url().as_str(), result.is_success(), index + 1, total);
            writer.append_result(&result).map(|_| ())
        })
        .await?;

    let raw = writer.finish()?;
    enter(progress, PipelineState::RawWritten);

    // --- RawWritten → Deduplicated ---
    let dedup_progress = PipelineDedupProgress { inner: progress };
    let dedup_stats = dedup::dedup_file(
        &raw.path,
        &config.output_file,
        config.progress_interval,
        &dedup_progress,
    )?;
    enter(progress, PipelineState::Deduplicated);

    // --- Deduplicated → CleanedUp → Done ---
    let cleanup = if config.cleanup_seed {
        remove_transient(&config.seed_file)
    } else {
        CleanupOutcome::Disabled
    };
    enter(progress, PipelineState::CleanedUp);

    let report = RunReport {
        sources: total,
        fetch: fetch_stats,
        dedup: Some(dedup_stats),
        raw_file: Some(raw.path),
        output_file: Some(config.output_file.clone()),
        cleanup,
        nothing_to_process: false,
        elapsed_ms: start.elapsed().as_millis(),
    };

    enter(progress, PipelineState::Done);
    progress.done(&report);

    info!(
        sources = report.sources,
        fetched = report.fetch.succeeded,
        failed = report.fetch.failed(),
        kept = dedup_stats.kept,
        duplicates = dedup_stats.duplicates,
        elapsed_ms = report.elapsed_ms,
        "pipeline complete"
    );

    Ok(report)
}

fn enter(progress: &dyn ProgressReporter, state: PipelineState) {
    debug!(?state, "pipeline state");
    progress.phase(state);
}

/// Remove a transient file. Absence is not an error; other failures are
/// logged and reported, never raised.
pub fn remove_transient(path: &Path) -> CleanupOutcome {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed transient file");
            CleanupOutcome::Removed {
                path: path.to_path_buf(),
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "transient file already absent");
            CleanupOutcome::AlreadyAbsent {
                path: path.to_path_buf(),
            }
        }
        Err(e) => {
            let err = TrackerMergeError::Cleanup {
                path: path.to_path_buf(),
                source: e,
            };
            warn!(error = %err, "cleanup failed");
            CleanupOutcome::Failed {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod pipeline_tests {
    use std::sync::Mutex;

    use super::*;
    use trackermerge_shared::{AppConfig, FetchSettings, Phase};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingProgress {
        states: Mutex<Vec<PipelineState>>,
        fetched: Mutex<Vec<(usize, bool)>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, state: PipelineState) {
            self.states.lock().unwrap().push(state);
        }
        fn source_fetched(&self, _url: &str, succeeded: bool, current: usize, _total: usize) {
            self.fetched.lock().unwrap().push((current, succeeded));
        }
        fn lines_processed(&self, _lines: u64) {}
        fn done(&self, _report: &RunReport) {}
    }

    fn config_in(dir: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::from(&AppConfig::default());
        config.seed_file = dir.join("main_url.txt");
        config.raw_file = dir.join("trackers.txt");
        config.output_file = dir.join("output_trackers.txt");
        config
    }

    fn fetcher() -> Fetcher {
        Fetcher::new(FetchSettings::default()).unwrap()
    }

    async fn mount(server: &MockServer, route: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    fn write_seed(config: &PipelineConfig, server: &MockServer, routes: &[&str]) {
        let seed: String = routes
            .iter()
            .map(|r| format!("{}{r}\n", server.uri()))
            .collect();
        std::fs::write(&config.seed_file, seed).unwrap();
    }

    #[tokio::test]
    async fn merges_and_deduplicates_two_sources() {
        let server = MockServer::start().await;
        mount(&server, "/a/tr.txt", 200, "udp://x:80\nudp://y:80\n").await;
        mount(&server, "/b/tr.txt", 200, "udp://y:80\nudp://z:80\n").await;

        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        write_seed(&config, &server, &["/a/tr.txt", "/b/tr.txt"]);

        let report = run(&config, &fetcher(), &SilentProgress).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&config.raw_file).unwrap(),
            "udp://x:80\nudp://y:80\nudp://y:80\nudp://z:80\n"
        );
        assert_eq!(
            std::fs::read_to_string(&config.output_file).unwrap(),
            "udp://x:80\n\nudp://y:80\n\nudp://z:80\n"
        );
        assert_eq!(report.sources, 2);
        assert_eq!(report.fetch.succeeded, 2);
        assert_eq!(report.dedup.unwrap().kept, 3);
        assert!(!report.nothing_to_process);
        assert_eq!(report.cleanup, CleanupOutcome::Disabled);
    }

    #[tokio::test]
    async fn failing_source_is_isolated() {
        let server = MockServer::start().await;
        mount(&server, "/a", 200, "udp://a:80\n").await;
        mount(&server, "/broken", 404, "").await;
        mount(&server, "/c", 200, "udp://c:80").await;

        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        write_seed(&config, &server, &["/a", "/broken", "/c"]);

        let progress = RecordingProgress::default();
        let report = run(&config, &fetcher(), &progress).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&config.raw_file).unwrap(),
            "udp://a:80\nudp://c:80\n"
        );
        assert_eq!(report.fetch.succeeded, 2);
        assert_eq!(report.fetch.failed(), 1);
        assert!(report.fetch.failures[0].url.ends_with("/broken"));
        assert_eq!(
            *progress.fetched.lock().unwrap(),
            vec![(1, true), (2, false), (3, true)]
        );
    }

    #[tokio::test]
    async fn missing_seed_aborts_before_fetching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let err = run(&config, &fetcher(), &SilentProgress).await.unwrap_err();

        assert!(matches!(err, TrackerMergeError::SourceList { .. }));
        assert!(!config.raw_file.exists());
        assert!(!config.output_file.exists());
    }

    #[tokio::test]
    async fn empty_source_list_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        std::fs::write(&config.seed_file, "\n   \n").unwrap();

        let progress = RecordingProgress::default();
        let report = run(&config, &fetcher(), &progress).await.unwrap();

        assert!(report.nothing_to_process);
        assert!(report.dedup.is_none());
        assert!(!config.raw_file.exists());
        assert!(!config.output_file.exists());
        assert_eq!(
            *progress.states.lock().unwrap(),
            vec![
                PipelineState::Init,
                PipelineState::SourcesLoaded,
                PipelineState::Done
            ]
        );
    }

    #[tokio::test]
    async fn states_are_entered_in_order() {
        let server = MockServer::start().await;
        mount(&server, "/a", 200, "udp://a:80\n").await;

        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        write_seed(&config, &server, &["/a"]);

        let progress = RecordingProgress::default();
        run(&config, &fetcher(), &progress).await.unwrap();

        let states = progress.states.lock().unwrap().clone();
        assert_eq!(
            states,
            vec![
                PipelineState::Init,
                PipelineState::SourcesLoaded,
                PipelineState::Fetching,
                PipelineState::RawWritten,
                PipelineState::Deduplicated,
                PipelineState::CleanedUp,
                PipelineState::Done,
            ]
        );
        assert!(states.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn rerun_replaces_previous_artifacts() {
        let server = MockServer::start().await;
        mount(&server, "/a", 200, "udp://a:80\nudp://b:80\n").await;

        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        write_seed(&config, &server, &["/a"]);
        std::fs::write(&config.raw_file, "udp://stale:80\n").unwrap();

        run(&config, &fetcher(), &SilentProgress).await.unwrap();
        let raw_first = std::fs::read_to_string(&config.raw_file).unwrap();
        let out_first = std::fs::read_to_string(&config.output_file).unwrap();

        run(&config, &fetcher(), &SilentProgress).await.unwrap();
        assert_eq!(std::fs::read_to_string(&config.raw_file).unwrap(), raw_first);
        assert_eq!(std::fs::read_to_string(&config.output_file).unwrap(), out_first);
        assert_eq!(raw_first, "udp://a:80\nudp://b:80\n");
    }

    #[tokio::test]
    async fn cleanup_removes_seed_file() {
        let server = MockServer::start().await;
        mount(&server, "/a", 200, "udp://a:80\n").await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.cleanup_seed = true;
        write_seed(&config, &server, &["/a"]);

        let report = run(&config, &fetcher(), &SilentProgress).await.unwrap();

        assert!(!config.seed_file.exists());
        assert_eq!(
            report.cleanup,
            CleanupOutcome::Removed {
                path: config.seed_file.clone()
            }
        );
        assert!(config.output_file.exists());
    }

    #[tokio::test]
    async fn seed_doubling_as_output_is_rejected_before_cleanup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("udp://a:80\n"))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.output_file = dir.path().join("list.txt");
        config.seed_file = dir.path().join("list.txt");
        config.cleanup_seed = true;
        write_seed(&config, &server, &["/a"]);
        let seed = std::fs::read_to_string(&config.seed_file).unwrap();

        let err = run(&config, &fetcher(), &SilentProgress).await.unwrap_err();

        assert!(matches!(err, TrackerMergeError::Config { .. }));
        assert_eq!(std::fs::read_to_string(&config.seed_file).unwrap(), seed);
        assert!(!config.raw_file.exists());
    }

    #[test]
    fn removing_absent_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main_url.txt");
        assert_eq!(
            remove_transient(&path),
            CleanupOutcome::AlreadyAbsent { path }
        );
    }

    #[test]
    fn cleanup_failure_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        // Removing a directory with remove_file fails with something other than NotFound.
        let outcome = remove_transient(dir.path());
        assert!(matches!(outcome, CleanupOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn unwritable_raw_artifact_fails_fetch_phase() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        write_seed(&config, &server, &["/a"]);
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        config.raw_file = blocker.join("trackers.txt");

        let err = run(&config, &fetcher(), &SilentProgress).await.unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Fetch));
        assert!(!config.output_file.exists());
    }

    #[test]
    fn report_serializes_to_json() {
        let report = RunReport {
            sources: 1,
            fetch: FetchStats::default(),
            dedup: Some(DedupStats::default()),
            raw_file: Some(PathBuf::from("trackers.txt")),
            output_file: Some(PathBuf::from("output_trackers.txt")),
            cleanup: CleanupOutcome::Disabled,
            nothing_to_process: false,
            elapsed_ms: 12,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["cleanup"]["status"], "disabled");
        assert_eq!(json["output_file"], "output_trackers.txt");
    }
}
