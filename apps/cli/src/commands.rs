//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use trackermerge_core::{
    CleanupOutcome, PipelineDedupProgress, PipelineState, ProgressReporter, RunReport,
};
use trackermerge_fetcher::{BootstrapOutcome, Fetcher};
use trackermerge_shared::{
    AppConfig, FetchSettings, PipelineConfig, init_config, init_config_at, load_config,
    load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// trackermerge — merge remote BitTorrent tracker lists into one deduplicated file.
#[derive(Parser)]
#[command(
    name = "trackermerge",
    version,
    about = "Fetch tracker lists from many sources and merge them into one deduplicated list.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.trackermerge/trackermerge.toml.
    #[arg(long, env = "TRACKERMERGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch every source in the seed list and write the deduplicated tracker list.
    Run(RunArgs),

    /// Deduplicate an existing tracker list without fetching anything.
    Dedup {
        /// Raw tracker list to read.
        input: PathBuf,

        /// Where to write the deduplicated list (overwritten).
        output: PathBuf,
    },

    /// Download the seed list if it is not present yet.
    Bootstrap {
        /// Seed file to create.
        #[arg(long)]
        seed: Option<PathBuf>,

        /// URL to download the seed list from.
        #[arg(long)]
        manifest_url: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags for `run`. Each one overrides the config file.
#[derive(Args)]
pub(crate) struct RunArgs {
    /// Seed file listing one source URL per line.
    #[arg(long)]
    pub seed: Option<PathBuf>,

    /// Raw artifact: every fetched body, concatenated.
    #[arg(long)]
    pub raw: Option<PathBuf>,

    /// Output artifact: the deduplicated tracker list.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Maximum simultaneous requests.
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Download the seed list from this URL first if it is missing.
    #[arg(long)]
    pub manifest_url: Option<String>,

    /// Delete the seed file after the output is written.
    #[arg(long)]
    pub cleanup: bool,

    /// Print the run report as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "trackermerge=info",
        1 => "trackermerge=debug",
        _ => "trackermerge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Run(args) => cmd_run(config_path.as_deref(), args).await,
        Command::Dedup { input, output } => cmd_dedup(config_path.as_deref(), &input, &output),
        Command::Bootstrap { seed, manifest_url } => {
            cmd_bootstrap(config_path.as_deref(), seed, manifest_url).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path.as_deref()),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let app = resolve_config(config_path)?;
    let mut config = PipelineConfig::from(&app);

    if let Some(seed) = args.seed {
        config.seed_file = seed;
    }
    if let Some(raw) = args.raw {
        config.raw_file = raw;
    }
    if let Some(out) = args.out {
        config.output_file = out;
    }
    if let Some(concurrency) = args.concurrency {
        config.fetch.concurrency = concurrency;
    }
    if let Some(secs) = args.timeout {
        config.fetch.timeout = Duration::from_secs(secs);
    }
    config.cleanup_seed |= args.cleanup;
    config.validate()?;

    let fetcher = Fetcher::new(config.fetch.clone())?;

    let manifest_url = args.manifest_url.or(app.bootstrap.manifest_url);
    if let Some(url) = manifest_url.as_deref() {
        fetcher.bootstrap_seed_file(url, &config.seed_file).await?;
    }

    info!(
        seed = %config.seed_file.display(),
        output = %config.output_file.display(),
        concurrency = config.fetch.concurrency,
        "merging tracker lists"
    );

    let reporter = CliProgress::new();
    let report = run_pipeline(&config, &fetcher, &reporter).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(())
}

/// Run the pipeline, clearing the spinner if it fails so the error report
/// is not drawn over.
async fn run_pipeline(
    config: &PipelineConfig,
    fetcher: &Fetcher,
    reporter: &CliProgress,
) -> Result<RunReport> {
    let report = trackermerge_core::run(config, fetcher, reporter)
        .await
        .inspect_err(|_| reporter.spinner.finish_and_clear())?;
    Ok(report)
}

fn print_summary(report: &RunReport) {
    println!();
    if report.nothing_to_process {
        println!("  Nothing to process: the source list is empty.");
        println!();
        return;
    }

    println!("  Tracker list merged!");
    println!("  Sources:    {}", report.sources);
    println!("  Fetched:    {}", report.fetch.succeeded);
    println!("  Failed:     {}", report.fetch.failed());
    if let Some(dedup) = &report.dedup {
        println!("  Trackers:   {}", dedup.kept);
        println!("  Duplicates: {}", dedup.duplicates);
    }
    if let Some(path) = &report.output_file {
        println!("  Output:     {}", path.display());
    }
    match &report.cleanup {
        CleanupOutcome::Removed { path } => println!("  Removed:    {}", path.display()),
        CleanupOutcome::Failed { message, .. } => println!("  Cleanup:    {message}"),
        CleanupOutcome::Disabled | CleanupOutcome::AlreadyAbsent { .. } => {}
    }
    println!(
        "  Time:       {:.1}s",
        report.elapsed_ms as f64 / 1000.0
    );

    for failure in &report.fetch.failures {
        println!("    ✗ {} ({})", failure.url, failure.cause);
    }
    println!();
}

fn cmd_dedup(config_path: Option<&Path>, input: &Path, output: &Path) -> Result<()> {
    let app = resolve_config(config_path)?;
    let interval = app.dedup.progress_interval.max(1);

    let reporter = CliProgress::new();
    reporter.spinner.set_message(format!("Deduplicating {}", input.display()));
    let stats = trackermerge_core::dedup_file(
        input,
        output,
        interval,
        &PipelineDedupProgress { inner: &reporter },
    );
    reporter.spinner.finish_and_clear();
    let stats = stats?;

    println!(
        "Kept {} trackers, dropped {} duplicates -> {}",
        stats.kept,
        stats.duplicates,
        output.display()
    );
    Ok(())
}

async fn cmd_bootstrap(
    config_path: Option<&Path>,
    seed: Option<PathBuf>,
    manifest_url: Option<String>,
) -> Result<()> {
    let app = resolve_config(config_path)?;
    let seed = seed.unwrap_or_else(|| PathBuf::from(&app.paths.seed_file));
    let manifest_url = manifest_url
        .or_else(|| app.bootstrap.manifest_url.clone())
        .ok_or_else(|| {
            eyre!("no manifest URL: pass --manifest-url or set bootstrap.manifest_url")
        })?;

    let fetcher = Fetcher::new(FetchSettings::from(&app))?;
    match fetcher.bootstrap_seed_file(&manifest_url, &seed).await? {
        BootstrapOutcome::Skipped => {
            println!("Seed file already present at {}", seed.display());
        }
        BootstrapOutcome::Downloaded { bytes } => {
            println!("Downloaded {bytes} bytes to {}", seed.display());
        }
    }
    Ok(())
}

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(p) => {
            init_config_at(p)?;
            p.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self::with_bar(ProgressBar::new_spinner())
    }

    fn with_bar(spinner: ProgressBar) -> Self {
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid spinner template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, state: PipelineState) {
        self.spinner.set_message(state.to_string());
    }

    fn source_fetched(&self, url: &str, succeeded: bool, current: usize, total: usize) {
        let mark = if succeeded { "✓" } else { "✗" };
        self.spinner
            .set_message(format!("Fetching [{current}/{total}] {mark} {url}"));
    }

    fn lines_processed(&self, lines: u64) {
        self.spinner
            .set_message(format!("Deduplicating: {lines} lines processed"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "trackermerge",
            "run",
            "--seed",
            "seeds.txt",
            "-c",
            "4",
            "--cleanup",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.seed, Some(PathBuf::from("seeds.txt")));
                assert_eq!(args.concurrency, Some(4));
                assert!(args.cleanup);
                assert!(args.json);
                assert!(args.out.is_none());
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn dedup_takes_positional_paths() {
        let cli = Cli::try_parse_from(["trackermerge", "-v", "dedup", "raw.txt", "out.txt"]).unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Dedup { input, output } => {
                assert_eq!(input, PathBuf::from("raw.txt"));
                assert_eq!(output, PathBuf::from("out.txt"));
            }
            _ => panic!("expected dedup command"),
        }
    }

    #[tokio::test]
    async fn failed_run_clears_the_spinner() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::from(&AppConfig::default());
        config.seed_file = dir.path().join("main_url.txt");
        config.raw_file = dir.path().join("trackers.txt");
        config.output_file = dir.path().join("output_trackers.txt");

        let fetcher = Fetcher::new(config.fetch.clone()).unwrap();
        let reporter = CliProgress::with_bar(ProgressBar::hidden());

        assert!(run_pipeline(&config, &fetcher, &reporter).await.is_err());
        assert!(reporter.spinner.is_finished());
    }
}
