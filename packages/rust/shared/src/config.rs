//! Application configuration for trackermerge.
//!
//! User config lives at `~/.trackermerge/trackermerge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerMergeError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "trackermerge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".trackermerge";

/// User-Agent string for outgoing requests.
pub const USER_AGENT: &str = concat!("trackermerge/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Config structs (matching trackermerge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Artifact locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// HTTP fetch policy.
    #[serde(default)]
    pub fetch: FetchPolicyConfig,

    /// Deduplication settings.
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Seed-list bootstrap and cleanup.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Newline-delimited list of source URLs.
    #[serde(default = "default_seed_file")]
    pub seed_file: String,

    /// Concatenation of every fetched body, recreated each run.
    #[serde(default = "default_raw_file")]
    pub raw_file: String,

    /// Deduplicated tracker list.
    #[serde(default = "default_output_file")]
    pub output_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            seed_file: default_seed_file(),
            raw_file: default_raw_file(),
            output_file: default_output_file(),
        }
    }
}

fn default_seed_file() -> String {
    "main_url.txt".into()
}
fn default_raw_file() -> String {
    "trackers.txt".into()
}
fn default_output_file() -> String {
    "output_trackers.txt".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchPolicyConfig {
    /// Whole-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Maximum simultaneous requests. 1 fetches sources one after another.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for FetchPolicyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_concurrency() -> u32 {
    1
}

/// `[dedup]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Report progress every this many input lines.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            progress_interval: default_progress_interval(),
        }
    }
}

fn default_progress_interval() -> u64 {
    1000
}

/// `[bootstrap]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Where to download the seed list from when it is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_url: Option<String>,

    /// Delete the seed file once the output has been written.
    #[serde(default)]
    pub cleanup_seed: bool,
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub concurrency: usize,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.fetch.timeout_secs),
            connect_timeout: Duration::from_secs(config.fetch.connect_timeout_secs),
            concurrency: config.fetch.concurrency as usize,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Runtime pipeline configuration: artifact paths and pass-level knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub seed_file: PathBuf,
    pub raw_file: PathBuf,
    pub output_file: PathBuf,
    pub progress_interval: u64,
    /// Remove the seed file after a successful dedup pass.
    pub cleanup_seed: bool,
    pub fetch: FetchSettings,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            seed_file: PathBuf::from(&config.paths.seed_file),
            raw_file: PathBuf::from(&config.paths.raw_file),
            output_file: PathBuf::from(&config.paths.output_file),
            progress_interval: config.dedup.progress_interval,
            cleanup_seed: config.bootstrap.cleanup_seed,
            fetch: FetchSettings::from(config),
        }
    }
}

impl PipelineConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.concurrency == 0 {
            return Err(TrackerMergeError::config("fetch concurrency must be at least 1"));
        }
        if self.fetch.timeout.is_zero() {
            return Err(TrackerMergeError::config("fetch timeout must be greater than zero"));
        }
        if self.progress_interval == 0 {
            return Err(TrackerMergeError::config(
                "dedup progress_interval must be at least 1",
            ));
        }
        let artifacts = [
            ("seed", &self.seed_file),
            ("raw", &self.raw_file),
            ("output", &self.output_file),
        ];
        for (i, (name_a, a)) in artifacts.iter().enumerate() {
            for (name_b, b) in &artifacts[i + 1..] {
                if same_location(a, b) {
                    return Err(TrackerMergeError::config(format!(
                        "{name_a} and {name_b} files must differ (both are {})",
                        b.display()
                    )));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Path identity
// ---------------------------------------------------------------------------

/// Whether `a` and `b` name the same file once `.` and `..` components,
/// relative paths, and symlinks are resolved. Paths that do not exist yet are
/// resolved through their nearest existing ancestor.
pub fn same_location(a: &Path, b: &Path) -> bool {
    a == b || resolve_location(a) == resolve_location(b)
}

fn resolve_location(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    let normalized = normalize_lexically(&absolute);

    let mut missing = Vec::new();
    let mut existing = normalized.as_path();
    loop {
        if let Ok(canonical) = std::fs::canonicalize(existing) {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return normalized,
        }
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.trackermerge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TrackerMergeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.trackermerge/trackermerge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TrackerMergeError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        TrackerMergeError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the default config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| TrackerMergeError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| TrackerMergeError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| TrackerMergeError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}
