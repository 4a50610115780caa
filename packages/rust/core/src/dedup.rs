//! Streaming, order-preserving deduplication of tracker entries.
//!
//! Each distinct trimmed, non-blank line is written once, in order of first
//! appearance. Consecutive kept entries are separated by exactly one blank
//! line; the output never starts or ends with a blank line.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info, instrument};

use trackermerge_shared::{DedupStats, Phase, Result, TrackerMergeError, same_location};

// ---------------------------------------------------------------------------
// Separator policy
// ---------------------------------------------------------------------------

/// Drives blank-line separators between kept entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SeparatorState {
    /// Nothing has been emitted yet.
    #[default]
    AwaitingFirstEntry,
    /// At least one entry has been emitted.
    AfterEntry,
}

impl SeparatorState {
    /// Advance past a kept entry. Returns whether a separator must be written
    /// before it.
    pub fn on_entry(&mut self) -> bool {
        let separate = *self == SeparatorState::AfterEntry;
        *self = SeparatorState::AfterEntry;
        separate
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Receives periodic line counts during a dedup pass.
pub trait DedupProgress {
    /// Called every `progress_interval` input lines with the running total.
    fn lines_processed(&self, lines: u64);
}

/// Progress sink that discards every update.
pub struct NoDedupProgress;

impl DedupProgress for NoDedupProgress {
    fn lines_processed(&self, _lines: u64) {}
}

// ---------------------------------------------------------------------------
// Deduplicator
// ---------------------------------------------------------------------------

/// Line-at-a-time deduplicator. The seen set lives for one pass only.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
    separator: SeparatorState,
    stats: DedupStats,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one input line (with or without its terminator).
    pub fn push_line<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<()> {
        self.stats.lines_read += 1;

        let entry = line.trim();
        if entry.is_empty() {
            self.stats.blank += 1;
            return Ok(());
        }
        if self.seen.contains(entry) {
            self.stats.duplicates += 1;
            return Ok(());
        }

        if self.separator.on_entry() {
            out.write_all(b"\n")?;
        }
        out.write_all(entry.as_bytes())?;
        out.write_all(b"\n")?;

        self.seen.insert(entry.to_owned());
        self.stats.kept += 1;
        Ok(())
    }

    pub fn stats(&self) -> DedupStats {
        self.stats
    }
}

/// Deduplicate everything readable from `reader` into `writer`.
///
/// Returns the pass statistics. I/O errors are returned unchanged; use
/// [`dedup_file`] to get artifact-aware errors.
pub fn dedup_stream<R: BufRead, W: Write>(
    reader: R,
    writer: W,
    progress_interval: u64,
    progress: &dyn DedupProgress,
) -> io::Result<DedupStats> {
    run_pass(reader, writer, progress_interval, progress).map_err(|e| match e {
        PassError::Read(e) | PassError::Write(e) => e,
    })
}

/// Deduplicate an in-memory document.
pub fn dedup_str(input: &str) -> String {
    let mut out = Vec::with_capacity(input.len());
    let mut dedup = Deduplicator::new();
    for line in input.lines() {
        // Writing into a Vec cannot fail.
        let _ = dedup.push_line(line, &mut out);
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Deduplicate the raw artifact at `input` into the output artifact at
/// `output`, overwriting it.
///
/// `input` and `output` must name different files, including through `..`
/// components or symlinks.
#[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn dedup_file(
    input: &Path,
    output: &Path,
    progress_interval: u64,
    progress: &dyn DedupProgress,
) -> Result<DedupStats> {
    let reader = File::open(input).map_err(|e| dedup_error(input, e))?;
    if same_location(input, output) {
        return Err(TrackerMergeError::config(format!(
            "dedup input and output must differ (both are {})",
            input.display()
        )));
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| dedup_error(parent, e))?;
    }
    let writer = File::create(output).map_err(|e| dedup_error(output, e))?;

    info!("deduplicating");

    let stats = run_pass(
        BufReader::new(reader),
        BufWriter::new(writer),
        progress_interval,
        progress,
    )
    .map_err(|e| match e {
        PassError::Read(e) => dedup_error(input, e),
        PassError::Write(e) => dedup_error(output, e),
    })?;

    info!(
        lines = stats.lines_read,
        kept = stats.kept,
        duplicates = stats.duplicates,
        "deduplication complete"
    );
    Ok(stats)
}

/// Which side of a pass an I/O error came from.
enum PassError {
    Read(io::Error),
    Write(io::Error),
}

fn run_pass<R: BufRead, W: Write>(
    reader: R,
    mut out: W,
    progress_interval: u64,
    progress: &dyn DedupProgress,
) -> std::result::Result<DedupStats, PassError> {
    let mut lines = LineReader::new(reader);
    let mut dedup = Deduplicator::new();

    while let Some(line) = lines.next_line().map_err(PassError::Read)? {
        dedup.push_line(line, &mut out).map_err(PassError::Write)?;
        report_progress(&dedup, progress_interval, progress);
    }
    out.flush().map_err(PassError::Write)?;

    Ok(dedup.stats())
}

fn report_progress(dedup: &Deduplicator, interval: u64, progress: &dyn DedupProgress) {
    let lines = dedup.stats.lines_read;
    if interval > 0 && lines % interval == 0 {
        debug!(lines, "dedup progress");
        progress.lines_processed(lines);
    }
}

fn dedup_error(path: &Path, e: io::Error) -> TrackerMergeError {
    TrackerMergeError::artifact(Phase::Dedup, path, e)
}

/// Reads newline-terminated lines into a reused buffer, decoding invalid
/// UTF-8 lossily.
struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
    text: String,
}

impl<R: BufRead> LineReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            text: String::new(),
        }
    }

    fn next_line(&mut self) -> io::Result<Option<&str>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        self.text.clear();
        self.text.push_str(&String::from_utf8_lossy(&self.buf));
        Ok(Some(&self.text))
    }
}
