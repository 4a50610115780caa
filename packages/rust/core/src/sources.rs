//! Seed list loading.

use std::path::Path;

use tracing::{debug, info};

use trackermerge_shared::{Result, SourceUrl, TrackerMergeError};

/// Read the seed file at `path` into an ordered list of source URLs.
///
/// Lines are trimmed and blank lines skipped. Duplicates are kept: every
/// listed source is fetched once per run.
pub fn load_sources(path: &Path) -> Result<Vec<SourceUrl>> {
    debug!(path = %path.display(), "reading source list");
    let content =
        std::fs::read_to_string(path).map_err(|e| TrackerMergeError::source_list(path, e))?;

    let sources = parse_sources(&content);
    info!(path = %path.display(), count = sources.len(), "source list loaded");
    Ok(sources)
}

/// Split seed-file text into source URLs.
pub fn parse_sources(content: &str) -> Vec<SourceUrl> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(SourceUrl::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_lines_and_keeps_order() {
        let sources = parse_sources("http://b/tr.txt\n\n   \nhttp://a/tr.txt\r\n  http://c/tr.txt  \n");
        let urls: Vec<&str> = sources.iter().map(SourceUrl::as_str).collect();
        assert_eq!(urls, vec!["http://b/tr.txt", "http://a/tr.txt", "http://c/tr.txt"]);
    }

    #[test]
    fn keeps_duplicate_sources() {
        let sources = parse_sources("http://a/tr.txt\nhttp://a/tr.txt\n");
        assert_eq!(sources.len(), 2);
    }

    #[test]
    fn missing_file_is_source_list_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_sources(&dir.path().join("main_url.txt")).unwrap_err();
        match err {
            TrackerMergeError::SourceList { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected SourceList error, got {other:?}"),
        }
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main_url.txt");
        std::fs::write(&path, "http://a/tr.txt\nhttp://b/tr.txt").unwrap();

        let sources = load_sources(&path).unwrap();
        assert_eq!(sources, vec![SourceUrl::from("http://a/tr.txt"), SourceUrl::from("http://b/tr.txt")]);
    }
}
