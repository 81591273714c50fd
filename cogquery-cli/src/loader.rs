//! Plain-text document loader.
//!
//! Turns files on disk into [`Document`]s: one document per file, keyed by
//! file name. Directories are read one level deep. Files that cannot be read
//! are reported and skipped so one bad file never aborts a batch.

use std::fs;
use std::path::{Path, PathBuf};

use cogquery_rag::Document;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Metadata key holding the path a document was read from.
pub const PATH_KEY: &str = "path";

/// Extensions the loader reads, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["txt", "md", "markdown", "text", "csv", "log"];

/// Outcome of [`load_paths`].
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    /// Files with an unsupported extension.
    pub skipped: Vec<PathBuf>,
    /// Files or directories that could not be read.
    pub failed: Vec<(PathBuf, String)>,
}

/// Whether `path` has one of the [`SUPPORTED_EXTENSIONS`].
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(ext)))
}

/// Load every supported file named by `paths`, expanding directories.
pub fn load_paths(paths: &[PathBuf]) -> LoadReport {
    let mut report = LoadReport::default();
    for path in paths {
        if path.is_dir() {
            load_dir(path, &mut report);
        } else {
            load_file(path, &mut report);
        }
    }
    info!(
        loaded = report.documents.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "loaded documents"
    );
    report
}

fn load_dir(dir: &Path, report: &mut LoadReport) {
    let entries =
        WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true).sort_by_file_name();
    for entry in entries {
        match entry {
            Ok(entry) if entry.file_type().is_file() => load_file(entry.path(), report),
            Ok(entry) => {
                debug!(path = %entry.path().display(), "not descending into subdirectory");
            }
            Err(e) => {
                let path = e.path().unwrap_or(dir).to_path_buf();
                warn!(path = %path.display(), error = %e, "failed to read directory entry");
                report.failed.push((path, e.to_string()));
            }
        }
    }
}

fn load_file(path: &Path, report: &mut LoadReport) {
    if !is_supported(path) {
        warn!(path = %path.display(), "skipping unsupported file type");
        report.skipped.push(path.to_path_buf());
        return;
    }

    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        report.failed.push((path.to_path_buf(), "path has no file name".to_string()));
        return;
    };

    match fs::read_to_string(path) {
        Ok(content) => {
            debug!(path = %path.display(), chars = content.chars().count(), "read document");
            let document =
                Document::new(name, content).with_metadata(PATH_KEY, path.display().to_string());
            report.documents.push(document);
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read file, skipping");
            report.failed.push((path.to_path_buf(), e.to_string()));
        }
    }
}
