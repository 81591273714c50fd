//! Snapshot and restore of an [`IndexState`] as two JSON artifacts.
//!
//! The fragment index and the document store are written to separate files
//! so each can be loaded on its own. Each file is written to a sibling
//! `.tmp` file, synced, then renamed over the target, so a failed save
//! leaves the previous artifact intact. The document artifact is renamed
//! before the fragment artifact: if the process dies between the two
//! renames, the older fragments on disk still resolve to parents because
//! documents are only ever added or replaced. The pair as a whole is not
//! atomic.
//!
//! No file locking is done; two processes sharing one index directory is
//! unsupported.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::docstore::DocumentStore;
use crate::document::{Document, Fragment};
use crate::error::{RagError, Result};
use crate::fragment_index::FragmentIndex;
use crate::splitting::SplitSettings;
use crate::state::IndexState;

/// Version written into both artifacts; anything else is treated as corrupt.
pub const FORMAT_VERSION: u32 = 1;

/// File name of the fragment artifact inside an index directory.
pub const FRAGMENTS_FILE: &str = "fragments.json";

/// File name of the document artifact inside an index directory.
pub const DOCUMENTS_FILE: &str = "documents.json";

#[derive(Serialize)]
struct FragmentSnapshotRef<'a> {
    format_version: u32,
    saved_at: DateTime<Utc>,
    dimensions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    split: Option<SplitSettings>,
    fragments: &'a [Fragment],
}

#[derive(Deserialize)]
struct FragmentSnapshot {
    format_version: u32,
    saved_at: DateTime<Utc>,
    dimensions: usize,
    #[serde(default)]
    split: Option<SplitSettings>,
    fragments: Vec<Fragment>,
}

#[derive(Serialize)]
struct DocumentSnapshotRef<'a> {
    format_version: u32,
    saved_at: DateTime<Utc>,
    documents: BTreeMap<&'a str, &'a Document>,
}

#[derive(Deserialize)]
struct DocumentSnapshot {
    format_version: u32,
    saved_at: DateTime<Utc>,
    documents: BTreeMap<String, Document>,
}

/// Locations of the two persisted artifacts.
///
/// # Example
///
/// ```rust,ignore
/// use cogquery_rag::IndexPersistence;
///
/// let persistence = IndexPersistence::in_dir("faiss_index_store");
/// persistence.save(&state)?;
/// let restored = persistence.load(384)?; // None on first run
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPersistence {
    fragments_path: PathBuf,
    documents_path: PathBuf,
}

impl IndexPersistence {
    /// Use [`FRAGMENTS_FILE`] and [`DOCUMENTS_FILE`] inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self { fragments_path: dir.join(FRAGMENTS_FILE), documents_path: dir.join(DOCUMENTS_FILE) }
    }

    /// Use explicit artifact paths.
    pub fn with_paths(
        fragments_path: impl Into<PathBuf>,
        documents_path: impl Into<PathBuf>,
    ) -> Self {
        Self { fragments_path: fragments_path.into(), documents_path: documents_path.into() }
    }

    pub fn fragments_path(&self) -> &Path {
        &self.fragments_path
    }

    pub fn documents_path(&self) -> &Path {
        &self.documents_path
    }

    /// Write both artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PersistenceIo`] if a directory, temporary file or
    /// rename fails, and [`RagError::PersistenceCorrupt`] if encoding fails.
    pub fn save(&self, state: &IndexState) -> Result<()> {
        let saved_at = Utc::now();

        let fragments = FragmentSnapshotRef {
            format_version: FORMAT_VERSION,
            saved_at,
            dimensions: state.fragments.dimensions(),
            split: state.split,
            fragments: state.fragments.fragments(),
        };
        let documents = DocumentSnapshotRef {
            format_version: FORMAT_VERSION,
            saved_at,
            documents: state.documents.iter().map(|(id, doc)| (id.as_str(), doc)).collect(),
        };

        let fragment_bytes = encode(&self.fragments_path, &fragments)?;
        let document_bytes = encode(&self.documents_path, &documents)?;

        let fragments_tmp = stage(&self.fragments_path, &fragment_bytes)?;
        let documents_tmp = match stage(&self.documents_path, &document_bytes) {
            Ok(tmp) => tmp,
            Err(e) => {
                let _ = fs::remove_file(&fragments_tmp);
                return Err(e);
            }
        };

        if let Err(e) = commit(&documents_tmp, &self.documents_path) {
            let _ = fs::remove_file(&fragments_tmp);
            let _ = fs::remove_file(&documents_tmp);
            return Err(e);
        }
        commit(&fragments_tmp, &self.fragments_path)?;

        info!(
            documents = state.documents.len(),
            fragments = state.fragments.len(),
            fragments_path = %self.fragments_path.display(),
            documents_path = %self.documents_path.display(),
            "saved index"
        );
        Ok(())
    }

    /// Read both artifacts back into an [`IndexState`].
    ///
    /// Returns `Ok(None)` when either artifact is absent, which is the normal
    /// first-run case.
    ///
    /// # Errors
    ///
    /// - [`RagError::PersistenceCorrupt`] if an artifact exists but cannot be decoded
    /// - [`RagError::IncompatibleIndex`] if the stored dimensionality differs from `dimensions`
    /// - [`RagError::PersistenceIo`] for other read failures
    pub fn load(&self, dimensions: usize) -> Result<Option<IndexState>> {
        let Some(document_bytes) = read_artifact(&self.documents_path)? else {
            info!(path = %self.documents_path.display(), "no persisted document store");
            return Ok(None);
        };
        let Some(fragment_bytes) = read_artifact(&self.fragments_path)? else {
            info!(path = %self.fragments_path.display(), "no persisted fragment index");
            return Ok(None);
        };

        let documents: DocumentSnapshot = decode(&self.documents_path, &document_bytes)?;
        check_version(&self.documents_path, documents.format_version)?;

        let fragments: FragmentSnapshot = decode(&self.fragments_path, &fragment_bytes)?;
        check_version(&self.fragments_path, fragments.format_version)?;

        if fragments.dimensions != dimensions {
            error!(
                expected = dimensions,
                found = fragments.dimensions,
                "embedding dimensions differ"
            );
            return Err(RagError::IncompatibleIndex {
                expected: dimensions,
                found: fragments.dimensions,
            });
        }

        let saved_at = fragments.saved_at.max(documents.saved_at);
        let index = FragmentIndex::from_fragments(fragments.dimensions, fragments.fragments)
            .map_err(|e| corrupt(&self.fragments_path, e.to_string()))?;
        let store: DocumentStore = documents.documents.into_iter().collect();
        let state = IndexState::from_parts(index, store).with_split_settings(fragments.split);

        let orphans = state.orphan_fragment_count();
        if orphans > 0 {
            warn!(orphans, "persisted fragments reference missing documents");
        }

        info!(
            documents = state.documents.len(),
            fragments = state.fragments.len(),
            %saved_at,
            "loaded index"
        );
        Ok(Some(state))
    }
}

fn corrupt(path: &Path, message: impl Into<String>) -> RagError {
    let message = message.into();
    error!(path = %path.display(), %message, "persisted index is corrupt");
    RagError::PersistenceCorrupt { path: path.to_path_buf(), message }
}

fn io_error(path: &Path, source: io::Error) -> RagError {
    RagError::PersistenceIo { path: path.to_path_buf(), source }
}

fn encode<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| RagError::PersistenceCorrupt {
        path: path.to_path_buf(),
        message: format!("failed to encode: {e}"),
    })
}

fn decode<T: for<'de> Deserialize<'de>>(path: &Path, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| corrupt(path, e.to_string()))
}

fn check_version(path: &Path, version: u32) -> Result<()> {
    if version != FORMAT_VERSION {
        return Err(corrupt(path, format!("unsupported format version {version}")));
    }
    Ok(())
}

fn read_artifact(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path, e)),
    }
}

fn tmp_path(path: &Path) -> Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        let message = "artifact path has no file name";
        io_error(path, io::Error::new(io::ErrorKind::InvalidInput, message))
    })?;
    let mut tmp = name.to_os_string();
    tmp.push(".tmp");
    Ok(path.with_file_name(tmp))
}

/// Create the parent directory and write `bytes` next to `path`, synced to
/// disk before the caller renames it into place.
fn stage(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    let tmp = tmp_path(path)?;
    let mut file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
    file.write_all(bytes).and_then(|()| file.sync_all()).map_err(|e| io_error(&tmp, e))?;
    Ok(tmp)
}

fn commit(tmp: &Path, path: &Path) -> Result<()> {
    fs::rename(tmp, path).map_err(|e| io_error(path, e))
}
