//! Parent/child retriever orchestrator.
//!
//! The [`ParentChildRetriever`] searches small child fragments for precision
//! and returns the full parent documents they were cut from, so consumers
//! always receive complete context rather than isolated snippets.
//!
//! # Example
//!
//! ```rust,ignore
//! use cogquery_rag::{Document, HashingEmbeddingProvider, ParentChildRetriever};
//!
//! let retriever = ParentChildRetriever::builder()
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
//!     .build()?;
//!
//! retriever.ingest(&[Document::new("a.txt", "The sky is blue.")], 20, 5).await?;
//! let documents = retriever.retrieve("sky color").await?;
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::RetrieverConfig;
use crate::document::{Document, Fragment, FragmentHit, SOURCE_KEY};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::fragment_index::FragmentIndex;
use crate::persistence::IndexPersistence;
use crate::splitting::SplitSettings;
use crate::state::IndexState;

/// Lifecycle of a retriever: queries are only answered once `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverStatus {
    /// Nothing has been ingested or restored yet.
    Uninitialized,
    /// An index is loaded and can be queried.
    Ready,
}

/// Counts reported by [`ParentChildRetriever::ingest`] and
/// [`ParentChildRetriever::rebuild_index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResult {
    /// Distinct document ids written to the document store.
    pub documents: usize,
    /// Fragments written to the fragment index.
    pub fragments: usize,
}

/// Result of [`ParentChildRetriever::restore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Persisted state was loaded and the retriever is ready.
    Restored {
        /// Documents loaded.
        documents: usize,
        /// Fragments loaded.
        fragments: usize,
    },
    /// No persisted state exists; the retriever is unchanged.
    NotFound,
}

/// Diagnostic counters for an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub status: RetrieverStatus,
    pub documents: usize,
    pub fragments: usize,
    /// Fragments whose parent document is missing.
    pub orphan_fragments: usize,
    pub dimensions: usize,
}

struct Inner {
    status: RetrieverStatus,
    state: IndexState,
}

/// The parent/child retriever.
///
/// Owns the fragment index and the document store exclusively; consumers
/// interact only through [`ingest`](Self::ingest) and
/// [`retrieve`](Self::retrieve). Construct one via
/// [`ParentChildRetriever::builder()`].
pub struct ParentChildRetriever {
    config: RetrieverConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    inner: RwLock<Inner>,
}

impl ParentChildRetriever {
    /// Create a new [`ParentChildRetrieverBuilder`].
    pub fn builder() -> ParentChildRetrieverBuilder {
        ParentChildRetrieverBuilder::default()
    }

    /// Return a reference to the retriever configuration.
    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Current lifecycle state.
    pub async fn status(&self) -> RetrieverStatus {
        self.inner.read().await.status
    }

    /// Split, store, and index documents.
    ///
    /// Each document is cut into windows of `fragment_size` characters
    /// advancing by `fragment_size - fragment_overlap` (or by the configured
    /// split strategy), stored under its id (replacing any previous version),
    /// and its fragments are embedded and indexed in one batch. Fragments of
    /// a replaced version stay in the index until
    /// [`rebuild_index`](Self::rebuild_index). The sizes are remembered for
    /// that rebuild and persisted with the index.
    ///
    /// An empty `documents` slice returns zero counts and changes nothing.
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] if the sizes are inconsistent
    /// - [`RagError::EmbeddingError`] if embedding fails; the document store
    ///   puts of this call are rolled back and the status is unchanged
    pub async fn ingest(
        &self,
        documents: &[Document],
        fragment_size: usize,
        fragment_overlap: usize,
    ) -> Result<IngestResult> {
        let started = Instant::now();
        let settings = SplitSettings {
            strategy: self.config.split_strategy,
            fragment_size,
            fragment_overlap,
        };
        let splitter = settings.splitter()?;

        if documents.is_empty() {
            warn!("ingest called with no documents");
            return Ok(IngestResult::default());
        }

        // 1. Stage documents and their fragments in memory
        let mut staged = Vec::with_capacity(documents.len());
        let mut fragments: Vec<Fragment> = Vec::new();
        for document in documents {
            let document = with_source(document.clone());
            fragments.extend(splitter.split(&document));
            staged.push(document);
        }
        let fragment_count = fragments.len();

        let mut inner = self.inner.write().await;

        // 2. Store parents, remembering what each put replaced
        let mut replaced = Vec::with_capacity(staged.len());
        for document in staged {
            let id = document.id.clone();
            let previous = inner.state.documents.put(id.clone(), document);
            replaced.push((id, previous));
        }

        // 3. Embed and index all fragments in one batch
        let added = inner.state.fragments.add(self.embedding_provider.as_ref(), fragments).await;
        if let Err(e) = added {
            // reverse order restores the oldest version when an id repeats
            for (id, previous) in replaced.into_iter().rev() {
                match previous {
                    Some(document) => {
                        inner.state.documents.put(id, document);
                    }
                    None => {
                        inner.state.documents.remove(&id);
                    }
                }
            }
            error!(error = %e, documents = documents.len(), "ingest failed, rolled back");
            return Err(e);
        }

        // 4. Ready for queries
        inner.status = RetrieverStatus::Ready;
        inner.state.split = Some(settings);

        let distinct: HashSet<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        let result = IngestResult { documents: distinct.len(), fragments: fragment_count };
        info!(
            documents = result.documents,
            fragments = result.fragments,
            total_documents = inner.state.documents.len(),
            total_fragments = inner.state.fragments.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingested documents"
        );
        Ok(result)
    }

    /// Retrieve parent documents for `query` using the configured
    /// `top_k_fragments`.
    ///
    /// # Errors
    ///
    /// See [`retrieve_with_top_k`](Self::retrieve_with_top_k).
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        self.retrieve_with_top_k(query, self.config.top_k_fragments).await
    }

    /// Search `top_k_fragments` fragments and return their distinct parents.
    ///
    /// Parents are ordered by their best-ranked fragment. Fragments whose
    /// parent is missing from the store are skipped. The result may hold
    /// fewer documents than fragments searched, or none.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotReady`] before any ingest or restore
    /// - [`RagError::EmbeddingError`] if the query cannot be embedded
    pub async fn retrieve_with_top_k(
        &self,
        query: &str,
        top_k_fragments: usize,
    ) -> Result<Vec<Document>> {
        let started = Instant::now();
        let inner = self.inner.read().await;
        if inner.status != RetrieverStatus::Ready {
            warn!("retrieve called before the index was built");
            return Err(RagError::NotReady);
        }

        let hits = self.search(&inner.state, query, top_k_fragments).await?;

        let mut seen = HashSet::new();
        let mut documents = Vec::new();
        for hit in &hits {
            if !seen.insert(hit.parent_id.as_str()) {
                continue;
            }
            match inner.state.documents.get(&hit.parent_id) {
                Some(document) => documents.push(document.clone()),
                None => debug!(
                    parent_id = %hit.parent_id,
                    fragment_id = %hit.fragment_id,
                    "skipping orphan fragment"
                ),
            }
        }

        info!(
            fragment_hits = hits.len(),
            document_count = documents.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieve completed"
        );
        Ok(documents)
    }

    /// The raw fragment hits behind a retrieval, closest first.
    ///
    /// # Errors
    ///
    /// Same as [`retrieve_with_top_k`](Self::retrieve_with_top_k).
    pub async fn retrieve_hits(
        &self,
        query: &str,
        top_k_fragments: usize,
    ) -> Result<Vec<FragmentHit>> {
        let inner = self.inner.read().await;
        if inner.status != RetrieverStatus::Ready {
            return Err(RagError::NotReady);
        }
        self.search(&inner.state, query, top_k_fragments).await
    }

    async fn search(
        &self,
        state: &IndexState,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<FragmentHit>> {
        let hits = state
            .fragments
            .search(self.embedding_provider.as_ref(), query, top_k)
            .await
            .map_err(|e| {
                error!(error = %e, "fragment search failed");
                e
            })?;

        Ok(match self.config.max_distance {
            Some(max) => hits.into_iter().filter(|hit| hit.distance <= max).collect(),
            None => hits,
        })
    }

    /// Re-split every stored document and replace the whole fragment index.
    ///
    /// The strategy and sizes of the last ingest are reused, so the index
    /// keeps its granularity; the configured ones apply only when the index
    /// does not record any. This drops fragments left behind by re-ingesting
    /// an id. The new index is built aside and swapped in only once every
    /// fragment is embedded.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotReady`] before any ingest or restore
    /// - [`RagError::EmbeddingError`] if embedding fails; the old index is kept
    pub async fn rebuild_index(&self) -> Result<IngestResult> {
        let started = Instant::now();
        let mut inner = self.inner.write().await;
        if inner.status != RetrieverStatus::Ready {
            return Err(RagError::NotReady);
        }

        let configured = self.config.split_settings();
        let settings = inner.state.split.unwrap_or(configured);
        if settings != configured {
            info!(?settings, ?configured, "rebuilding with the settings the index was built with");
        }
        let splitter = settings.splitter()?;

        let fragments: Vec<Fragment> = inner
            .state
            .documents
            .iter()
            .flat_map(|(_, document)| splitter.split(document))
            .collect();
        let fragment_count = fragments.len();

        let mut rebuilt = FragmentIndex::new(self.embedding_provider.dimensions());
        rebuilt.add(self.embedding_provider.as_ref(), fragments).await.map_err(|e| {
            error!(error = %e, "rebuild failed, keeping previous index");
            e
        })?;

        let previous = inner.state.fragments.len();
        inner.state.fragments = rebuilt;
        inner.state.split = Some(settings);

        let result =
            IngestResult { documents: inner.state.documents.len(), fragments: fragment_count };
        info!(
            documents = result.documents,
            fragments = result.fragments,
            previous_fragments = previous,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rebuilt fragment index"
        );
        Ok(result)
    }

    /// Ids of every stored document, sorted.
    pub async fn document_ids(&self) -> Vec<String> {
        self.inner.read().await.state.documents.get_all_ids()
    }

    /// Look up one stored document by id.
    pub async fn document(&self, id: &str) -> Option<Document> {
        self.inner.read().await.state.documents.get(id).cloned()
    }

    /// Counters describing the current index.
    pub async fn stats(&self) -> IndexStats {
        let inner = self.inner.read().await;
        IndexStats {
            status: inner.status,
            documents: inner.state.documents.len(),
            fragments: inner.state.fragments.len(),
            orphan_fragments: inner.state.orphan_fragment_count(),
            dimensions: inner.state.fragments.dimensions(),
        }
    }

    /// Persist the current index.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotReady`] if there is nothing to save
    /// - any persistence error from [`IndexPersistence::save`]
    pub async fn save(&self, persistence: &IndexPersistence) -> Result<()> {
        let started = Instant::now();
        let inner = self.inner.read().await;
        if inner.status != RetrieverStatus::Ready {
            return Err(RagError::NotReady);
        }
        persistence.save(&inner.state)?;
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "save completed");
        Ok(())
    }

    /// Replace the in-memory index with persisted state, if any exists.
    ///
    /// # Errors
    ///
    /// Any error from [`IndexPersistence::load`]; the retriever is unchanged.
    pub async fn restore(&self, persistence: &IndexPersistence) -> Result<RestoreOutcome> {
        let started = Instant::now();
        let mut inner = self.inner.write().await;
        let Some(state) = persistence.load(self.embedding_provider.dimensions())? else {
            return Ok(RestoreOutcome::NotFound);
        };

        let outcome = RestoreOutcome::Restored {
            documents: state.documents.len(),
            fragments: state.fragments.len(),
        };
        inner.state = state;
        inner.status = RetrieverStatus::Ready;
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "restored index");
        Ok(outcome)
    }
}

fn with_source(mut document: Document) -> Document {
    if !document.metadata.contains_key(SOURCE_KEY) {
        debug!(document.id = %document.id, "document has no source, using its id");
        document.metadata.insert(SOURCE_KEY.to_string(), document.id.clone());
    }
    document
}

/// Builder for constructing a [`ParentChildRetriever`].
///
/// The embedding provider is required; the configuration defaults to
/// [`RetrieverConfig::default()`].
///
/// # Example
///
/// ```rust,ignore
/// let retriever = ParentChildRetriever::builder()
///     .config(RetrieverConfig::builder().top_k_fragments(8).build()?)
///     .embedding_provider(Arc::new(embedder))
///     .build()?;
/// ```
#[derive(Default)]
pub struct ParentChildRetrieverBuilder {
    config: Option<RetrieverConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    state: Option<IndexState>,
}

impl ParentChildRetrieverBuilder {
    /// Set the retriever configuration.
    pub fn config(mut self, config: RetrieverConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Start from an existing index state; the retriever is then ready.
    pub fn index_state(mut self, state: IndexState) -> Self {
        self.state = Some(state);
        self
    }

    /// Build the [`ParentChildRetriever`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the embedding provider is missing,
    /// the configuration is invalid, or a supplied index state has a
    /// different dimensionality than the provider.
    pub fn build(self) -> Result<ParentChildRetriever> {
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let dimensions = embedding_provider.dimensions();
        let inner = match self.state {
            Some(state) => {
                if state.fragments.dimensions() != dimensions {
                    return Err(RagError::ConfigError(format!(
                        "index state has {} dimensions, embedding provider has {dimensions}",
                        state.fragments.dimensions()
                    )));
                }
                Inner { status: RetrieverStatus::Ready, state }
            }
            None => Inner {
                status: RetrieverStatus::Uninitialized,
                state: IndexState::new(dimensions),
            },
        };

        Ok(ParentChildRetriever { config, embedding_provider, inner: RwLock::new(inner) })
    }
}
