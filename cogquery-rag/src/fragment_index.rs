//! Flat Euclidean-distance index over child fragments.
//!
//! [`FragmentIndex`] keeps fragments in insertion order and answers queries
//! with an exhaustive L2 scan. Insertion order doubles as the tie-break for
//! equal distances, which keeps search results reproducible across a
//! save/load cycle.

use tracing::debug;

use crate::document::{Fragment, FragmentHit};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// An in-memory, exhaustively searched index of embedded [`Fragment`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentIndex {
    dimensions: usize,
    fragments: Vec<Fragment>,
}

/// Euclidean distance between two vectors of equal length.
fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

impl FragmentIndex {
    /// Create an empty index for embeddings of the given dimensionality.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, fragments: Vec::new() }
    }

    /// Rebuild an index from already-embedded fragments, in search tie-break order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if any fragment is missing an
    /// embedding or has the wrong dimensionality.
    pub fn from_fragments(dimensions: usize, fragments: Vec<Fragment>) -> Result<Self> {
        let index = Self { dimensions, fragments };
        for fragment in &index.fragments {
            index.check_dimensions(fragment)?;
        }
        Ok(index)
    }

    /// Dimensionality every stored embedding has.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of stored fragments.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Whether the index holds no fragments.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Stored fragments in insertion order.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    fn check_dimensions(&self, fragment: &Fragment) -> Result<()> {
        if fragment.embedding.len() != self.dimensions {
            return Err(RagError::embedding(
                "FragmentIndex",
                format!(
                    "fragment '{}' has {} dimensions, index expects {}",
                    fragment.id,
                    fragment.embedding.len(),
                    self.dimensions
                ),
            ));
        }
        Ok(())
    }

    /// Embed any fragments that lack an embedding, then insert all of them.
    ///
    /// Either every fragment of the call is inserted or none is: embeddings
    /// are computed and validated before the index is touched.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the provider fails, returns
    /// the wrong number of vectors, or returns vectors of the wrong size.
    pub async fn add(
        &mut self,
        provider: &dyn EmbeddingProvider,
        mut fragments: Vec<Fragment>,
    ) -> Result<usize> {
        if fragments.is_empty() {
            return Ok(0);
        }

        let pending: Vec<usize> = fragments
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_embedded())
            .map(|(i, _)| i)
            .collect();

        if !pending.is_empty() {
            let texts: Vec<&str> = pending.iter().map(|&i| fragments[i].text.as_str()).collect();
            let embeddings = provider.embed_batch(&texts).await?;
            if embeddings.len() != pending.len() {
                return Err(RagError::embedding(
                    provider.name(),
                    format!("returned {} embeddings for {} texts", embeddings.len(), pending.len()),
                ));
            }
            for (i, embedding) in pending.into_iter().zip(embeddings) {
                fragments[i].embedding = embedding;
            }
        }

        for fragment in &fragments {
            self.check_dimensions(fragment)?;
        }

        let added = fragments.len();
        self.fragments.extend(fragments);
        debug!(added, total = self.fragments.len(), "fragments added to index");
        Ok(added)
    }

    /// Return up to `top_k` fragments nearest to `query_text`, closest first.
    ///
    /// An empty index or `top_k == 0` yields an empty list without calling
    /// the provider.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the query cannot be embedded.
    pub async fn search(
        &self,
        provider: &dyn EmbeddingProvider,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<FragmentHit>> {
        if self.fragments.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query = provider.embed(query_text).await?;
        if query.len() != self.dimensions {
            return Err(RagError::embedding(
                provider.name(),
                format!(
                    "query embedding has {} dimensions, index expects {}",
                    query.len(),
                    self.dimensions
                ),
            ));
        }

        let mut scored: Vec<(usize, f32)> = self
            .fragments
            .iter()
            .enumerate()
            .map(|(i, fragment)| (i, euclidean_distance(&fragment.embedding, &query)))
            .collect();

        // stable: equal distances keep insertion order
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(i, distance)| {
                let fragment = &self.fragments[i];
                FragmentHit {
                    fragment_id: fragment.id.clone(),
                    parent_id: fragment.parent_id.clone(),
                    distance,
                }
            })
            .collect())
    }
}
