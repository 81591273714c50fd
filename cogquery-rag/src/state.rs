//! The fragment index and document store as one consistency unit.

use std::collections::HashSet;

use crate::docstore::DocumentStore;
use crate::fragment_index::FragmentIndex;
use crate::splitting::SplitSettings;

/// Fragment index plus document store, saved and restored together.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexState {
    pub(crate) fragments: FragmentIndex,
    pub(crate) documents: DocumentStore,
    /// Settings of the most recent ingest or rebuild, if known.
    pub(crate) split: Option<SplitSettings>,
}

impl IndexState {
    /// An empty state for embeddings of the given dimensionality.
    pub fn new(dimensions: usize) -> Self {
        Self {
            fragments: FragmentIndex::new(dimensions),
            documents: DocumentStore::new(),
            split: None,
        }
    }

    /// Assemble a state from its two halves.
    pub fn from_parts(fragments: FragmentIndex, documents: DocumentStore) -> Self {
        Self { fragments, documents, split: None }
    }

    /// Record the split settings the fragments were produced with.
    pub fn with_split_settings(mut self, split: Option<SplitSettings>) -> Self {
        self.split = split;
        self
    }

    pub fn split_settings(&self) -> Option<SplitSettings> {
        self.split
    }

    pub fn fragments(&self) -> &FragmentIndex {
        &self.fragments
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    /// Ids of parents that fragments reference but the store lacks, deduplicated.
    pub fn orphan_parent_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.fragments
            .fragments()
            .iter()
            .filter(|f| !self.documents.contains(&f.parent_id))
            .filter(|f| seen.insert(f.parent_id.as_str()))
            .map(|f| f.parent_id.clone())
            .collect()
    }

    /// Number of fragments whose parent is missing from the store.
    pub fn orphan_fragment_count(&self) -> usize {
        self.fragments
            .fragments()
            .iter()
            .filter(|f| !self.documents.contains(&f.parent_id))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Fragment};

    fn embedded(text: &str, parent: &str) -> Fragment {
        let mut fragment = Fragment::new(text, parent);
        fragment.embedding = vec![0.0, 1.0];
        fragment
    }

    #[test]
    fn counts_orphans() {
        let fragments = FragmentIndex::from_fragments(
            2,
            vec![embedded("a", "kept"), embedded("b", "gone"), embedded("c", "gone")],
        )
        .unwrap();
        let documents: DocumentStore =
            [("kept".to_string(), Document::new("kept", "a"))].into_iter().collect();
        let state = IndexState::from_parts(fragments, documents);

        assert_eq!(state.orphan_fragment_count(), 2);
        assert_eq!(state.orphan_parent_ids(), vec!["gone"]);
    }
}
