//! Key-value store of full parent documents.

use std::collections::BTreeMap;

use crate::document::Document;

/// Maps document ids to the full [`Document`]s fragments were cut from.
///
/// Inserting an existing id replaces the stored document; there is no merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentStore {
    documents: BTreeMap<String, Document>,
}

impl DocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document, returning the one it replaced.
    pub fn put(&mut self, id: impl Into<String>, document: Document) -> Option<Document> {
        self.documents.insert(id.into(), document)
    }

    /// Look up a document; `None` is the not-found signal.
    pub fn get(&self, id: &str) -> Option<&Document> {
        self.documents.get(id)
    }

    /// Remove a document, returning it if it was present.
    pub fn remove(&mut self, id: &str) -> Option<Document> {
        self.documents.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    /// All stored ids in sorted order.
    pub fn get_all_ids(&self) -> Vec<String> {
        self.documents.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Iterate over `(id, document)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Document)> {
        self.documents.iter()
    }
}

impl FromIterator<(String, Document)> for DocumentStore {
    fn from_iter<I: IntoIterator<Item = (String, Document)>>(iter: I) -> Self {
        Self { documents: iter.into_iter().collect() }
    }
}
