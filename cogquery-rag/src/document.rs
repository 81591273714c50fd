//! Data types for documents, fragments, and fragment search hits.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata key naming the file a document originated from.
pub const SOURCE_KEY: &str = "source";

/// A full source document: the unit that is stored and returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Identifier of the document, commonly the source file name.
    pub id: String,
    /// The full text content.
    pub content: String,
    /// Key-value metadata; always carries [`SOURCE_KEY`] once ingested.
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document whose `source` metadata is its id.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        let id = id.into();
        let metadata = HashMap::from([(SOURCE_KEY.to_string(), id.clone())]);
        Self { id, content: content.into(), metadata }
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The originating file name, if recorded.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A small slice of a [`Document`]'s content: the searchable unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fragment {
    /// Synthetic identifier, unique across re-ingests.
    pub id: String,
    /// The text of this slice.
    pub text: String,
    /// The ID of the parent [`Document`].
    pub parent_id: String,
    /// The vector embedding; empty until the fragment index embeds it.
    pub embedding: Vec<f32>,
}

impl Fragment {
    /// Create an unembedded fragment with a fresh identifier.
    pub fn new(text: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            parent_id: parent_id.into(),
            embedding: Vec::new(),
        }
    }

    /// Whether an embedding has been attached.
    pub fn is_embedded(&self) -> bool {
        !self.embedding.is_empty()
    }
}

/// A fragment returned by similarity search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FragmentHit {
    /// The matching fragment's identifier.
    pub fragment_id: String,
    /// The parent document of the matching fragment.
    pub parent_id: String,
    /// Euclidean distance to the query embedding (lower is closer).
    pub distance: f32,
}
