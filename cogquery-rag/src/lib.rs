//! Parent/child retrieval core for document question answering.
//!
//! Documents are cut into small fragments that are embedded and searched by
//! vector distance, while the full documents are kept in a separate store.
//! A query matches fragments but returns their distinct parent documents, so
//! consumers get complete context instead of isolated snippets.
//!
//! This crate provides:
//! - [`ParentChildRetriever`]: ingest, retrieve, rebuild, save and restore
//! - [`FragmentIndex`] and [`DocumentStore`]: the two halves of an [`IndexState`]
//! - [`IndexPersistence`]: two-artifact JSON snapshots with atomic replacement
//! - [`EmbeddingProvider`] with an offline [`HashingEmbeddingProvider`] and,
//!   behind the `openai` feature, an OpenAI-compatible provider
//! - [`select_strategy`]: summarization strategy selection by input size

pub mod config;
pub mod docstore;
pub mod document;
pub mod embedding;
pub mod error;
pub mod fragment_index;
pub mod hashing;
pub mod persistence;
pub mod retriever;
pub mod splitting;
pub mod state;
pub mod strategy;

#[cfg(feature = "openai")]
pub mod openai;

pub use config::{RetrieverConfig, RetrieverConfigBuilder};
pub use docstore::DocumentStore;
pub use document::{Document, Fragment, FragmentHit, SOURCE_KEY};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use fragment_index::FragmentIndex;
pub use hashing::HashingEmbeddingProvider;
pub use persistence::IndexPersistence;
pub use retriever::{
    IndexStats, IngestResult, ParentChildRetriever, ParentChildRetrieverBuilder, RestoreOutcome,
    RetrieverStatus,
};
pub use splitting::{RecursiveSplitter, SplitSettings, SplitStrategy, Splitter, WindowSplitter};
pub use state::IndexState;
pub use strategy::{
    DEFAULT_CONTEXT_LIMIT, SummaryPlan, SummaryStrategy, estimate_document_tokens,
    estimate_tokens, select_strategy,
};
