//! The application context shared by every command.

use std::sync::Arc;

use anyhow::Context;
use cogquery_rag::{
    EmbeddingProvider, IndexPersistence, ParentChildRetriever, RestoreOutcome,
};
use tracing::info;

use crate::config::AppConfig;

/// Owns the configuration, the embedder, the retriever and the persistence
/// handle for one invocation. Command handlers borrow it.
pub struct AppContext {
    config: AppConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: ParentChildRetriever,
    persistence: IndexPersistence,
}

impl AppContext {
    /// Validate `config` and build the retriever it describes.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let embedder = config.embedder.build().context("failed to create embedding provider")?;
        let retriever = ParentChildRetriever::builder()
            .config(config.retriever.clone())
            .embedding_provider(Arc::clone(&embedder))
            .build()?;
        let persistence = config.persistence();

        info!(
            embedder = embedder.name(),
            dimensions = embedder.dimensions(),
            index_dir = %config.index_dir.display(),
            "application context ready"
        );
        Ok(Self { config, embedder, retriever, persistence })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn retriever(&self) -> &ParentChildRetriever {
        &self.retriever
    }

    pub fn persistence(&self) -> &IndexPersistence {
        &self.persistence
    }

    /// Load the saved index into the retriever if one exists.
    ///
    /// Persistence errors are returned unwrapped so callers can match on
    /// [`RagError`](cogquery_rag::RagError).
    pub async fn restore(&self) -> anyhow::Result<RestoreOutcome> {
        Ok(self.retriever.restore(&self.persistence).await?)
    }

    /// Write the retriever's index to the configured artifacts.
    pub async fn save(&self) -> anyhow::Result<()> {
        Ok(self.retriever.save(&self.persistence).await?)
    }
}
