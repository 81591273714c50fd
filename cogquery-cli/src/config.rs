//! Application configuration: defaults, JSON file, environment, then flags.
//!
//! The first three layers are merged with `figment`; command-line flags are
//! applied afterwards by [`Cli::apply_flags`](crate::Cli::apply_flags).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use cogquery_rag::persistence::{DOCUMENTS_FILE, FRAGMENTS_FILE};
use cogquery_rag::{
    EmbeddingProvider, HashingEmbeddingProvider, IndexPersistence, RetrieverConfig,
};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "COGQUERY_";
pub const ENV_INDEX_DIR: &str = "COGQUERY_INDEX_DIR";
pub const ENV_FRAGMENT_SIZE: &str = "COGQUERY_FRAGMENT_SIZE";
pub const ENV_FRAGMENT_OVERLAP: &str = "COGQUERY_FRAGMENT_OVERLAP";
pub const ENV_TOP_K: &str = "COGQUERY_TOP_K";
pub const ENV_EMBEDDER: &str = "COGQUERY_EMBEDDER";

/// Directory holding both index artifacts unless paths are given explicitly.
pub const DEFAULT_INDEX_DIR: &str = "faiss_index_store";

/// Which embedding provider backs the retriever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbedderConfig {
    /// Offline feature hashing.
    Hashing {
        #[serde(
            default = "default_hashing_dimensions",
            skip_serializing_if = "is_default_hashing_dimensions"
        )]
        dimensions: usize,
    },
    /// An OpenAI-compatible `/embeddings` endpoint; needs the `openai` feature.
    #[serde(rename = "openai")]
    OpenAi {
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        dimensions: Option<usize>,
    },
}

fn default_hashing_dimensions() -> usize {
    cogquery_rag::hashing::DEFAULT_DIMENSIONS
}

// omitted from the defaults layer so `COGQUERY_EMBEDDER=openai` starts without dimensions
fn is_default_hashing_dimensions(dimensions: &usize) -> bool {
    *dimensions == default_hashing_dimensions()
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self::Hashing { dimensions: default_hashing_dimensions() }
    }
}

impl EmbedderConfig {
    /// Construct the provider this configuration names.
    pub fn build(&self) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
        match self {
            Self::Hashing { dimensions } => {
                Ok(Arc::new(HashingEmbeddingProvider::new(*dimensions)))
            }
            #[cfg(feature = "openai")]
            Self::OpenAi { model, dimensions } => {
                let mut provider = cogquery_rag::openai::OpenAIEmbeddingProvider::from_env()?;
                if let Some(model) = model {
                    provider = provider.with_model(model.clone());
                }
                if let Some(dimensions) = dimensions {
                    provider = provider.with_dimensions(*dimensions);
                }
                Ok(Arc::new(provider))
            }
            #[cfg(not(feature = "openai"))]
            Self::OpenAi { .. } => {
                bail!("the openai embedder requires building cogquery with the `openai` feature")
            }
        }
    }
}

/// Everything the binary needs to construct an [`AppContext`](crate::AppContext).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub retriever: RetrieverConfig,
    pub index_dir: PathBuf,
    /// Overrides `index_dir/fragments.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragments_path: Option<PathBuf>,
    /// Overrides `index_dir/documents.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents_path: Option<PathBuf>,
    pub embedder: EmbedderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            retriever: RetrieverConfig::default(),
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            fragments_path: None,
            documents_path: None,
            embedder: EmbedderConfig::default(),
        }
    }
}

impl AppConfig {
    /// Resolve defaults, then the JSON file at `path`, then `COGQUERY_*`
    /// variables from the process environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = Self::figment(path)?
            .merge(env_provider())
            .extract()
            .context("failed to resolve configuration")?;
        Ok(config)
    }

    /// Defaults merged with the JSON file at `path`, without the environment.
    pub fn figment(path: Option<&Path>) -> anyhow::Result<Figment> {
        let figment = Figment::new().merge(Serialized::defaults(Self::default()));
        let Some(path) = path else {
            return Ok(figment);
        };
        if !path.is_file() {
            bail!("config file {} not found", path.display());
        }
        debug!(path = %path.display(), "merging config file");
        Ok(figment.merge(Json::file(path)))
    }

    /// Check the retriever settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.retriever.validate().context("invalid retriever configuration")
    }

    /// Artifact locations, honouring explicit paths over `index_dir`.
    pub fn persistence(&self) -> IndexPersistence {
        let fragments =
            self.fragments_path.clone().unwrap_or_else(|| self.index_dir.join(FRAGMENTS_FILE));
        let documents =
            self.documents_path.clone().unwrap_or_else(|| self.index_dir.join(DOCUMENTS_FILE));
        IndexPersistence::with_paths(fragments, documents)
    }
}

/// `COGQUERY_*` variables, with the flat names mapped onto nested keys.
///
/// `COGQUERY_FRAGMENT_SIZE`, `COGQUERY_FRAGMENT_OVERLAP` and `COGQUERY_TOP_K`
/// land in `retriever`; `COGQUERY_EMBEDDER` selects `embedder.kind`. Any other
/// key may use `__` for nesting, e.g. `COGQUERY_EMBEDDER__DIMENSIONS`.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| {
        match key.as_str().to_ascii_lowercase().as_str() {
            "fragment_size" => "retriever.fragment_size".into(),
            "fragment_overlap" => "retriever.fragment_overlap".into(),
            "top_k" => "retriever.top_k_fragments".into(),
            "embedder" => "embedder.kind".into(),
            other => other.replace("__", ".").into(),
        }
    })
}
