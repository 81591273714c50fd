//! Configuration for the parent/child retriever.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::splitting::{SplitSettings, SplitStrategy, validate_sizes};

/// Configuration parameters for the [`ParentChildRetriever`](crate::ParentChildRetriever).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Fragment window size in characters.
    pub fragment_size: usize,
    /// Number of characters shared by consecutive fragments.
    pub fragment_overlap: usize,
    /// Number of nearest fragments searched per query.
    pub top_k_fragments: usize,
    /// Fragment hits farther than this Euclidean distance are dropped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f32>,
    /// How documents are cut into fragments.
    pub split_strategy: SplitStrategy,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            fragment_size: 1000,
            fragment_overlap: 150,
            top_k_fragments: 12,
            max_distance: None,
            split_strategy: SplitStrategy::Window,
        }
    }
}

impl RetrieverConfig {
    /// Create a new builder for constructing a [`RetrieverConfig`].
    pub fn builder() -> RetrieverConfigBuilder {
        RetrieverConfigBuilder::default()
    }

    /// The configured strategy and sizes.
    pub fn split_settings(&self) -> SplitSettings {
        SplitSettings {
            strategy: self.split_strategy,
            fragment_size: self.fragment_size,
            fragment_overlap: self.fragment_overlap,
        }
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `fragment_size == 0` or `fragment_overlap >= fragment_size`
    /// - `top_k_fragments == 0`
    /// - `max_distance` is negative or not a number
    pub fn validate(&self) -> Result<()> {
        validate_sizes(self.fragment_size, self.fragment_overlap)?;
        if self.top_k_fragments == 0 {
            return Err(RagError::ConfigError(
                "top_k_fragments must be greater than zero".to_string(),
            ));
        }
        if let Some(max) = self.max_distance {
            if max.is_nan() || max < 0.0 {
                return Err(RagError::ConfigError(format!(
                    "max_distance must be a non-negative number, got {max}"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RetrieverConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrieverConfigBuilder {
    config: RetrieverConfig,
}

impl RetrieverConfigBuilder {
    /// Set the fragment window size in characters.
    pub fn fragment_size(mut self, size: usize) -> Self {
        self.config.fragment_size = size;
        self
    }

    /// Set the overlap between consecutive fragments in characters.
    pub fn fragment_overlap(mut self, overlap: usize) -> Self {
        self.config.fragment_overlap = overlap;
        self
    }

    /// Set the number of fragments searched per query.
    pub fn top_k_fragments(mut self, k: usize) -> Self {
        self.config.top_k_fragments = k;
        self
    }

    /// Drop fragment hits farther than `distance`.
    pub fn max_distance(mut self, distance: f32) -> Self {
        self.config.max_distance = Some(distance);
        self
    }

    /// Set the split strategy.
    pub fn split_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.config.split_strategy = strategy;
        self
    }

    /// Build the [`RetrieverConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RetrieverConfig::validate`].
    pub fn build(self) -> Result<RetrieverConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
