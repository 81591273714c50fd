//! Summarization strategy selection for consumers of retrieved documents.
//!
//! Picking how to summarize is a pure function of input size: text that fits
//! comfortably in the model context is summarized in one pass, larger input
//! is summarized piecewise and then combined.

use serde::{Deserialize, Serialize};

use crate::document::Document;

/// Context size assumed when the model's limit is unknown.
pub const DEFAULT_CONTEXT_LIMIT: usize = 8000;

/// How a set of documents is summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryStrategy {
    /// Everything in one prompt.
    Stuff,
    /// Summarize pieces independently, then combine the partial summaries.
    MapReduce,
    /// Walk the pieces in order, refining a running summary.
    Refine,
}

impl SummaryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stuff => "stuff",
            Self::MapReduce => "map-reduce",
            Self::Refine => "refine",
        }
    }
}

impl std::fmt::Display for SummaryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The chosen strategy and the numbers behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPlan {
    pub strategy: SummaryStrategy,
    pub estimated_tokens: usize,
    pub safe_limit: usize,
}

/// Rough token count: four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Token estimate for documents joined with single spaces.
pub fn estimate_document_tokens(documents: &[Document]) -> usize {
    let chars: usize = documents.iter().map(|d| d.content.chars().count()).sum();
    let separators = documents.len().saturating_sub(1);
    (chars + separators) / 4
}

/// Select a strategy for `estimated_tokens` of input against a model context
/// of `context_limit` tokens.
///
/// Without a preference, input under 80% of the limit is `Stuff` and anything
/// else is `MapReduce`. A preference is honoured, except that `Stuff` falls
/// back to `MapReduce` when the input does not fit.
pub fn select_strategy(
    estimated_tokens: usize,
    context_limit: usize,
    preference: Option<SummaryStrategy>,
) -> SummaryPlan {
    // 80% of the window; the rest is left for the prompt and the response
    let safe_limit = context_limit.saturating_mul(4) / 5;
    let fits = estimated_tokens < safe_limit;

    let strategy = match preference {
        Some(SummaryStrategy::Stuff) | None if fits => SummaryStrategy::Stuff,
        Some(SummaryStrategy::Stuff) | None => SummaryStrategy::MapReduce,
        Some(other) => other,
    };

    SummaryPlan { strategy, estimated_tokens, safe_limit }
}
