//! Document splitting strategies.
//!
//! This module provides the [`Splitter`] trait and two implementations:
//!
//! - [`WindowSplitter`]: a sliding character window with configurable overlap
//! - [`RecursiveSplitter`]: splits hierarchically by paragraphs, sentences, then words
//!
//! Sizes are counted in characters (Unicode scalar values), never bytes, so a
//! window boundary can never fall inside a multi-byte character.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::document::{Document, Fragment};
use crate::error::{RagError, Result};

/// A strategy for splitting a document into child fragments.
///
/// Implementations produce unembedded [`Fragment`]s whose `parent_id` is the
/// document's id. Embeddings are attached later by the fragment index.
pub trait Splitter: Send + Sync {
    /// Split a document into fragments.
    ///
    /// Returns an empty `Vec` if the document has empty content.
    fn split(&self, document: &Document) -> Vec<Fragment>;
}

/// Which [`Splitter`] the retriever builds for ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitStrategy {
    /// Fixed sliding window, see [`WindowSplitter`].
    #[default]
    Window,
    /// Boundary-aware splitting, see [`RecursiveSplitter`].
    Recursive,
}

impl SplitStrategy {
    /// Build a splitter for this strategy after validating the sizes.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `fragment_size` is zero or
    /// `fragment_overlap >= fragment_size`.
    pub fn splitter(
        self,
        fragment_size: usize,
        fragment_overlap: usize,
    ) -> Result<Box<dyn Splitter>> {
        validate_sizes(fragment_size, fragment_overlap)?;
        Ok(match self {
            Self::Window => Box::new(WindowSplitter::new(fragment_size, fragment_overlap)),
            Self::Recursive => Box::new(RecursiveSplitter::new(fragment_size, fragment_overlap)),
        })
    }
}

/// The strategy and sizes a fragment index was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSettings {
    pub strategy: SplitStrategy,
    pub fragment_size: usize,
    pub fragment_overlap: usize,
}

impl SplitSettings {
    /// Build the splitter these settings describe.
    ///
    /// # Errors
    ///
    /// Same as [`SplitStrategy::splitter`].
    pub fn splitter(&self) -> Result<Box<dyn Splitter>> {
        self.strategy.splitter(self.fragment_size, self.fragment_overlap)
    }
}

/// Check that a window of `fragment_size` advancing by
/// `fragment_size - fragment_overlap` makes progress.
pub(crate) fn validate_sizes(fragment_size: usize, fragment_overlap: usize) -> Result<()> {
    if fragment_size == 0 {
        return Err(RagError::ConfigError("fragment_size must be greater than zero".to_string()));
    }
    if fragment_overlap >= fragment_size {
        return Err(RagError::ConfigError(format!(
            "fragment_overlap ({fragment_overlap}) must be less than \
             fragment_size ({fragment_size})"
        )));
    }
    Ok(())
}

/// Slide a window of `size` characters over `text`, advancing by
/// `size - overlap`. The last window is truncated to the remaining text and
/// the walk ends as soon as a window reaches the end.
fn window_slices(text: &str, size: usize, overlap: usize) -> Vec<&str> {
    if text.is_empty() || size == 0 {
        return Vec::new();
    }

    let bounds: Vec<usize> =
        text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let char_count = bounds.len() - 1;
    let step = size.saturating_sub(overlap).max(1);

    let mut slices = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(char_count);
        slices.push(&text[bounds[start]..bounds[end]]);
        if end == char_count {
            break;
        }
        start += step;
    }
    slices
}

/// Splits content into fixed-size character windows with overlap.
///
/// # Example
///
/// ```rust,ignore
/// use cogquery_rag::WindowSplitter;
///
/// let splitter = WindowSplitter::new(20, 5);
/// let fragments = splitter.split(&document);
/// ```
#[derive(Debug, Clone)]
pub struct WindowSplitter {
    fragment_size: usize,
    fragment_overlap: usize,
}

impl WindowSplitter {
    /// Create a new `WindowSplitter`.
    ///
    /// # Arguments
    ///
    /// * `fragment_size`: number of characters per window
    /// * `fragment_overlap`: number of characters shared by consecutive windows
    pub fn new(fragment_size: usize, fragment_overlap: usize) -> Self {
        Self { fragment_size, fragment_overlap }
    }
}

impl Splitter for WindowSplitter {
    fn split(&self, document: &Document) -> Vec<Fragment> {
        window_slices(&document.content, self.fragment_size, self.fragment_overlap)
            .into_iter()
            .map(|text| Fragment::new(text, document.id.clone()))
            .collect()
    }
}

/// Splits text hierarchically: paragraphs → sentences → words.
///
/// First splits by paragraph separators (`\n\n`). If a paragraph exceeds
/// `fragment_size`, splits by sentence boundaries (`. `, `! `, `? `). If a
/// sentence still exceeds `fragment_size`, splits by word boundaries, and
/// finally falls back to the sliding window.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    fragment_size: usize,
    fragment_overlap: usize,
}

impl RecursiveSplitter {
    /// Create a new `RecursiveSplitter`.
    pub fn new(fragment_size: usize, fragment_overlap: usize) -> Self {
        Self { fragment_size, fragment_overlap }
    }
}

const SEPARATORS: [&str; 5] = ["\n\n", ". ", "! ", "? ", " "];

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split text by a separator, then merge segments into pieces that respect
/// `size`. A segment longer than `size` is split further using the
/// next-level separator.
///
/// After a piece is emitted, its trailing segments totalling at most
/// `overlap` characters start the next piece.
fn split_and_merge(text: &str, size: usize, overlap: usize, separators: &[&str]) -> Vec<String> {
    if char_len(text) <= size || separators.is_empty() {
        return window_slices(text, size, overlap).into_iter().map(str::to_string).collect();
    }

    let separator = separators[0];
    let remaining = &separators[1..];

    let mut pieces = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut current_len = 0;

    for segment in split_keeping_separator(text, separator) {
        let len = char_len(segment);
        if len > size {
            emit(&current, &mut pieces);
            current.clear();
            current_len = 0;
            pieces.extend(split_and_merge(segment, size, overlap, remaining));
            continue;
        }

        if !current.is_empty() && current_len + len > size {
            emit(&current, &mut pieces);
            while current_len > overlap || (current_len > 0 && current_len + len > size) {
                let Some(dropped) = current.pop_front() else { break };
                current_len -= char_len(dropped);
            }
        }
        current.push_back(segment);
        current_len += len;
    }
    emit(&current, &mut pieces);

    pieces
}

fn emit(segments: &VecDeque<&str>, pieces: &mut Vec<String>) {
    let piece: String = segments.iter().copied().collect();
    if !piece.trim().is_empty() {
        pieces.push(piece);
    }
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

impl Splitter for RecursiveSplitter {
    fn split(&self, document: &Document) -> Vec<Fragment> {
        if document.content.is_empty() {
            return Vec::new();
        }

        split_and_merge(&document.content, self.fragment_size, self.fragment_overlap, &SEPARATORS)
            .into_iter()
            .map(|text| Fragment::new(text, document.id.clone()))
            .collect()
    }
}
