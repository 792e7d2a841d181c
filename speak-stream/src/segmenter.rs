//! Splits text into speakable chunks.
//!
//! The scan is a single left-to-right pass. A boundary character closes the
//! current chunk (the boundary stays with it); when a size limit is set, a
//! chunk that reaches the limit without a boundary is force-closed exactly at
//! the limit. Limits are counted in characters, so a split never lands inside
//! a multi-byte sequence.
//!
//! Chunk text is never trimmed and every chunk has at least one letter or
//! digit. A closed segment with nothing speakable in it (only whitespace and
//! boundary characters, e.g. the second `!` of `"Hi!!"` or a blank line) is
//! padding: it is appended to the previous chunk, or carried in front of the
//! next one when it leads the text. Padding does not count toward the size
//! limit. Trailing whitespace with no boundary after it is dropped.
//! Concatenating the chunk contents therefore gives back the source text,
//! minus that trailing whitespace.
//!
//! ## Examples
//!
//! ```
//! use speak_stream::segmenter::{Segmenter, SegmenterConfig};
//!
//! let segmenter = Segmenter::new(SegmenterConfig::new(['.', '!', '?'])).unwrap();
//! let chunks = segmenter.segment("Hello. World! Bye.").unwrap();
//! let texts: Vec<&str> = chunks.iter().map(|c| c.content()).collect();
//! assert_eq!(texts, ["Hello.", " World!", " Bye."]);
//! ```

use crate::errors::SegmentationError;
use crate::types::TextChunk;

/// Sentence boundaries used when nothing else is configured.
pub const DEFAULT_BOUNDARIES: &[char] = &['.', '?', '!', ';', ':', '\n'];

/// Boundary set and optional size limit for a [`Segmenter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmenterConfig {
    boundaries: Vec<char>,
    max_chunk_chars: Option<usize>,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BOUNDARIES.iter().copied())
    }
}

impl SegmenterConfig {
    pub fn new(boundaries: impl IntoIterator<Item = char>) -> Self {
        let mut boundaries: Vec<char> = boundaries.into_iter().collect();
        boundaries.sort_unstable();
        boundaries.dedup();
        Self {
            boundaries,
            max_chunk_chars: None,
        }
    }

    /// Upper bound on the characters a chunk is cut from, not counting
    /// whitespace and boundary padding folded into it.
    #[must_use]
    pub fn with_max_chunk_chars(mut self, max: Option<usize>) -> Self {
        self.max_chunk_chars = max;
        self
    }

    pub fn boundaries(&self) -> &[char] {
        &self.boundaries
    }

    pub fn max_chunk_chars(&self) -> Option<usize> {
        self.max_chunk_chars
    }

    fn is_boundary(&self, ch: char) -> bool {
        self.boundaries.binary_search(&ch).is_ok()
    }
}

/// Deterministic text splitter. Pure: no I/O, no suspension.
#[derive(Debug, Clone)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    /// ## Errors
    ///
    /// Returns [`SegmentationError::InvalidConfig`] for a zero size limit.
    pub fn new(config: SegmenterConfig) -> Result<Self, SegmentationError> {
        if config.max_chunk_chars == Some(0) {
            return Err(SegmentationError::InvalidConfig {
                reason: "max_chunk_chars must be at least 1".to_string(),
            });
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Split `text` into chunks with dense 0-based indices.
    ///
    /// ## Errors
    ///
    /// - [`SegmentationError::EmptyInput`] for `""`
    /// - [`SegmentationError::NoSpeakableContent`] when no chunk contains a
    ///   letter or digit
    pub fn segment(&self, text: &str) -> Result<Vec<TextChunk>, SegmentationError> {
        if text.is_empty() {
            return Err(SegmentationError::EmptyInput);
        }

        let mut builder = ChunkBuilder::default();

        for ch in text.chars() {
            builder.push(ch);
            let at_limit = self
                .config
                .max_chunk_chars
                .is_some_and(|max| builder.current_chars >= max);
            if self.config.is_boundary(ch) || at_limit {
                builder.close();
            }
        }

        if !builder.current.trim().is_empty() {
            builder.close();
        }

        let chunks = builder.chunks;
        if !chunks.iter().any(|c| is_speakable(c)) {
            return Err(SegmentationError::NoSpeakableContent);
        }

        Ok(chunks
            .into_iter()
            .enumerate()
            .map(|(index, content)| TextChunk::new(index, content))
            .collect())
    }
}

fn is_speakable(segment: &str) -> bool {
    segment.chars().any(char::is_alphanumeric)
}

#[derive(Default)]
struct ChunkBuilder {
    chunks: Vec<String>,
    current: String,
    /// Characters pushed since the last close; carried padding is excluded.
    current_chars: usize,
}

impl ChunkBuilder {
    fn push(&mut self, ch: char) {
        self.current.push(ch);
        self.current_chars += 1;
    }

    fn close(&mut self) {
        let segment = std::mem::take(&mut self.current);
        self.current_chars = 0;
        if segment.is_empty() {
            return;
        }
        if is_speakable(&segment) {
            self.chunks.push(segment);
            return;
        }

        match self.chunks.last_mut() {
            Some(last) => last.push_str(&segment),
            // leading padding rides along with the next chunk
            None => self.current = segment,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
