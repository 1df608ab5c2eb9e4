//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and three implementations:
//!
//! - [`RecursiveChunker`] — splits hierarchically by paragraphs, lines, sentences, then words
//! - [`FixedSizeChunker`] — splits by character count with configurable overlap
//! - [`MarkdownChunker`] — splits by markdown headers, preserving header context
//!
//! All sizes are counted in characters (Unicode scalar values), so text is
//! never cut inside a multi-byte character. Every strategy is deterministic.

use std::ops::Range;

use crate::document::Passage;

/// Boundaries tried in order by [`RecursiveChunker`], coarsest first.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

/// A byte range into the source text.
type Span = Range<usize>;

/// A strategy for splitting document text into passages.
///
/// Implementations return passages in document order. Empty or
/// whitespace-only text yields an empty `Vec`.
pub trait Chunker: Send + Sync {
    /// Split `text` into passages.
    fn split(&self, text: &str) -> Vec<Passage>;
}

/// Split `text` into passages of at most `max_chunk_size` characters,
/// preferring paragraph and sentence boundaries.
///
/// ```rust
/// let passages = docchat_rag::chunking::chunk("One. Two.", 100);
/// assert_eq!(passages, vec!["One. Two.".to_string()]);
/// ```
pub fn chunk(text: &str, max_chunk_size: usize) -> Vec<String> {
    RecursiveChunker::new(max_chunk_size, 0).split(text).into_iter().map(|p| p.text).collect()
}

/// Splits text hierarchically: paragraphs → lines → sentences → words → characters.
///
/// Segments are merged greedily up to `chunk_size - chunk_overlap`
/// characters; each passage after the first is then extended backwards with
/// up to `chunk_overlap` characters of the preceding text, starting at a word
/// boundary when one is available. No passage exceeds `chunk_size`.
///
/// # Example
///
/// ```rust
/// use docchat_rag::chunking::{Chunker, RecursiveChunker};
///
/// let chunker = RecursiveChunker::new(20, 0);
/// let passages = chunker.split("First sentence. Second sentence.");
/// assert_eq!(passages[0].text, "First sentence.");
/// assert_eq!(passages[1].text, "Second sentence.");
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` — maximum number of characters per chunk (at least 1)
    /// * `chunk_overlap` — characters shared with the previous chunk, clamped below `chunk_size`
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
    }
}

impl Chunker for RecursiveChunker {
    fn split(&self, text: &str) -> Vec<Passage> {
        let spans = recursive_spans(text, 0..text.len(), self.chunk_size, self.chunk_overlap);
        let mut offsets = CharOffsets::new(text);
        spans
            .into_iter()
            .map(|span| Passage { offset: offsets.at(span.start), text: text[span].to_string() })
            .collect()
    }
}

/// Splits text into fixed-size character windows with configurable overlap.
///
/// Windows that contain only whitespace are skipped; the rest are returned verbatim.
///
/// # Example
///
/// ```rust
/// use docchat_rag::chunking::{Chunker, FixedSizeChunker};
///
/// let passages = FixedSizeChunker::new(4, 1).split("abcdefg");
/// let texts: Vec<_> = passages.iter().map(|p| p.text.as_str()).collect();
/// assert_eq!(texts, ["abcd", "defg"]);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` — maximum number of characters per chunk (at least 1)
    /// * `chunk_overlap` — number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
    }
}

impl Chunker for FixedSizeChunker {
    fn split(&self, text: &str) -> Vec<Passage> {
        let mut offsets = CharOffsets::new(text);
        split_by_size(text, 0..text.len(), self.chunk_size, self.chunk_overlap)
            .into_iter()
            .filter(|span| !text[span.clone()].trim().is_empty())
            .map(|span| Passage { offset: offsets.at(span.start), text: text[span].to_string() })
            .collect()
    }
}

/// Splits text by markdown headers, keeping each section as a unit.
///
/// Each passage is prefixed with its header hierarchy (`Intro > Setup`).
/// Sections exceeding `chunk_size` are split further with the
/// [`RecursiveChunker`] rules. Passage offsets point into the section body.
#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl MarkdownChunker {
    /// Create a new `MarkdownChunker`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
    }
}

/// A markdown section with its header hierarchy and body span.
struct MarkdownSection {
    header_path: String,
    header_start: usize,
    body: Span,
}

/// Header level of a markdown ATX header line, if it is one.
fn header_level(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    match trimmed[level..].chars().next() {
        None => Some(level),
        Some(c) if c.is_whitespace() => Some(level),
        Some(_) => None,
    }
}

/// Parse markdown text into sections split by headers.
fn parse_markdown_sections(text: &str) -> Vec<MarkdownSection> {
    let mut sections = Vec::new();
    let mut headers: Vec<String> = Vec::new();
    let mut current = MarkdownSection { header_path: String::new(), header_start: 0, body: 0..0 };
    let mut pos = 0;

    for line in text.split_inclusive('\n') {
        let line_start = pos;
        pos += line.len();

        let Some(level) = header_level(line) else {
            continue;
        };

        current.body.end = line_start;
        sections.push(current);

        let header_text = line.trim_start()[level..].trim().trim_end_matches('#').trim();
        headers.truncate(level.saturating_sub(1));
        headers.push(header_text.to_string());
        current = MarkdownSection {
            header_path: headers.join(" > "),
            header_start: line_start,
            body: pos..pos,
        };
    }

    current.body.end = text.len();
    sections.push(current);
    sections
}

impl Chunker for MarkdownChunker {
    fn split(&self, text: &str) -> Vec<Passage> {
        let mut offsets = CharOffsets::new(text);
        let mut passages = Vec::new();

        for section in parse_markdown_sections(text) {
            let prefix_len = match section.header_path.chars().count() {
                0 => 0,
                n => n + 1,
            };
            let body_is_empty = text[section.body.clone()].trim().is_empty();

            if body_is_empty {
                if prefix_len > 0 && prefix_len <= self.chunk_size {
                    passages.push(Passage {
                        offset: offsets.at(section.header_start),
                        text: section.header_path.clone(),
                    });
                }
                continue;
            }

            // Headers too long to share a chunk with any body text are dropped from the prefix.
            let (prefix, budget) = if prefix_len + self.chunk_overlap < self.chunk_size {
                (section.header_path.as_str(), self.chunk_size - prefix_len)
            } else {
                ("", self.chunk_size)
            };

            for span in recursive_spans(text, section.body.clone(), budget, self.chunk_overlap) {
                let body = &text[span.clone()];
                let chunk_text =
                    if prefix.is_empty() { body.to_string() } else { format!("{prefix}\n{body}") };
                passages.push(Passage { offset: offsets.at(span.start), text: chunk_text });
            }
        }

        passages
    }
}

/// Split `span` into trimmed, non-empty spans of at most `chunk_size`
/// characters, with up to `chunk_overlap` characters carried over from the
/// previous span.
fn recursive_spans(text: &str, span: Span, chunk_size: usize, chunk_overlap: usize) -> Vec<Span> {
    if text[span.clone()].trim().is_empty() {
        return Vec::new();
    }

    let body_size = chunk_size.saturating_sub(chunk_overlap).max(1);
    let merged = split_and_merge(text, span.clone(), body_size, &SEPARATORS);

    let mut spans = Vec::with_capacity(merged.len());
    for (i, current) in merged.iter().enumerate() {
        let start = if i > 0 && chunk_overlap > 0 {
            overlap_start(text, merged[i - 1].start, current.start, chunk_overlap)
        } else {
            current.start
        };
        if let Some(trimmed) = trim_span(text, start..current.end) {
            spans.push(trimmed);
        }
    }
    spans
}

/// Where a chunk starting at `start` begins once extended backwards by up to
/// `overlap` characters, never before `floor`.
fn overlap_start(text: &str, floor: usize, start: usize, overlap: usize) -> usize {
    let candidate = text[floor..start]
        .char_indices()
        .rev()
        .take(overlap)
        .last()
        .map_or(start, |(i, _)| floor + i);

    // Prefer to begin on a word boundary inside the overlap window.
    let window = &text[candidate..start];
    let begins_mid_word = candidate > floor
        && !window.starts_with(char::is_whitespace)
        && !text[..candidate].ends_with(char::is_whitespace);
    if begins_mid_word {
        if let Some(ws) = window.find(char::is_whitespace) {
            let after_ws = window[ws..]
                .char_indices()
                .find(|(_, c)| !c.is_whitespace())
                .map_or(window.len(), |(i, _)| ws + i);
            return candidate + after_ws;
        }
    }
    candidate
}

/// Shrink a span to exclude surrounding whitespace; `None` if nothing remains.
fn trim_span(text: &str, span: Span) -> Option<Span> {
    let slice = &text[span.clone()];
    let trimmed_start = slice.trim_start();
    if trimmed_start.is_empty() {
        return None;
    }
    let start = span.start + (slice.len() - trimmed_start.len());
    let end = start + trimmed_start.trim_end().len();
    Some(start..end)
}

/// Split a span by a separator, then merge segments into spans that respect
/// `chunk_size`. If a segment exceeds `chunk_size`, it is split further
/// using the next-level separator.
fn split_and_merge(text: &str, span: Span, chunk_size: usize, separators: &[&str]) -> Vec<Span> {
    if text[span.clone()].chars().count() <= chunk_size {
        return vec![span];
    }

    let Some((separator, remaining_separators)) = separators.split_first() else {
        return split_by_size(text, span, chunk_size, 0);
    };

    let segments = split_keeping_separator(text, span.clone(), separator);
    if segments.len() <= 1 {
        return split_and_merge(text, span, chunk_size, remaining_separators);
    }

    let mut spans = Vec::new();
    let mut flush = |current: Span, len: usize| {
        if len > chunk_size {
            spans.extend(split_and_merge(text, current, chunk_size, remaining_separators));
        } else {
            spans.push(current);
        }
    };

    let mut current: Option<(Span, usize)> = None;
    for segment in segments {
        let segment_len = text[segment.clone()].chars().count();
        current = match current.take() {
            None => Some((segment, segment_len)),
            Some((cur, cur_len)) if cur_len + segment_len <= chunk_size => {
                Some((cur.start..segment.end, cur_len + segment_len))
            }
            Some((cur, cur_len)) => {
                flush(cur, cur_len);
                Some((segment, segment_len))
            }
        };
    }
    if let Some((cur, cur_len)) = current {
        flush(cur, cur_len);
    }

    spans
}

/// Split a span at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator(text: &str, span: Span, separator: &str) -> Vec<Span> {
    let mut result = Vec::new();
    let mut start = span.start;

    while let Some(pos) = text[start..span.end].find(separator) {
        let end = start + pos + separator.len();
        result.push(start..end);
        start = end;
    }

    if start < span.end {
        result.push(start..span.end);
    }

    result
}

/// Character-window splitting with overlap.
fn split_by_size(text: &str, span: Span, chunk_size: usize, chunk_overlap: usize) -> Vec<Span> {
    let mut spans = Vec::new();
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut start = span.start;

    while start < span.end {
        let end = advance_chars(text, start, span.end, chunk_size);
        spans.push(start..end);
        if end >= span.end {
            break;
        }
        start = advance_chars(text, start, span.end, step);
    }

    spans
}

/// Byte position `n` characters after `from`, clamped to `limit`.
fn advance_chars(text: &str, from: usize, limit: usize, n: usize) -> usize {
    text[from..limit].char_indices().nth(n).map_or(limit, |(i, _)| from + i)
}

/// Converts byte positions into character offsets, scanning forward incrementally.
struct CharOffsets<'a> {
    text: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharOffsets<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, byte: 0, chars: 0 }
    }

    fn at(&mut self, byte: usize) -> usize {
        if byte < self.byte {
            self.byte = 0;
            self.chars = 0;
        }
        self.chars += self.text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}
