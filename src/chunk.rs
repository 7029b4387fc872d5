//! Recursive character text splitter.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters,
//! carrying up to `chunk_overlap` characters of context between consecutive
//! chunks of the same document.
//!
//! Splitting tries separators in priority order: paragraph (`\n\n`), line
//! (`\n`), word (` `) and finally single characters. The first separator
//! present in the text is used; each resulting piece keeps its leading
//! separator. Pieces shorter than `chunk_size` are merged greedily; longer
//! ones are split again with the remaining separators.
//!
//! Lengths are counted in characters, not bytes. The output is fully
//! deterministic for a given text and parameter set.

use anyhow::{bail, Result};
use serde_json::json;
use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Document};

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split raw text into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split every document, attaching `source` and `loc.lines` metadata.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            let texts = self.split_text(&doc.content);
            let locations = line_locations(&doc.content, &texts);
            for (text, (from, to)) in texts.into_iter().zip(locations) {
                chunks.push(Chunk {
                    content: text,
                    metadata: json!({
                        "source": doc.source,
                        "loc": { "lines": { "from": from, "to": to } },
                    }),
                });
            }
        }
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // Pick the first separator that occurs in the text.
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, s) in separators.iter().enumerate() {
            if s.is_empty() {
                separator = "";
                break;
            }
            if text.contains(s.as_str()) {
                separator = s;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut good_splits: Vec<&str> = Vec::new();
        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good_splits.push(piece);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits, ""));
                good_splits.clear();
            }
            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    final_chunks.push(trimmed.to_string());
                }
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits, ""));
        }

        final_chunks
    }

    /// Greedily merge small pieces into chunks, backing off to keep at most
    /// `chunk_overlap` characters of the previous chunk.
    fn merge_splits(&self, splits: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece);
            let joined_extra = if current.is_empty() { 0 } else { sep_len };

            if total + len + joined_extra > self.chunk_size {
                if total > self.chunk_size {
                    tracing::warn!(
                        size = total,
                        chunk_size = self.chunk_size,
                        "created a chunk larger than the configured chunk size"
                    );
                }
                if !current.is_empty() {
                    if let Some(doc) = join_pieces(&current, separator) {
                        docs.push(doc);
                    }
                    loop {
                        let extra = if current.is_empty() { 0 } else { sep_len };
                        let over_overlap = total > self.chunk_overlap;
                        let still_too_big = total + len + extra > self.chunk_size && total > 0;
                        if !(over_overlap || still_too_big) {
                            break;
                        }
                        let Some(first) = current.pop_front() else {
                            break;
                        };
                        let sep = if current.is_empty() { 0 } else { sep_len };
                        total = total.saturating_sub(char_len(first) + sep);
                    }
                }
            }

            current.push_back(piece);
            total += len + if current.len() > 1 { sep_len } else { 0 };
        }

        if let Some(doc) = join_pieces(&current, separator) {
            docs.push(doc);
        }
        docs
    }
}

/// Split `text` before every occurrence of `separator`, keeping the
/// separator at the start of the following piece. Overlapping occurrences
/// each start a new piece. An empty separator splits into characters.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, _) in text.char_indices().skip(1) {
        if text[i..].starts_with(separator) {
            pieces.push(&text[start..i]);
            start = i;
        }
    }
    pieces.push(&text[start..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn join_pieces(pieces: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 1-based `(from, to)` line ranges of each chunk within `text`.
///
/// Each chunk is searched for after the start of the previous one, so
/// overlapping chunks resolve to their own occurrence.
fn line_locations(text: &str, chunks: &[String]) -> Vec<(usize, usize)> {
    let mut locations = Vec::with_capacity(chunks.len());
    let mut search_from = 0usize;

    for chunk in chunks {
        let offset = text[search_from..]
            .find(chunk.as_str())
            .map(|pos| search_from + pos)
            .or_else(|| text.find(chunk.as_str()))
            .unwrap_or(search_from);

        let from = 1 + text[..offset].matches('\n').count();
        let to = from + chunk.matches('\n').count();
        locations.push((from, to));

        // Next search starts one character past this chunk's start.
        search_from = text[offset..]
            .chars()
            .next()
            .map(|c| offset + c.len_utf8())
            .unwrap_or(offset);
    }

    locations
}
