//! Recursive character splitting.
//!
//! Text is split on the coarsest separator present (`"\n\n"`, then `"\n"`,
//! then `" "`, then individual characters) and the pieces are merged back
//! into chunks of at most `chunk_size` characters, with up to
//! `chunk_overlap` characters carried over between neighbours.

use ragscope_core::config::IngestConfig;
use serde::{Deserialize, Serialize};

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// A chunk of text and its character offset in the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    pub start_index: usize,
}

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    /// Sizes are in characters. `chunk_size` is clamped to at least 1 and
    /// the overlap to below it.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks with their starting character offsets.
    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        let pieces = self.split_recursive(text, &self.separators);

        let mut chunks: Vec<TextChunk> = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let search_from = chunks
                .last()
                .map(|prev| {
                    (prev.start_index + char_len(&prev.text)).saturating_sub(self.chunk_overlap)
                })
                .unwrap_or(0);
            let from_byte = byte_offset(text, search_from);
            let byte_start = text[from_byte..]
                .find(&piece)
                .map(|i| i + from_byte)
                .or_else(|| text.find(&piece))
                .unwrap_or(0);
            chunks.push(TextChunk {
                start_index: text[..byte_start].chars().count(),
                text: piece,
            });
        }
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).map(String::as_str).unwrap_or("");
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator).map(str::to_string).collect()
        };

        let mut output = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for split in splits {
            if char_len(&split) < self.chunk_size {
                pending.push(split);
                continue;
            }
            if !pending.is_empty() {
                output.extend(self.merge(&pending, separator));
                pending.clear();
            }
            if remaining.is_empty() {
                push_trimmed(&mut output, &split);
            } else {
                output.extend(self.split_recursive(&split, remaining));
            }
        }
        if !pending.is_empty() {
            output.extend(self.merge(&pending, separator));
        }
        output
    }

    /// Greedily join consecutive splits up to `chunk_size`, keeping a tail of
    /// at most `chunk_overlap` characters as the head of the next chunk.
    fn merge(&self, splits: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split);
            let joined_len = |current: &Vec<&str>, total: usize| {
                total + len + if current.is_empty() { 0 } else { sep_len }
            };

            if joined_len(&current, total) > self.chunk_size {
                if !current.is_empty() {
                    push_trimmed(&mut docs, &current.join(separator));
                }
                while !current.is_empty()
                    && (total > self.chunk_overlap || joined_len(&current, total) > self.chunk_size)
                {
                    total -= char_len(current[0]) + if current.len() > 1 { sep_len } else { 0 };
                    current.remove(0);
                }
            }
            current.push(split.as_str());
            total += len + if current.len() > 1 { sep_len } else { 0 };
        }
        if !current.is_empty() {
            push_trimmed(&mut docs, &current.join(separator));
        }
        docs
    }
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

fn push_trimmed(docs: &mut Vec<String>, doc: &str) {
    let trimmed = doc.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the `chars`-th character, or the end of `s`.
fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map_or(s.len(), |(i, _)| i)
}
