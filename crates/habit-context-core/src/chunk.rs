//! Fixed-size character text splitter.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size`
//! characters. Lengths are counted in `char`s, never bytes, so multi-byte
//! UTF-8 text is never cut inside a code point.
//!
//! # Algorithm
//!
//! 1. Split the text on the separator (default `"\n\n"`) and trim each
//!    piece; empty pieces are dropped.
//! 2. A piece longer than `chunk_size` is hard-split into windows of
//!    exactly `chunk_size` characters (the last window holds the rest),
//!    advancing by `chunk_size - chunk_overlap`.
//! 3. Pieces are merged greedily, joined by the separator, until adding
//!    the next piece would exceed `chunk_size`.
//! 4. After a chunk is emitted, trailing pieces totalling at most
//!    `chunk_overlap` characters are carried into the next one. With
//!    `chunk_overlap = 0` chunks never overlap.
//!
//! The function is pure: the same input always yields the same chunks,
//! including their ids.
//!
//! # Example
//!
//! ```rust
//! use habit_context_core::chunk::split_text;
//!
//! let text = "a".repeat(2500);
//! let chunks = split_text("doc.txt", &text, 1000, 0);
//! let sizes: Vec<usize> = chunks.iter().map(|c| c.text.len()).collect();
//! assert_eq!(sizes, vec![1000, 1000, 500]);
//! ```

use std::collections::VecDeque;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Default paragraph separator.
pub const DEFAULT_SEPARATOR: &str = "\n\n";

/// Splitter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitParams {
    /// Maximum characters per chunk. Zero is treated as one.
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks. Clamped below `chunk_size`.
    pub chunk_overlap: usize,
    /// Boundary preferred for splitting. Empty means hard splits only.
    pub separator: String,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 0,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

/// Split `text` with the default separator.
///
/// `source` is recorded on every chunk as its provenance.
pub fn split_text(source: &str, text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    split_with(
        source,
        text,
        &SplitParams {
            chunk_size,
            chunk_overlap,
            ..SplitParams::default()
        },
    )
}

/// Split `text` according to `params`.
///
/// Returns no chunks for text that is empty or whitespace only.
/// Chunk indices are contiguous from 0.
pub fn split_with(source: &str, text: &str, params: &SplitParams) -> Vec<Chunk> {
    let chunk_size = params.chunk_size.max(1);
    let overlap = params.chunk_overlap.min(chunk_size - 1);
    let separator = params.separator.as_str();
    let sep_len = char_len(separator);

    let pieces: Vec<&str> = if separator.is_empty() {
        vec![text]
    } else {
        text.split(separator).collect()
    };

    let mut splits: Vec<&str> = Vec::new();
    for piece in pieces {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if char_len(piece) > chunk_size {
            splits.extend(hard_split(piece, chunk_size, overlap));
        } else {
            splits.push(piece);
        }
    }

    let mut texts: Vec<String> = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for split in splits {
        let len = char_len(split);
        if !window.is_empty() && total + sep_len + len > chunk_size {
            texts.push(join(&window, separator));
            while let Some(front) = window.front() {
                if total <= overlap && total + sep_len + len <= chunk_size {
                    break;
                }
                let front_len = char_len(front);
                window.pop_front();
                total -= front_len + if window.is_empty() { 0 } else { sep_len };
            }
        }
        total += len + if window.is_empty() { 0 } else { sep_len };
        window.push_back(split);
    }
    if !window.is_empty() {
        texts.push(join(&window, separator));
    }

    texts
        .iter()
        .enumerate()
        .map(|(i, t)| make_chunk(source, i as i64, t))
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join(window: &VecDeque<&str>, separator: &str) -> String {
    window.iter().copied().collect::<Vec<_>>().join(separator)
}

/// Cut `text` into windows of `size` characters, stepping `size - overlap`.
fn hard_split(text: &str, size: usize, overlap: usize) -> Vec<&str> {
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n_chars = bounds.len() - 1;
    let step = size - overlap;

    let mut out = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(n_chars);
        out.push(&text[bounds[start]..bounds[end]]);
        if end == n_chars {
            break;
        }
        start += step;
    }
    out
}

/// Build a [`Chunk`] whose id is a UUIDv5 over source, index, and content hash.
fn make_chunk(source: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let key = format!("{}\u{1f}{}\u{1f}{}", source, index, hash);
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string();

    Chunk {
        id,
        source: source.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_size_split() {
        let text = "x".repeat(2500);
        let chunks = split_text("doc.txt", &text, 1000, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.len(), 1000);
        assert_eq!(chunks[1].text.len(), 1000);
        assert_eq!(chunks[2].text.len(), 500);
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text("doc.txt", "Hello, world!", 1000, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].source, "doc.txt");
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(split_text("doc.txt", "", 1000, 0).is_empty());
        assert!(split_text("doc.txt", "  \n\n \n\n", 1000, 0).is_empty());
    }

    #[test]
    fn test_paragraphs_merge_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = split_text("doc.txt", text, 1000, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_paragraphs_split_at_limit() {
        let text = "aaaaaaaaaa\n\nbbbbbbbbbb\n\ncccccccccc";
        let chunks = split_text("doc.txt", text, 22, 0);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaaaaaaaa\n\nbbbbbbbbbb", "cccccccccc"]);
        for c in &chunks {
            assert!(c.text.chars().count() <= 22);
        }
    }

    #[test]
    fn test_overlap_carries_trailing_paragraph() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        let chunks = split_text("doc.txt", text, 10, 4);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaa\n\nbbbb", "bbbb\n\ncccc"]);
    }

    #[test]
    fn test_hard_split_with_overlap() {
        let text = "0123456789";
        let chunks = split_text("doc.txt", text, 4, 1);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["0123", "3456", "6789"]);
    }

    #[test]
    fn test_overlap_clamped_below_chunk_size() {
        let chunks = split_text("doc.txt", "abcdef", 2, 5);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 2));
    }

    #[test]
    fn test_multibyte_counts_chars() {
        let text = "┌".repeat(25);
        let chunks = split_text("doc.txt", &text, 10, 0);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.text.chars().count()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[test]
    fn test_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split_text("doc.txt", &text, 40, 0);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = split_text("doc.txt", text, 12, 0);
        let c2 = split_text("doc.txt", text, 12, 0);
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_ids_depend_on_source() {
        let a = split_text("a.txt", "same text", 100, 0);
        let b = split_text("b.txt", "same text", 100, 0);
        assert_eq!(a[0].hash, b[0].hash);
        assert_ne!(a[0].id, b[0].id);
    }

    #[test]
    fn test_empty_separator_hard_splits_only() {
        let params = SplitParams {
            chunk_size: 3,
            chunk_overlap: 0,
            separator: String::new(),
        };
        let chunks = split_with("doc.txt", "ab\n\ncd", &params);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["ab\n", "\ncd"]);
    }
}
