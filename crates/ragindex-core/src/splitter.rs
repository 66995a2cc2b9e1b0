//! Fixed-size recursive character splitter.
//!
//! Splits on the coarsest separator present (paragraph, line, sentence, word,
//! character), merges adjacent pieces up to `chunk_size` characters and carries
//! up to `chunk_overlap` characters of trailing context into the next chunk.

use std::collections::VecDeque;

const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveCharacterSplitter {
    /// `chunk_size` is clamped to at least 1 and the overlap to below the size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }
    pub fn chunk_overlap(&self) -> usize { self.chunk_overlap }

    /// Splitter with half the size and overlap, used for child chunks.
    pub fn halved(&self) -> Self { Self::new(self.chunk_size / 2, self.chunk_overlap / 2) }

    pub fn split(&self, text: &str) -> Vec<String> { self.split_with(text, &SEPARATORS) }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let idx = separators.iter().position(|s| s.is_empty() || text.contains(s)).unwrap_or(separators.len() - 1);
        let sep = separators[idx];
        let finer = &separators[idx + 1..];
        let pieces: Vec<&str> = if sep.is_empty() {
            text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect()
        } else {
            text.split(sep).filter(|p| !p.is_empty()).collect()
        };

        let mut out = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() { out.extend(self.merge(&fitting, sep)); fitting.clear(); }
            if finer.is_empty() { out.push(piece.trim().to_string()); } else { out.extend(self.split_with(piece, finer)); }
        }
        if !fitting.is_empty() { out.extend(self.merge(&fitting, sep)); }
        out
    }

    fn merge(&self, pieces: &[&str], sep: &str) -> Vec<String> {
        let sep_len = char_len(sep);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;
        for &piece in pieces {
            let len = char_len(piece);
            if !window.is_empty() && total + sep_len + len > self.chunk_size {
                push_joined(&mut chunks, &window, sep);
                // Keep a tail of at most `chunk_overlap` chars that still leaves room for `piece`.
                while !window.is_empty()
                    && (total > self.chunk_overlap || total + sep_len + len > self.chunk_size)
                {
                    let front = window.pop_front().unwrap_or_default();
                    total -= char_len(front) + if window.is_empty() { 0 } else { sep_len };
                }
            }
            total += len + if window.is_empty() { 0 } else { sep_len };
            window.push_back(piece);
        }
        push_joined(&mut chunks, &window, sep);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, sep: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(sep);
    let trimmed = joined.trim();
    if !trimmed.is_empty() { chunks.push(trimmed.to_string()); }
}

fn char_len(s: &str) -> usize { s.chars().count() }
