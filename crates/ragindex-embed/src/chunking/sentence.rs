use ragindex_core::types::{Document, Meta};

/// One sentence of a document, tagged with the document's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub index: usize,
    pub text: String,
    pub metadata: Meta,
}

fn is_terminator(c: char) -> bool { matches!(c, '.' | '!' | '?') }

/// Splits after runs of `.`, `!` or `?` that are followed by whitespace.
/// Terminators stay on their sentence; empty fragments are dropped.
pub fn sentencize(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut push = |s: &str| {
        let s = s.trim();
        if !s.is_empty() { out.push(s.to_string()); }
    };
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !is_terminator(c) { continue; }
        let mut end = i + c.len_utf8();
        while let Some(&(j, n)) = chars.peek() {
            if !is_terminator(n) { break; }
            end = j + n.len_utf8();
            chars.next();
        }
        if matches!(chars.peek(), Some(&(_, n)) if n.is_whitespace()) {
            push(&text[start..end]);
            start = end;
        }
    }
    push(&text[start..]);
    out
}

pub fn sentencize_document(doc: &Document) -> Vec<Sentence> {
    sentencize(&doc.text)
        .into_iter()
        .enumerate()
        .map(|(index, text)| Sentence { index, text, metadata: doc.metadata.clone() })
        .collect()
}
