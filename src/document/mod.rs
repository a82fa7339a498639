//! Open documents and per-document caches.
//!
//! This module provides:
//! - `TextDocument`, the snapshot handed to providers
//! - `LineIndex` for byte offset <-> LSP position conversion
//! - `TokenizedLines`, the incremental line-token cache
//! - `DocumentStore` for document lifecycle management

mod state;
mod text;
mod tokens;

use std::sync::Arc;

use tower_lsp::lsp_types::{Position, Url};

pub use state::{DocumentState, DocumentStore};
pub use text::LineIndex;
pub use tokens::TokenizedLines;

/// An immutable snapshot of a document. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TextDocument {
    uri: Url,
    language_id: Arc<str>,
    version: i32,
    index: Arc<LineIndex>,
}

impl TextDocument {
    pub fn new(uri: Url, language_id: impl Into<Arc<str>>, version: i32, text: String) -> Self {
        Self {
            uri,
            language_id: language_id.into(),
            version,
            index: Arc::new(LineIndex::new(text)),
        }
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn text(&self) -> &str {
        self.index.source()
    }

    pub fn index(&self) -> &LineIndex {
        &self.index
    }

    /// The same document with new content.
    pub fn with_text(&self, version: i32, text: String) -> Self {
        Self {
            uri: self.uri.clone(),
            language_id: Arc::clone(&self.language_id),
            version,
            index: Arc::new(LineIndex::new(text)),
        }
    }

    /// The word (`[A-Za-z0-9_@-]` run) touching `position`, with its span.
    pub fn word_at(&self, position: Position) -> Option<(std::ops::Range<usize>, &str)> {
        let offset = self.index.position_to_offset(position)?;
        let text = self.text();
        let is_word = |c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | '@');

        let start = text[..offset]
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_word(*c))
            .last()
            .map_or(offset, |(i, _)| i);
        let end = text[offset..]
            .char_indices()
            .find(|(_, c)| !is_word(*c))
            .map_or(text.len(), |(i, _)| offset + i);

        (start < end).then(|| (start..end, &text[start..end]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_at_position() {
        let doc = TextDocument::new(
            Url::parse("file:///a.less").unwrap(),
            "less",
            1,
            "a { color: @main-color; }".to_string(),
        );
        let (span, word) = doc.word_at(Position::new(0, 14)).unwrap();
        assert_eq!(word, "@main-color");
        assert_eq!(span, 11..22);
        assert_eq!(doc.word_at(Position::new(0, 3)), None);
    }
}
