//! Open document storage.

use std::fmt;
use std::ops::Range;

use dashmap::DashMap;
use tower_lsp::lsp_types::Url;

use super::tokens::TokenizedLines;
use super::TextDocument;

/// State kept for one open document.
#[derive(Clone)]
pub struct DocumentState {
    pub document: TextDocument,
    /// Line tokens; `None` when no tokenizer handles the language.
    pub lines: Option<TokenizedLines>,
}

impl fmt::Debug for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentState")
            .field("document", &self.document)
            .field("lines", &self.lines.as_ref().map(TokenizedLines::len))
            .finish()
    }
}

/// Thread-safe storage for open documents.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: DashMap<Url, DocumentState>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open or replace a document.
    pub fn open(&self, document: TextDocument, lines: Option<TokenizedLines>) {
        self.documents
            .insert(document.uri().clone(), DocumentState { document, lines });
    }

    /// Replace the content of an open document. Returns the new snapshot and
    /// the lines whose tokens changed.
    pub fn update(
        &self,
        uri: &Url,
        version: i32,
        text: String,
    ) -> Option<(TextDocument, Range<usize>)> {
        let mut state = self.documents.get_mut(uri)?;
        let document = state.document.with_text(version, text);
        let changed = match state.lines.as_mut() {
            Some(lines) => lines.update(document.text()),
            None => 0..0,
        };
        state.document = document.clone();
        Some((document, changed))
    }

    pub fn close(&self, uri: &Url) {
        self.documents.remove(uri);
    }

    pub fn get(&self, uri: &Url) -> Option<TextDocument> {
        self.documents.get(uri).map(|s| s.document.clone())
    }

    /// Run `f` against a document's state.
    pub fn read<R>(&self, uri: &Url, f: impl FnOnce(&DocumentState) -> R) -> Option<R> {
        self.documents.get(uri).map(|s| f(s.value()))
    }

    /// Every open document.
    pub fn documents(&self) -> Vec<TextDocument> {
        self.documents.iter().map(|s| s.document.clone()).collect()
    }
}
