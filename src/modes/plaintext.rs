//! Plain text: words and separators, with suggestions drawn from the
//! document's own words.

use std::collections::BTreeSet;
use std::sync::Arc;

use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind, Position};

use super::{LanguageFeatures, LanguageMode, ModeRegistration};
use crate::document::TextDocument;
use crate::features::{CancellationToken, ProviderResult, SuggestProvider, SuggestResult};
use crate::lexer::PlainTextTokenizer;

pub const LANGUAGE_ID: &str = "plaintext";

/// Words shorter than this are never suggested.
const MIN_WORD_LENGTH: usize = 3;

#[derive(Debug, Default)]
pub struct PlainTextMode;

impl PlainTextMode {
    pub fn new() -> Self {
        Self
    }
}

impl LanguageMode for PlainTextMode {
    fn id(&self) -> &str {
        LANGUAGE_ID
    }

    fn activate(&self, features: &LanguageFeatures) -> ModeRegistration {
        let mut registration = ModeRegistration::new();
        registration.push(
            features
                .tokenizers
                .register(Arc::new(PlainTextTokenizer::new(LANGUAGE_ID))),
        );
        registration.push(features.suggest.register(LANGUAGE_ID, Arc::new(WordSuggest)));
        registration
    }
}

/// Suggests words already present in the document.
struct WordSuggest;

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[tower_lsp::async_trait]
impl SuggestProvider for WordSuggest {
    async fn provide_suggestions(
        &self,
        document: &TextDocument,
        position: Position,
        token: &CancellationToken,
    ) -> ProviderResult<SuggestResult> {
        let Some(offset) = document.index().position_to_offset(position) else {
            return Ok(None);
        };
        let text = document.text();
        let prefix_start = text[..offset]
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_word_char(*c))
            .last()
            .map_or(offset, |(i, _)| i);
        let prefix = &text[prefix_start..offset];

        let mut words = BTreeSet::new();
        let mut start = None;
        for (i, c) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
            match (is_word_char(c), start) {
                (true, None) => start = Some(i),
                (false, Some(s)) => {
                    let word = &text[s..i];
                    if s != prefix_start
                        && word.chars().count() >= MIN_WORD_LENGTH
                        && word.starts_with(prefix)
                        && word != prefix
                    {
                        words.insert(word);
                    }
                    start = None;
                }
                _ => {}
            }
            if token.is_cancelled() {
                return Ok(None);
            }
        }

        Ok(Some(SuggestResult {
            items: words
                .into_iter()
                .map(|word| CompletionItem {
                    label: word.to_string(),
                    kind: Some(CompletionItemKind::TEXT),
                    ..Default::default()
                })
                .collect(),
            incomplete: false,
        }))
    }
}
