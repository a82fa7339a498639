//! Line tokenization.
//!
//! A tokenizer turns one line of text plus the state the previous line ended
//! in into a list of typed tokens and the state the next line starts in.
//! Tokenizers for every language are looked up through a [`TokenizerRegistry`]
//! so a grammar can hand a region of a line to another language.

mod compile;
mod engine;
mod grammar;
mod plain;
mod state;

use std::sync::Arc;

use crate::registry::{DocumentSelector, LanguageFeatureRegistry, Registration};

pub use compile::{compile, BracketKind, CompileError, CompiledLexer};
pub use engine::MonarchTokenizer;
pub use grammar::{BracketDef, Grammar, MatchRule, RuleDef};
pub use plain::PlainTextTokenizer;
pub use state::LexerState;

/// A token: where it starts and what it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Byte offset of the first character, including the offset delta.
    pub start_index: usize,
    pub token_type: Arc<str>,
}

impl Token {
    pub fn new(start_index: usize, token_type: impl Into<Arc<str>>) -> Self {
        Self {
            start_index,
            token_type: token_type.into(),
        }
    }
}

/// Offset at which the active language changes within a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeTransition {
    pub start_index: usize,
    pub language: Arc<str>,
}

/// The result of tokenizing one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTokens {
    /// Tokens in strictly increasing `start_index` order.
    pub tokens: Vec<Token>,
    /// State to tokenize the next line from.
    pub end_state: LexerState,
    /// Absolute offset at which tokenization stopped.
    pub actual_stop_offset: usize,
    /// Language switches. The first entry names the language active at the
    /// start of the line; consecutive entries never name the same language.
    pub mode_transitions: Vec<ModeTransition>,
}

/// A tokenizer for one language.
pub trait TokenizationSupport: Send + Sync {
    /// Language id this tokenizer handles.
    fn language(&self) -> &str;

    /// State to tokenize the first line of a document from.
    fn initial_state(&self) -> LexerState;

    /// Tokenize `line`, starting in `state`.
    ///
    /// Every offset in the result is shifted by `offset_delta`. When
    /// `stop_at_offset` is given (absolute, like the result offsets),
    /// tokenization stops at or before it.
    fn tokenize(
        &self,
        line: &str,
        state: &LexerState,
        offset_delta: usize,
        stop_at_offset: Option<usize>,
    ) -> LineTokens;
}

/// Tokenizers by language id.
#[derive(Default)]
pub struct TokenizerRegistry {
    registry: LanguageFeatureRegistry<dyn TokenizationSupport>,
}

impl TokenizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `support` for the language it reports.
    pub fn register(&self, support: Arc<dyn TokenizationSupport>) -> Registration {
        let selector = DocumentSelector::language(support.language());
        self.registry.register(selector, support)
    }

    /// The best tokenizer for `language`, if any is registered.
    pub fn for_language(&self, language: &str) -> Option<Arc<dyn TokenizationSupport>> {
        self.registry
            .ordered_matching(language, None)
            .into_iter()
            .next()
    }

    pub fn registry(&self) -> &LanguageFeatureRegistry<dyn TokenizationSupport> {
        &self.registry
    }
}

/// Clamp `line` so that it ends at or before the absolute `stop_at_offset`,
/// on a character boundary.
pub(crate) fn visible_line(line: &str, offset_delta: usize, stop_at_offset: Option<usize>) -> &str {
    let Some(stop) = stop_at_offset else {
        return line;
    };
    let mut limit = stop.saturating_sub(offset_delta);
    if limit >= line.len() {
        return line;
    }
    while !line.is_char_boundary(limit) {
        limit -= 1;
    }
    &line[..limit]
}
