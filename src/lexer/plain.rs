//! Grammar-free tokenization for languages without a rule table.

use std::sync::Arc;

use crate::stream::CharStream;

use super::state::LexerState;
use super::{visible_line, LineTokens, ModeTransition, Token, TokenizationSupport};

const WHITESPACE: &str = " \t";
const SEPARATORS: &str = "()[]{}<>,;:.=+-*/\\\"'`!?&|^%#@~";

/// Splits lines into words, separators and whitespace runs.
///
/// Tokens are typed `white`, `delimiter` or `text`. The state never changes,
/// so every line tokenizes independently.
pub struct PlainTextTokenizer {
    language: Arc<str>,
    separators: String,
    whitespace: String,
}

impl PlainTextTokenizer {
    pub fn new(language: impl Into<Arc<str>>) -> Self {
        Self::with_rules(language, SEPARATORS, WHITESPACE)
    }

    pub fn with_rules(
        language: impl Into<Arc<str>>,
        separators: impl Into<String>,
        whitespace: impl Into<String>,
    ) -> Self {
        Self {
            language: language.into(),
            separators: separators.into(),
            whitespace: whitespace.into(),
        }
    }
}

impl TokenizationSupport for PlainTextTokenizer {
    fn language(&self) -> &str {
        &self.language
    }

    fn initial_state(&self) -> LexerState {
        LexerState::new("root")
    }

    fn tokenize(
        &self,
        line: &str,
        state: &LexerState,
        offset_delta: usize,
        stop_at_offset: Option<usize>,
    ) -> LineTokens {
        let line = visible_line(line, offset_delta, stop_at_offset);
        let mut stream = CharStream::new(line);
        stream.set_token_rules(&self.separators, &self.whitespace);

        let mut tokens: Vec<Token> = Vec::new();
        while !stream.eos() {
            let start = offset_delta + stream.pos();
            let token_type = if stream.skip_whitespace_len() > 0 {
                "white"
            } else {
                let token = stream.next_token();
                match token.chars().next() {
                    Some(c) if token.len() == c.len_utf8() && self.separators.contains(c) => {
                        "delimiter"
                    }
                    _ => "text",
                }
            };
            tokens.push(Token::new(start, token_type));
        }

        LineTokens {
            tokens,
            end_state: state.clone(),
            actual_stop_offset: offset_delta + stream.pos(),
            mode_transitions: vec![ModeTransition {
                start_index: offset_delta,
                language: Arc::clone(&self.language),
            }],
        }
    }
}
