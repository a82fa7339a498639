//! Per-line token cache.

use std::ops::Range;
use std::sync::Arc;

use crate::lexer::{LexerState, LineTokens, TokenizationSupport};

#[derive(Debug, Clone)]
struct CachedLine {
    text: String,
    /// State the line was tokenized from; `None` until it has been.
    start_state: Option<LexerState>,
    tokens: Option<LineTokens>,
}

impl CachedLine {
    fn pending(text: &str) -> Self {
        Self {
            text: text.to_string(),
            start_state: None,
            tokens: None,
        }
    }
}

/// Tokens for every line of a document.
///
/// Line `n + 1` is always tokenized from the end state of line `n`. After an
/// edit, lines are re-tokenized from the first changed line until a line's
/// new start state equals the one it was tokenized from before; everything
/// after that is unaffected.
#[derive(Clone)]
pub struct TokenizedLines {
    tokenizer: Arc<dyn TokenizationSupport>,
    max_line_length: Option<usize>,
    lines: Vec<CachedLine>,
}

impl TokenizedLines {
    pub fn new(
        tokenizer: Arc<dyn TokenizationSupport>,
        max_line_length: Option<usize>,
        text: &str,
    ) -> Self {
        let mut lines = Self {
            tokenizer,
            max_line_length,
            lines: Vec::new(),
        };
        let all: Vec<&str> = split_lines(text).collect();
        lines.apply_change(0, 0, &all);
        lines
    }

    pub fn language(&self) -> &str {
        self.tokenizer.language()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, line: usize) -> Option<&LineTokens> {
        self.lines.get(line)?.tokens.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LineTokens> + '_ {
        self.lines.iter().filter_map(|line| line.tokens.as_ref())
    }

    /// Replace `removed` lines starting at `first_line` with `inserted` and
    /// re-tokenize. Returns the range of lines that were tokenized again.
    pub fn apply_change(
        &mut self,
        first_line: usize,
        removed: usize,
        inserted: &[&str],
    ) -> Range<usize> {
        let first_line = first_line.min(self.lines.len());
        let removed = removed.min(self.lines.len() - first_line);
        self.lines.splice(
            first_line..first_line + removed,
            inserted.iter().map(|text| CachedLine::pending(text)),
        );

        let mut state = match first_line.checked_sub(1) {
            Some(previous) => self.lines[previous]
                .tokens
                .as_ref()
                .map(|t| t.end_state.clone())
                .unwrap_or_else(|| self.tokenizer.initial_state()),
            None => self.tokenizer.initial_state(),
        };

        let edited_end = first_line + inserted.len();
        let mut line = first_line;
        while line < self.lines.len() {
            let cached = &mut self.lines[line];
            if line >= edited_end && cached.start_state.as_ref() == Some(&state) {
                break;
            }

            let stop = self
                .max_line_length
                .filter(|&max| cached.text.len() > max);
            let tokens = self.tokenizer.tokenize(&cached.text, &state, 0, stop);
            let next = tokens.end_state.clone();
            cached.start_state = Some(std::mem::replace(&mut state, next));
            cached.tokens = Some(tokens);
            line += 1;
        }

        tracing::debug!(
            language = self.tokenizer.language(),
            first = first_line,
            last = line,
            "retokenized lines"
        );
        first_line..line
    }

    /// Bring the cache in line with `text`, re-tokenizing only what changed.
    pub fn update(&mut self, text: &str) -> Range<usize> {
        let new_lines: Vec<&str> = split_lines(text).collect();

        let prefix = self
            .lines
            .iter()
            .zip(&new_lines)
            .take_while(|(old, new)| old.text == **new)
            .count();
        let max_suffix = (self.lines.len() - prefix).min(new_lines.len() - prefix);
        let suffix = self
            .lines
            .iter()
            .rev()
            .zip(new_lines.iter().rev())
            .take(max_suffix)
            .take_while(|(old, new)| old.text == **new)
            .count();

        let removed = self.lines.len() - prefix - suffix;
        let inserted = &new_lines[prefix..new_lines.len() - suffix];
        self.apply_change(prefix, removed, inserted)
    }
}

fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
}
