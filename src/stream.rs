//! Character stream over a single line of text.
//!
//! The stream is the primitive the tokenizers are built on: a cursor over one
//! line with conditional advance operations. Most conditional operations come
//! in pairs: one returns the consumed slice, the `_len` variant returns only
//! the consumed byte length so hot paths never need to look at the text.
//!
//! Positions are byte offsets into the line and always fall on character
//! boundaries. Advancing past the end of the line consumes nothing.

use regex::Regex;
use thiserror::Error;

/// Contract violations detected by the stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// `go_back` was asked to move before the start of the line.
    #[error("cannot go back {requested} characters from position {position}")]
    GoBackPastStart { requested: usize, position: usize },
}

/// A condition accepted by `advance_while` and `advance_until`.
#[derive(Debug, Clone, Copy)]
pub enum Condition<'c> {
    /// A literal string.
    Str(&'c str),
    /// A regular expression, matched at the current position. See
    /// [`CharStream::advance_if_regex`] for how it should be anchored.
    Regex(&'c Regex),
}

impl<'c> From<&'c str> for Condition<'c> {
    fn from(value: &'c str) -> Self {
        Condition::Str(value)
    }
}

impl<'c> From<&'c Regex> for Condition<'c> {
    fn from(value: &'c Regex) -> Self {
        Condition::Regex(value)
    }
}

/// Secondary coarse tokenization: separators are single tokens, whitespace
/// runs are one token, everything in between is one token.
#[derive(Debug, Clone)]
struct TokenRules {
    separators: Vec<char>,
    whitespace: Vec<char>,
}

impl Default for TokenRules {
    fn default() -> Self {
        Self {
            separators: Vec::new(),
            whitespace: vec![' ', '\t'],
        }
    }
}

impl TokenRules {
    fn is_separator(&self, c: char) -> bool {
        self.separators.contains(&c)
    }

    fn is_whitespace(&self, c: char) -> bool {
        self.whitespace.contains(&c)
    }
}

/// Cursor over one line of text.
#[derive(Debug, Clone)]
pub struct CharStream<'a> {
    line: &'a str,
    pos: usize,
    rules: TokenRules,
}

impl<'a> CharStream<'a> {
    /// Create a stream positioned at the start of `line`.
    pub fn new(line: &'a str) -> Self {
        Self {
            line,
            pos: 0,
            rules: TokenRules::default(),
        }
    }

    /// The full line this stream walks over.
    pub fn line(&self) -> &'a str {
        self.line
    }

    /// Current byte position.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// True when the stream is at the end of the line.
    pub fn eos(&self) -> bool {
        self.pos >= self.line.len()
    }

    /// The text from the current position to the end of the line.
    pub fn rest(&self) -> &'a str {
        &self.line[self.pos..]
    }

    /// The next character, without advancing.
    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// The next character, advancing past it.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Advance by `n` characters, returning the consumed text.
    pub fn advance(&mut self, n: usize) -> &'a str {
        let start = self.pos;
        let len = self
            .rest()
            .char_indices()
            .nth(n)
            .map(|(i, _)| i)
            .unwrap_or(self.rest().len());
        self.pos += len;
        &self.line[start..self.pos]
    }

    /// Advance to the end of the line, returning the consumed text.
    pub fn advance_to_eos(&mut self) -> &'a str {
        let rest = self.rest();
        self.pos = self.line.len();
        rest
    }

    /// Move back `n` characters.
    ///
    /// Moving before the start of the line is a lexer bug and is reported
    /// rather than clamped.
    pub fn go_back(&mut self, n: usize) -> Result<(), StreamError> {
        let before = &self.line[..self.pos];
        let mut chars = before.char_indices().rev();
        let mut target = self.pos;
        for _ in 0..n {
            match chars.next() {
                Some((i, _)) => target = i,
                None => {
                    let err = StreamError::GoBackPastStart {
                        requested: n,
                        position: self.pos,
                    };
                    tracing::error!(line = self.line, %err, "stream contract violation");
                    return Err(err);
                }
            }
        }
        self.pos = target;
        Ok(())
    }

    /// Move to an absolute byte position on this line.
    pub(crate) fn seek(&mut self, pos: usize) {
        debug_assert!(self.line.is_char_boundary(pos.min(self.line.len())));
        self.pos = pos.min(self.line.len());
    }

    fn take(&mut self, len: usize) -> &'a str {
        let start = self.pos;
        self.pos += len;
        &self.line[start..self.pos]
    }

    /// Advance past `c` if it is the next character.
    pub fn advance_if_char(&mut self, c: char) -> &'a str {
        let len = self.advance_if_char_len(c);
        &self.line[self.pos - len..self.pos]
    }

    /// Length-only variant of [`advance_if_char`](Self::advance_if_char).
    pub fn advance_if_char_len(&mut self, c: char) -> usize {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            c.len_utf8()
        } else {
            0
        }
    }

    /// Advance past `s` if the line continues with it.
    pub fn advance_if_str(&mut self, s: &str) -> &'a str {
        let len = self.advance_if_str_len(s);
        &self.line[self.pos - len..self.pos]
    }

    /// Length-only variant of [`advance_if_str`](Self::advance_if_str).
    pub fn advance_if_str_len(&mut self, s: &str) -> usize {
        if !s.is_empty() && self.rest().starts_with(s) {
            self.pos += s.len();
            s.len()
        } else {
            0
        }
    }

    /// Advance past `s` compared ASCII case-insensitively.
    pub fn advance_if_str_ci(&mut self, s: &str) -> &'a str {
        let len = self.advance_if_str_ci_len(s);
        &self.line[self.pos - len..self.pos]
    }

    /// Length-only variant of [`advance_if_str_ci`](Self::advance_if_str_ci).
    pub fn advance_if_str_ci_len(&mut self, s: &str) -> usize {
        match self.rest().get(..s.len()) {
            Some(candidate) if !s.is_empty() && candidate.eq_ignore_ascii_case(s) => {
                self.pos += s.len();
                s.len()
            }
            _ => 0,
        }
    }

    /// Advance past a match of `re` that starts at the current position.
    ///
    /// `re` is run against the rest of the line, so `^` anchors it at the
    /// current position. Patterns should be written as `^(?:...)`, the way the
    /// lexer compiles its rules. An unanchored pattern still only advances on a
    /// match at the current position, but a miss searches the whole rest of
    /// the line.
    pub fn advance_if_regex(&mut self, re: &Regex) -> &'a str {
        let len = self.advance_if_regex_len(re);
        &self.line[self.pos - len..self.pos]
    }

    /// Length-only variant of [`advance_if_regex`](Self::advance_if_regex).
    pub fn advance_if_regex_len(&mut self, re: &Regex) -> usize {
        match re.find(self.rest()) {
            Some(m) if m.start() == 0 => {
                self.pos += m.end();
                m.end()
            }
            _ => 0,
        }
    }

    fn advance_if_len(&mut self, condition: Condition<'_>) -> usize {
        match condition {
            Condition::Str(s) => self.advance_if_str_len(s),
            Condition::Regex(re) => self.advance_if_regex_len(re),
        }
    }

    /// Advance as long as `condition` keeps matching at the current position.
    pub fn advance_while<'c>(&mut self, condition: impl Into<Condition<'c>>) -> &'a str {
        let condition = condition.into();
        let start = self.pos;
        while !self.eos() && self.advance_if_len(condition) > 0 {}
        &self.line[start..self.pos]
    }

    /// Advance until `condition` matches, optionally consuming the match.
    ///
    /// Without a match the stream advances to the end of the line.
    pub fn advance_until<'c>(
        &mut self,
        condition: impl Into<Condition<'c>>,
        including: bool,
    ) -> &'a str {
        let found = match condition.into() {
            Condition::Str(s) if s.is_empty() => None,
            Condition::Str(s) => self.rest().find(s).map(|i| (i, s.len())),
            Condition::Regex(re) => re.find(self.rest()).map(|m| (m.start(), m.len())),
        };
        let len = match found {
            Some((start, len)) if including => start + len,
            Some((start, _)) => start,
            None => self.rest().len(),
        };
        self.take(len)
    }

    /// Literal fast path of [`advance_until`](Self::advance_until).
    pub fn advance_until_str(&mut self, s: &str, including: bool) -> &'a str {
        let len = self.advance_until_str_len(s, including);
        &self.line[self.pos - len..self.pos]
    }

    /// Length-only variant of [`advance_until_str`](Self::advance_until_str).
    pub fn advance_until_str_len(&mut self, s: &str, including: bool) -> usize {
        let len = match self.rest().find(s) {
            Some(i) if including && !s.is_empty() => i + s.len(),
            Some(i) if !s.is_empty() => i,
            _ => self.rest().len(),
        };
        self.pos += len;
        len
    }

    /// Configure the coarse token rules used by the token operations.
    ///
    /// For `set_token_rules("+-", " ")` the line `"123+456 -    7"` splits
    /// into `["123", "+", "456", " ", "-", "    ", "7"]`.
    pub fn set_token_rules(&mut self, separators: &str, whitespace: &str) {
        self.rules = TokenRules {
            separators: separators.chars().collect(),
            whitespace: whitespace.chars().collect(),
        };
    }

    fn token_len(&self) -> usize {
        let rest = self.rest();
        let mut chars = rest.char_indices();
        let Some((_, first)) = chars.next() else {
            return 0;
        };
        if self.rules.is_separator(first) {
            return first.len_utf8();
        }
        let in_whitespace = self.rules.is_whitespace(first);
        for (i, c) in chars {
            let boundary = if in_whitespace {
                !self.rules.is_whitespace(c)
            } else {
                self.rules.is_separator(c) || self.rules.is_whitespace(c)
            };
            if boundary {
                return i;
            }
        }
        rest.len()
    }

    /// The next coarse token, without advancing.
    pub fn peek_token(&self) -> &'a str {
        &self.rest()[..self.token_len()]
    }

    /// The next coarse token, advancing past it.
    pub fn next_token(&mut self) -> &'a str {
        let len = self.token_len();
        self.take(len)
    }

    fn whitespace_len(&self) -> usize {
        self.rest()
            .char_indices()
            .find(|(_, c)| !self.rules.is_whitespace(*c))
            .map(|(i, _)| i)
            .unwrap_or(self.rest().len())
    }

    /// The whitespace run at the current position, or `""`.
    pub fn peek_whitespace(&self) -> &'a str {
        &self.rest()[..self.whitespace_len()]
    }

    /// Skip the whitespace run at the current position.
    pub fn skip_whitespace(&mut self) -> &'a str {
        let len = self.whitespace_len();
        self.take(len)
    }

    /// Length-only variant of [`skip_whitespace`](Self::skip_whitespace).
    pub fn skip_whitespace_len(&mut self) -> usize {
        let len = self.whitespace_len();
        self.pos += len;
        len
    }
}
