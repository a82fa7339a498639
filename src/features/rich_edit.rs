//! Editing data that needs no computation: brackets, comments, auto-closing.

use crate::lexer::Grammar;

/// Comment markers of a language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentSupport {
    pub line_comment: Option<String>,
    pub block_comment: Option<(String, String)>,
}

/// Static editing support for a language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichEditSupport {
    pub brackets: Vec<(String, String)>,
    pub comments: CommentSupport,
    /// Typing the first string inserts the second after the cursor.
    pub auto_closing_pairs: Vec<(String, String)>,
    /// Selected text is wrapped in these when the first string is typed.
    pub surrounding_pairs: Vec<(String, String)>,
    /// Characters that trigger re-indentation of the current line.
    pub electric_characters: Vec<char>,
}

impl RichEditSupport {
    /// Derive the support from a grammar's bracket and comment declarations.
    ///
    /// Auto-closing pairs default to the brackets when the grammar declares
    /// none; the closing character of every single-character bracket is
    /// electric.
    pub fn from_grammar(grammar: &Grammar) -> Self {
        let brackets: Vec<(String, String)> = grammar
            .brackets
            .iter()
            .map(|b| (b.open.clone(), b.close.clone()))
            .collect();

        let auto_closing_pairs = if grammar.auto_closing_pairs.is_empty() {
            brackets.clone()
        } else {
            grammar.auto_closing_pairs.clone()
        };

        let mut electric_characters: Vec<char> = brackets
            .iter()
            .filter_map(|(_, close)| single_char(close))
            .collect();
        electric_characters.dedup();

        Self {
            surrounding_pairs: auto_closing_pairs.clone(),
            brackets,
            comments: CommentSupport {
                line_comment: grammar.line_comment.clone(),
                block_comment: grammar.block_comment.clone(),
            },
            auto_closing_pairs,
            electric_characters,
        }
    }

    /// Text to insert after the cursor when `typed` was just typed.
    pub fn auto_close(&self, typed: &str) -> Option<&str> {
        self.auto_closing_pairs
            .iter()
            .find(|(open, _)| open == typed)
            .map(|(_, close)| close.as_str())
    }

    pub fn is_electric(&self, c: char) -> bool {
        self.electric_characters.contains(&c)
    }

    /// Net bracket nesting change across `text`, ignoring brackets that
    /// cannot be told apart from their partner.
    pub fn bracket_balance(&self, text: &str) -> i32 {
        self.brackets
            .iter()
            .filter(|(open, close)| open != close)
            .map(|(open, close)| {
                text.matches(open.as_str()).count() as i32
                    - text.matches(close.as_str()).count() as i32
            })
            .sum()
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}
