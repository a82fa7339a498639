//! Semantic tokens from cached line tokens.

use tower_lsp::lsp_types::{SemanticToken, SemanticTokenType, SemanticTokensLegend};

use crate::document::{LineIndex, TokenizedLines};

/// Token type indices (must match LEGEND order).
pub mod token_types {
    pub const KEYWORD: u32 = 0;
    pub const NUMBER: u32 = 1;
    pub const STRING: u32 = 2;
    pub const OPERATOR: u32 = 3;
    pub const VARIABLE: u32 = 4;
    pub const COMMENT: u32 = 5;
    pub const PROPERTY: u32 = 6;
    pub const CLASS: u32 = 7;
    pub const ENUM_MEMBER: u32 = 8;
    pub const PUNCTUATION: u32 = 9;
}

/// Get the semantic tokens legend for capability declaration.
pub fn legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: vec![
            SemanticTokenType::KEYWORD,
            SemanticTokenType::NUMBER,
            SemanticTokenType::STRING,
            SemanticTokenType::OPERATOR,
            SemanticTokenType::VARIABLE,
            SemanticTokenType::COMMENT,
            SemanticTokenType::PROPERTY,
            SemanticTokenType::CLASS,
            SemanticTokenType::ENUM_MEMBER,
            SemanticTokenType::new("punctuation"),
        ],
        token_modifiers: vec![],
    }
}

/// Legend index for a dotted token type such as `attribute.name.less`.
/// Types with no counterpart (plain text, whitespace) are not highlighted.
pub fn classify(token_type: &str) -> Option<u32> {
    let mut segments = token_type.split('.');
    let kind = match (segments.next()?, segments.next()) {
        ("keyword", _) => token_types::KEYWORD,
        ("number", _) => token_types::NUMBER,
        ("string", _) => token_types::STRING,
        ("operator", _) => token_types::OPERATOR,
        ("variable" | "identifier", _) => token_types::VARIABLE,
        ("comment", _) => token_types::COMMENT,
        ("attribute", Some("value")) => token_types::ENUM_MEMBER,
        ("attribute", _) => token_types::PROPERTY,
        ("tag" | "type", _) => token_types::CLASS,
        ("delimiter", _) => token_types::PUNCTUATION,
        _ => return None,
    };
    Some(kind)
}

/// A classified token, as byte offsets into the document.
#[derive(Debug, Clone)]
struct RawToken {
    start: usize,
    end: usize,
    token_type: u32,
}

/// Semantic tokens for every tokenized line of a document.
pub fn tokens_for_lines(line_index: &LineIndex, lines: &TokenizedLines) -> Vec<SemanticToken> {
    let mut raw = Vec::new();
    for (line, tokens) in lines.iter().enumerate() {
        let (Some(line_start), Some(range)) =
            (line_index.line_start(line), line_index.line_range(line))
        else {
            break;
        };
        let line_end = tokens.actual_stop_offset.min(range.len());

        for (i, token) in tokens.tokens.iter().enumerate() {
            let end = tokens
                .tokens
                .get(i + 1)
                .map_or(line_end, |next| next.start_index)
                .min(line_end);
            if token.start_index >= end {
                continue;
            }
            if let Some(token_type) = classify(&token.token_type) {
                raw.push(RawToken {
                    start: line_start + token.start_index,
                    end: line_start + end,
                    token_type,
                });
            }
        }
    }
    encode_tokens(&raw, line_index)
}

/// Convert raw tokens to delta-encoded semantic tokens.
fn encode_tokens(tokens: &[RawToken], line_index: &LineIndex) -> Vec<SemanticToken> {
    let mut result = Vec::with_capacity(tokens.len());
    let mut prev_line = 0u32;
    let mut prev_start = 0u32;

    for token in tokens {
        let pos = line_index.offset_to_position(token.start);
        let end = line_index.offset_to_position(token.end);
        let delta_line = pos.line - prev_line;
        let delta_start = if delta_line == 0 {
            pos.character - prev_start
        } else {
            pos.character
        };

        result.push(SemanticToken {
            delta_line,
            delta_start,
            length: end.character.saturating_sub(pos.character),
            token_type: token.token_type,
            token_modifiers_bitset: 0,
        });

        prev_line = pos.line;
        prev_start = pos.character;
    }

    result
}
