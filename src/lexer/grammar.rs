//! Declarative grammar definitions.
//!
//! A grammar is a table of named rule-states, each an ordered list of rules.
//! Grammars are plain data: they deserialize from TOML and can also be built
//! in code with the constructors below.
//!
//! ```toml
//! name = "calc"
//! default_token = "invalid"
//!
//! [attributes]
//! digits = '\d+'
//!
//! [[tokenizer.root]]
//! regex = '@digits'
//! token = "number"
//!
//! [[tokenizer.root]]
//! regex = '/\*'
//! token = "comment"
//! next = "@comment"
//!
//! [[tokenizer.comment]]
//! regex = '\*/'
//! token = "comment"
//! next = "@pop"
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;

/// A complete, uncompiled grammar.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Grammar {
    /// Language id this grammar tokenizes.
    pub name: String,

    /// Token type for text no rule matches.
    #[serde(default)]
    pub default_token: String,

    /// Appended verbatim to every non-empty token type, for example `.less`.
    #[serde(default)]
    pub token_postfix: Option<String>,

    /// Compile every pattern case-insensitively.
    #[serde(default)]
    pub ignore_case: bool,

    /// Rule-state to start in. Defaults to `root`.
    #[serde(default)]
    pub start: Option<String>,

    /// Named regex fragments, referenced as `@name` inside patterns.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Bracket pairs used by `@brackets` rules and rich-edit support.
    #[serde(default)]
    pub brackets: Vec<BracketDef>,

    #[serde(default)]
    pub line_comment: Option<String>,

    #[serde(default)]
    pub block_comment: Option<(String, String)>,

    /// Pairs the editor closes automatically. Defaults to the brackets.
    #[serde(default)]
    pub auto_closing_pairs: Vec<(String, String)>,

    /// Rule-states by name.
    #[serde(default)]
    pub tokenizer: BTreeMap<String, Vec<RuleDef>>,
}

/// An open/close bracket pair and the token type it is emitted as.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BracketDef {
    pub open: String,
    pub close: String,
    pub token: String,
}

/// A single entry in a rule-state.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RuleDef {
    /// Splice in the rules of another rule-state.
    Include { include: String },
    /// Match a pattern and apply an action.
    Match(MatchRule),
}

/// A pattern with the action taken when it matches.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchRule {
    pub regex: String,

    /// Token type, or `@rematch` / `@brackets`.
    #[serde(default)]
    pub token: Option<String>,

    /// `@pop`, `@popall`, `@push` or a rule-state name to push.
    #[serde(default)]
    pub next: Option<String>,

    /// Rule-state that replaces the top of the stack.
    #[serde(default)]
    pub switch_to: Option<String>,

    /// `@open` or `@close`.
    #[serde(default)]
    pub bracket: Option<String>,

    /// Language id to embed after this token, or `@pop` to return to the host.
    #[serde(default)]
    pub next_embedded: Option<String>,
}

impl Grammar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add or replace a rule-state.
    pub fn state(mut self, name: impl Into<String>, rules: Vec<RuleDef>) -> Self {
        self.tokenizer.insert(name.into(), rules);
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), pattern.into());
        self
    }

    pub fn bracket(
        mut self,
        open: impl Into<String>,
        close: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        self.brackets.push(BracketDef {
            open: open.into(),
            close: close.into(),
            token: token.into(),
        });
        self
    }

    pub fn default_token(mut self, token: impl Into<String>) -> Self {
        self.default_token = token.into();
        self
    }

    /// Parse a grammar from TOML text.
    pub fn from_toml(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

impl RuleDef {
    /// A rule emitting `token` when `regex` matches.
    pub fn rule(regex: impl Into<String>, token: impl Into<String>) -> Self {
        RuleDef::Match(MatchRule {
            regex: regex.into(),
            token: Some(token.into()),
            ..Default::default()
        })
    }

    pub fn include(state: impl Into<String>) -> Self {
        RuleDef::Include {
            include: state.into(),
        }
    }

    /// Set the rule-state to push (or `@pop`, `@popall`, `@push`).
    pub fn next(self, next: impl Into<String>) -> Self {
        self.map_match(|m| m.next = Some(next.into()))
    }

    pub fn switch_to(self, state: impl Into<String>) -> Self {
        self.map_match(|m| m.switch_to = Some(state.into()))
    }

    /// Set the bracket classification: `@open` or `@close`.
    pub fn bracket(self, kind: impl Into<String>) -> Self {
        self.map_match(|m| m.bracket = Some(kind.into()))
    }

    pub fn next_embedded(self, language: impl Into<String>) -> Self {
        self.map_match(|m| m.next_embedded = Some(language.into()))
    }

    fn map_match(self, f: impl FnOnce(&mut MatchRule)) -> Self {
        match self {
            RuleDef::Match(mut rule) => {
                f(&mut rule);
                RuleDef::Match(rule)
            }
            include => include,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_toml_grammar() {
        let grammar = Grammar::from_toml(
            r#"
name = "calc"
default_token = "invalid"
brackets = [{ open = "(", close = ")", token = "paren" }]
block_comment = ["/*", "*/"]

[attributes]
digits = '\d+'

[[tokenizer.root]]
include = "@numbers"

[[tokenizer.root]]
regex = '[()]'
token = "@brackets"

[[tokenizer.numbers]]
regex = '@digits'
token = "number"
next = "@pop"
"#,
        )
        .unwrap();

        assert_eq!(grammar.name, "calc");
        assert_eq!(grammar.default_token, "invalid");
        assert_eq!(grammar.brackets.len(), 1);
        assert_eq!(
            grammar.block_comment,
            Some(("/*".to_string(), "*/".to_string()))
        );
        assert_eq!(grammar.attributes["digits"], r"\d+");

        let root = &grammar.tokenizer["root"];
        assert!(matches!(&root[0], RuleDef::Include { include } if include == "@numbers"));
        assert!(matches!(&root[1], RuleDef::Match(m) if m.token.as_deref() == Some("@brackets")));

        let numbers = &grammar.tokenizer["numbers"];
        assert!(matches!(&numbers[0], RuleDef::Match(m) if m.next.as_deref() == Some("@pop")));
    }

    #[test]
    fn builder_sets_actions() {
        let rule = RuleDef::rule("`", "backtick")
            .bracket("@open")
            .next("@js")
            .next_embedded("javascript");
        let RuleDef::Match(rule) = rule else {
            panic!("expected a match rule");
        };
        assert_eq!(rule.bracket.as_deref(), Some("@open"));
        assert_eq!(rule.next.as_deref(), Some("@js"));
        assert_eq!(rule.next_embedded.as_deref(), Some("javascript"));
    }
}
