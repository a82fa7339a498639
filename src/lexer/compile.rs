//! Grammar compilation.
//!
//! Compilation resolves `include` directives, expands `@attribute` references,
//! anchors every pattern at the stream position and validates every state
//! transition. All grammar problems surface here, once; a compiled lexer
//! never fails at tokenize time.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;

use crate::features::RichEditSupport;

use super::grammar::{Grammar, MatchRule, RuleDef};

/// Maximum nesting of attribute references inside attribute values.
const MAX_ATTRIBUTE_DEPTH: usize = 5;

/// A malformed grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("grammar `{grammar}` could not be read: {message}")]
    Malformed { grammar: String, message: String },

    #[error("grammar `{grammar}` declares no rule-states")]
    EmptyTokenizer { grammar: String },

    #[error("grammar `{grammar}`: start state `{state}` is not defined")]
    UnknownStartState { grammar: String, state: String },

    #[error("grammar `{grammar}`: state `{state}` includes undefined state `{target}`")]
    UnknownInclude {
        grammar: String,
        state: String,
        target: String,
    },

    #[error("grammar `{grammar}`: include cycle {cycle}")]
    IncludeCycle { grammar: String, cycle: String },

    #[error("grammar `{grammar}`: state `{state}` moves to undefined state `{target}`")]
    UnknownState {
        grammar: String,
        state: String,
        target: String,
    },

    #[error("grammar `{grammar}`: pattern `{pattern}` references undefined attribute `@{attribute}`")]
    UnknownAttribute {
        grammar: String,
        pattern: String,
        attribute: String,
    },

    #[error("grammar `{grammar}`: attribute references nest too deeply in `{pattern}`")]
    AttributeRecursion { grammar: String, pattern: String },

    #[error("grammar `{grammar}`: invalid pattern `{pattern}`: {message}")]
    InvalidPattern {
        grammar: String,
        pattern: String,
        message: String,
    },

    #[error("grammar `{grammar}`: invalid bracket kind `{kind}`, expected `@open` or `@close`")]
    InvalidBracket { grammar: String, kind: String },

    #[error("grammar `{grammar}`: state `{state}` uses `@brackets` but no brackets are declared")]
    NoBrackets { grammar: String, state: String },
}

/// Bracket classification attached to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketKind {
    Open,
    Close,
}

#[derive(Debug, Clone)]
pub(crate) enum TokenAction {
    Emit(Arc<str>),
    /// Consume nothing; only the state change applies.
    Rematch,
    /// Look the matched text up in the bracket table.
    Brackets,
}

#[derive(Debug, Clone)]
pub(crate) enum Transition {
    Push(Arc<str>),
    PushCurrent,
    Pop,
    PopAll,
}

#[derive(Debug, Clone)]
pub(crate) enum Embed {
    Enter(Arc<str>),
    Pop,
}

#[derive(Debug)]
pub(crate) struct CompiledRule {
    pub(crate) regex: Regex,
    /// Unanchored form, present only on rules that end an embedded region.
    pub(crate) leave: Option<Regex>,
    pub(crate) token: TokenAction,
    pub(crate) next: Option<Transition>,
    pub(crate) switch_to: Option<Arc<str>>,
    pub(crate) bracket: Option<BracketKind>,
    pub(crate) embed: Option<Embed>,
}

#[derive(Debug)]
pub(crate) struct CompiledBracket {
    pub(crate) open: String,
    pub(crate) close: String,
    pub(crate) token: Arc<str>,
}

/// A grammar compiled into a runnable state machine.
#[derive(Debug)]
pub struct CompiledLexer {
    pub(crate) language: Arc<str>,
    pub(crate) default_token: Arc<str>,
    pub(crate) start: Arc<str>,
    pub(crate) states: HashMap<Arc<str>, Vec<Arc<CompiledRule>>>,
    pub(crate) brackets: Vec<CompiledBracket>,
    rich_edit: RichEditSupport,
}

impl CompiledLexer {
    /// Language id of the grammar.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Name of the rule-state tokenization starts in.
    pub fn start_state(&self) -> &str {
        &self.start
    }

    /// Names of every rule-state, sorted.
    pub fn state_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.states.keys().map(|name| &**name).collect();
        names.sort_unstable();
        names
    }

    /// Rich-edit data (brackets, comments, auto-closing pairs) of the grammar.
    pub fn rich_edit_support(&self) -> &RichEditSupport {
        &self.rich_edit
    }

    pub(crate) fn rules(&self, state: &str) -> &[Arc<CompiledRule>] {
        self.states.get(state).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn bracket_for(&self, text: &str) -> Option<(&CompiledBracket, BracketKind)> {
        self.brackets.iter().find_map(|b| {
            if b.open == text {
                Some((b, BracketKind::Open))
            } else if b.close == text {
                Some((b, BracketKind::Close))
            } else {
                None
            }
        })
    }
}

/// Compile a grammar into a lexer.
pub fn compile(grammar: &Grammar) -> Result<CompiledLexer, CompileError> {
    Compiler::new(grammar).run()
}

/// An entry of a state before includes are resolved.
enum Pending {
    Rule(Arc<CompiledRule>),
    Include(String),
}

struct Compiler<'g> {
    grammar: &'g Grammar,
    postfix: &'g str,
}

impl<'g> Compiler<'g> {
    fn new(grammar: &'g Grammar) -> Self {
        Self {
            grammar,
            postfix: grammar.token_postfix.as_deref().unwrap_or(""),
        }
    }

    fn name(&self) -> String {
        self.grammar.name.clone()
    }

    fn run(self) -> Result<CompiledLexer, CompileError> {
        let grammar = self.grammar;
        if grammar.tokenizer.is_empty() {
            return Err(CompileError::EmptyTokenizer { grammar: self.name() });
        }

        let start = grammar.start.as_deref().unwrap_or("root");
        let start = start.strip_prefix('@').unwrap_or(start);
        if !grammar.tokenizer.contains_key(start) {
            return Err(CompileError::UnknownStartState {
                grammar: self.name(),
                state: start.to_string(),
            });
        }

        let mut pending: BTreeMap<&str, Vec<Pending>> = BTreeMap::new();
        for (state, rules) in &grammar.tokenizer {
            let mut entries = Vec::with_capacity(rules.len());
            for rule in rules {
                entries.push(match rule {
                    RuleDef::Include { include } => {
                        Pending::Include(state_ref(include).to_string())
                    }
                    RuleDef::Match(rule) => {
                        Pending::Rule(Arc::new(self.compile_rule(state, rule)?))
                    }
                });
            }
            pending.insert(state, entries);
        }

        let mut resolved: HashMap<String, Vec<Arc<CompiledRule>>> = HashMap::new();
        for state in pending.keys() {
            let mut chain = Vec::new();
            self.resolve(state, &pending, &mut resolved, &mut chain)?;
        }

        let states = resolved
            .into_iter()
            .map(|(name, rules)| (Arc::from(name), rules))
            .collect();

        let brackets = grammar
            .brackets
            .iter()
            .map(|b| CompiledBracket {
                open: b.open.clone(),
                close: b.close.clone(),
                token: self.decorate(&b.token),
            })
            .collect();

        tracing::debug!(language = %grammar.name, "compiled grammar");

        Ok(CompiledLexer {
            language: Arc::from(grammar.name.as_str()),
            default_token: self.decorate(&grammar.default_token),
            start: Arc::from(start),
            states,
            brackets,
            rich_edit: RichEditSupport::from_grammar(grammar),
        })
    }

    /// Splice includes depth-first; `chain` holds the states being resolved.
    fn resolve(
        &self,
        state: &str,
        pending: &BTreeMap<&str, Vec<Pending>>,
        resolved: &mut HashMap<String, Vec<Arc<CompiledRule>>>,
        chain: &mut Vec<String>,
    ) -> Result<Vec<Arc<CompiledRule>>, CompileError> {
        if let Some(rules) = resolved.get(state) {
            return Ok(rules.clone());
        }
        if chain.iter().any(|s| s == state) {
            chain.push(state.to_string());
            return Err(CompileError::IncludeCycle {
                grammar: self.name(),
                cycle: chain.join(" -> "),
            });
        }

        chain.push(state.to_string());
        let mut rules = Vec::new();
        for entry in &pending[state] {
            match entry {
                Pending::Rule(rule) => rules.push(Arc::clone(rule)),
                Pending::Include(target) => {
                    if !pending.contains_key(target.as_str()) {
                        return Err(CompileError::UnknownInclude {
                            grammar: self.name(),
                            state: state.to_string(),
                            target: target.clone(),
                        });
                    }
                    rules.extend(self.resolve(target, pending, resolved, chain)?);
                }
            }
        }
        chain.pop();

        resolved.insert(state.to_string(), rules.clone());
        Ok(rules)
    }

    fn compile_rule(&self, state: &str, rule: &MatchRule) -> Result<CompiledRule, CompileError> {
        let pattern = self.expand(&rule.regex, 0)?;
        let case = if self.grammar.ignore_case { "(?i)" } else { "" };
        let regex = self.regex(&rule.regex, &format!("{case}^(?:{pattern})"))?;

        let token = match rule.token.as_deref() {
            Some("@rematch") => TokenAction::Rematch,
            Some("@brackets") => {
                if self.grammar.brackets.is_empty() {
                    return Err(CompileError::NoBrackets {
                        grammar: self.name(),
                        state: state.to_string(),
                    });
                }
                TokenAction::Brackets
            }
            Some(token) => TokenAction::Emit(self.decorate(token)),
            None => TokenAction::Emit(Arc::from("")),
        };

        let next = match rule.next.as_deref() {
            None => None,
            Some("@pop") => Some(Transition::Pop),
            Some("@popall") => Some(Transition::PopAll),
            Some("@push") => Some(Transition::PushCurrent),
            Some(target) => Some(Transition::Push(self.target(state, target)?)),
        };

        let switch_to = rule
            .switch_to
            .as_deref()
            .map(|target| self.target(state, target))
            .transpose()?;

        let bracket = match rule.bracket.as_deref() {
            None => None,
            Some("@open") => Some(BracketKind::Open),
            Some("@close") => Some(BracketKind::Close),
            Some(kind) => {
                return Err(CompileError::InvalidBracket {
                    grammar: self.name(),
                    kind: kind.to_string(),
                })
            }
        };

        let embed = match rule.next_embedded.as_deref() {
            None => None,
            Some("@pop") => Some(Embed::Pop),
            Some(language) => Some(Embed::Enter(Arc::from(language))),
        };

        let leave = match embed {
            Some(Embed::Pop) => Some(self.regex(&rule.regex, &format!("{case}(?:{pattern})"))?),
            _ => None,
        };

        Ok(CompiledRule {
            regex,
            leave,
            token,
            next,
            switch_to,
            bracket,
            embed,
        })
    }

    fn target(&self, state: &str, target: &str) -> Result<Arc<str>, CompileError> {
        let name = state_ref(target);
        if self.grammar.tokenizer.contains_key(name) {
            Ok(Arc::from(name))
        } else {
            Err(CompileError::UnknownState {
                grammar: self.name(),
                state: state.to_string(),
                target: target.to_string(),
            })
        }
    }

    fn regex(&self, original: &str, pattern: &str) -> Result<Regex, CompileError> {
        Regex::new(pattern).map_err(|e| CompileError::InvalidPattern {
            grammar: self.name(),
            pattern: original.to_string(),
            message: e.to_string(),
        })
    }

    fn decorate(&self, token: &str) -> Arc<str> {
        if token.is_empty() || self.postfix.is_empty() {
            Arc::from(token)
        } else {
            Arc::from(format!("{token}{}", self.postfix))
        }
    }

    /// Replace `@name` with the named attribute. `\@` is a literal `@`.
    fn expand(&self, pattern: &str, depth: usize) -> Result<String, CompileError> {
        if depth > MAX_ATTRIBUTE_DEPTH {
            return Err(CompileError::AttributeRecursion {
                grammar: self.name(),
                pattern: pattern.to_string(),
            });
        }

        let mut out = String::with_capacity(pattern.len());
        let mut chars = pattern.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' if matches!(chars.peek(), Some((_, '@'))) => {
                    chars.next();
                    out.push('@');
                }
                '\\' => {
                    out.push(c);
                    if let Some((_, escaped)) = chars.next() {
                        out.push(escaped);
                    }
                }
                '@' => {
                    let rest = &pattern[i + 1..];
                    let len = rest
                        .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                        .unwrap_or(rest.len());
                    if len == 0 {
                        out.push('@');
                        continue;
                    }
                    let attribute = &rest[..len];
                    let value = self.grammar.attributes.get(attribute).ok_or_else(|| {
                        CompileError::UnknownAttribute {
                            grammar: self.name(),
                            pattern: pattern.to_string(),
                            attribute: attribute.to_string(),
                        }
                    })?;
                    out.push_str("(?:");
                    out.push_str(&self.expand(value, depth + 1)?);
                    out.push(')');
                    for _ in 0..attribute.chars().count() {
                        chars.next();
                    }
                }
                _ => out.push(c),
            }
        }
        Ok(out)
    }
}

fn state_ref(name: &str) -> &str {
    name.strip_prefix('@').unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(rules: Vec<RuleDef>) -> Grammar {
        Grammar::new("test").state("root", rules)
    }

    #[test]
    fn compiles_simple_grammar() {
        let lexer = compile(&root(vec![
            RuleDef::rule(r"\d+", "number"),
            RuleDef::rule("[a-z]+", "word"),
        ]))
        .unwrap();
        assert_eq!(lexer.language(), "test");
        assert_eq!(lexer.start_state(), "root");
        assert_eq!(lexer.rules("root").len(), 2);
    }

    #[test]
    fn includes_are_spliced_in_order() {
        let grammar = Grammar::new("test")
            .state(
                "root",
                vec![
                    RuleDef::rule("a", "a"),
                    RuleDef::include("@shared"),
                    RuleDef::rule("z", "z"),
                ],
            )
            .state(
                "shared",
                vec![RuleDef::rule("b", "b"), RuleDef::include("leaf")],
            )
            .state("leaf", vec![RuleDef::rule("c", "c")]);
        let lexer = compile(&grammar).unwrap();
        let tokens: Vec<String> = lexer
            .rules("root")
            .iter()
            .map(|r| match &r.token {
                TokenAction::Emit(t) => t.to_string(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(tokens, vec!["a", "b", "c", "z"]);
    }

    #[test]
    fn include_cycle_is_a_compile_error() {
        let grammar = Grammar::new("test")
            .state("root", vec![RuleDef::include("@a")])
            .state("a", vec![RuleDef::include("@b")])
            .state("b", vec![RuleDef::include("@a")]);
        let err = compile(&grammar).unwrap_err();
        assert!(matches!(err, CompileError::IncludeCycle { .. }), "{err}");
        assert!(err.to_string().contains("a -> b -> a"), "{err}");
    }

    #[test]
    fn unknown_include_is_a_compile_error() {
        let err = compile(&root(vec![RuleDef::include("@missing")])).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownInclude {
                grammar: "test".into(),
                state: "root".into(),
                target: "missing".into(),
            }
        );
    }

    #[test]
    fn unknown_next_state_is_a_compile_error() {
        let err = compile(&root(vec![RuleDef::rule("x", "x").next("@nowhere")])).unwrap_err();
        assert!(matches!(err, CompileError::UnknownState { .. }));
    }

    #[test]
    fn invalid_regex_is_a_compile_error() {
        let err = compile(&root(vec![RuleDef::rule("(", "x")])).unwrap_err();
        assert!(matches!(err, CompileError::InvalidPattern { .. }));
    }

    #[test]
    fn empty_and_missing_start() {
        assert!(matches!(
            compile(&Grammar::new("empty")).unwrap_err(),
            CompileError::EmptyTokenizer { .. }
        ));
        let mut grammar = root(vec![RuleDef::rule("x", "x")]);
        grammar.start = Some("main".into());
        assert!(matches!(
            compile(&grammar).unwrap_err(),
            CompileError::UnknownStartState { .. }
        ));
    }

    #[test]
    fn brackets_token_requires_brackets() {
        let err = compile(&root(vec![RuleDef::rule("[()]", "@brackets")])).unwrap_err();
        assert!(matches!(err, CompileError::NoBrackets { .. }));

        let ok = root(vec![RuleDef::rule("[()]", "@brackets")]).bracket("(", ")", "paren");
        assert!(compile(&ok).is_ok());
    }

    #[test]
    fn invalid_bracket_kind() {
        let err = compile(&root(vec![RuleDef::rule("x", "x").bracket("open")])).unwrap_err();
        assert!(matches!(err, CompileError::InvalidBracket { .. }));
    }

    #[test]
    fn attributes_expand() {
        let grammar = root(vec![RuleDef::rule(r"\@@ident", "variable")])
            .attribute("ident", "@letter+")
            .attribute("letter", "[a-z]");
        let lexer = compile(&grammar).unwrap();
        let rule = &lexer.rules("root")[0];
        assert!(rule.regex.is_match("@abc"));
        assert!(!rule.regex.is_match("abc"));
    }

    #[test]
    fn unknown_attribute_is_a_compile_error() {
        let err = compile(&root(vec![RuleDef::rule("@nope", "x")])).unwrap_err();
        assert!(matches!(err, CompileError::UnknownAttribute { ref attribute, .. } if attribute == "nope"));
    }

    #[test]
    fn recursive_attribute_is_a_compile_error() {
        let grammar = root(vec![RuleDef::rule("@a", "x")]).attribute("a", "@a");
        assert!(matches!(
            compile(&grammar).unwrap_err(),
            CompileError::AttributeRecursion { .. }
        ));
    }

    #[test]
    fn postfix_decorates_non_empty_tokens() {
        let mut grammar = root(vec![RuleDef::rule("x", "keyword"), RuleDef::rule(" ", "")]);
        grammar.token_postfix = Some(".calc".into());
        let lexer = compile(&grammar).unwrap();
        let tokens: Vec<String> = lexer
            .rules("root")
            .iter()
            .map(|r| match &r.token {
                TokenAction::Emit(t) => t.to_string(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(tokens, vec!["keyword.calc", ""]);
    }

    #[test]
    fn leave_regex_only_on_embedded_pop() {
        let lexer = compile(&root(vec![
            RuleDef::rule("`", "@rematch").next_embedded("@pop"),
            RuleDef::rule("x", "x"),
        ]))
        .unwrap();
        let rules = lexer.rules("root");
        assert!(rules[0].leave.is_some());
        assert!(rules[1].leave.is_none());
    }
}
