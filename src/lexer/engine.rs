//! Execution of compiled grammars.

use std::sync::{Arc, Weak};

use crate::stream::CharStream;

use super::compile::{
    compile, BracketKind, CompileError, CompiledLexer, CompiledRule, Embed, TokenAction,
    Transition,
};
use super::grammar::Grammar;
use super::state::LexerState;
use super::{visible_line, LineTokens, ModeTransition, Token, TokenizationSupport, TokenizerRegistry};

/// Consecutive steps without progress before a character is forced out.
const MAX_STALLED_STEPS: usize = 16;

/// A tokenizer driven by a compiled grammar.
///
/// Regions handed to another language through `next_embedded` are tokenized
/// by whatever tokenizer the registry holds for that language.
#[derive(Clone)]
pub struct MonarchTokenizer {
    lexer: Arc<CompiledLexer>,
    embedded: Option<Weak<TokenizerRegistry>>,
}

impl MonarchTokenizer {
    pub fn new(lexer: CompiledLexer) -> Self {
        Self {
            lexer: Arc::new(lexer),
            embedded: None,
        }
    }

    pub fn from_grammar(grammar: &Grammar) -> Result<Self, CompileError> {
        Ok(Self::new(compile(grammar)?))
    }

    /// Resolve embedded languages through `registry`.
    pub fn with_embedded(mut self, registry: &Arc<TokenizerRegistry>) -> Self {
        self.embedded = Some(Arc::downgrade(registry));
        self
    }

    pub fn lexer(&self) -> &CompiledLexer {
        &self.lexer
    }

    fn resolve(&self, language: &str) -> Option<Arc<dyn TokenizationSupport>> {
        let registry = self.embedded.as_ref()?.upgrade()?;
        registry.for_language(language)
    }

    /// Earliest offset at or after `from` where a rule of the host's current
    /// rule-state would end the embedded region.
    fn embedded_end(&self, line: &str, from: usize, state: &LexerState) -> usize {
        self.lexer
            .rules(state.current())
            .iter()
            .filter_map(|rule| rule.leave.as_ref())
            .filter_map(|leave| leave.find(&line[from..]))
            .map(|m| from + m.start())
            .min()
            .unwrap_or(line.len())
    }

    fn find_rule<'r>(&'r self, state: &LexerState, rest: &str) -> Option<(&'r CompiledRule, usize)> {
        self.lexer
            .rules(state.current())
            .iter()
            .find_map(|rule| rule.regex.find(rest).map(|m| (&**rule, m.end())))
    }

    fn apply(
        &self,
        rule: &CompiledRule,
        text: &str,
        start: usize,
        mut state: LexerState,
        sink: &mut TokenSink,
    ) -> LexerState {
        let (token, mut bracket) = match &rule.token {
            TokenAction::Emit(token) => (Some(Arc::clone(token)), None),
            TokenAction::Rematch => (None, None),
            TokenAction::Brackets => match self.lexer.bracket_for(text) {
                Some((b, kind)) => (Some(Arc::clone(&b.token)), Some(kind)),
                None => (Some(Arc::clone(&self.lexer.default_token)), None),
            },
        };
        if rule.bracket.is_some() {
            bracket = rule.bracket;
        }

        if let Some(token) = token.filter(|_| !text.is_empty()) {
            sink.language(start, &self.lexer.language);
            sink.token(start, token, bracket.is_some());
        }

        state = match bracket {
            Some(BracketKind::Open) => state.open_bracket(),
            Some(BracketKind::Close) => state.close_bracket(),
            None => state,
        };

        if let Some(target) = &rule.switch_to {
            state = state.switch_to(Arc::clone(target));
        }

        state = match &rule.next {
            Some(Transition::Push(target)) => state.push(Arc::clone(target)),
            Some(Transition::PushCurrent) => state.push(Arc::from(state.current())),
            Some(Transition::Pop) => state.pop(),
            Some(Transition::PopAll) => state.pop_all(),
            None => state,
        };

        match &rule.embed {
            Some(Embed::Enter(language)) => match self.resolve(language) {
                Some(inner) => state.enter_embedded(Arc::clone(language), inner.initial_state()),
                None => {
                    tracing::debug!(
                        host = %self.lexer.language,
                        language = %language,
                        "embedded language has no tokenizer"
                    );
                    state
                }
            },
            Some(Embed::Pop) => state.leave_embedded(),
            None => state,
        }
    }

    /// Hand `line[stream.pos()..end]` to the embedded tokenizer and splice its
    /// result in. Returns the host state carrying the inner end state.
    fn run_embedded(
        &self,
        line: &str,
        stream: &mut CharStream<'_>,
        state: LexerState,
        offset_delta: usize,
        sink: &mut TokenSink,
    ) -> LexerState {
        let embedded = state
            .embedded_language()
            .map(str::to_string)
            .zip(state.embedded_state().cloned());
        let Some((language, inner_state)) = embedded else {
            return state;
        };
        let Some(inner) = self.resolve(&language) else {
            tracing::debug!(%language, "embedded tokenizer went away, host resumes");
            return state.leave_embedded();
        };

        let start = stream.pos();
        let end = self.embedded_end(line, start, &state);
        if end == start {
            return state;
        }

        let result = inner.tokenize(&line[start..end], &inner_state, offset_delta + start, None);
        sink.splice(result.tokens, result.mode_transitions);
        stream.seek(end);
        state.with_embedded_state(result.end_state)
    }
}

impl TokenizationSupport for MonarchTokenizer {
    fn language(&self) -> &str {
        &self.lexer.language
    }

    fn initial_state(&self) -> LexerState {
        LexerState::new(Arc::clone(&self.lexer.start))
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
        let mut sink = TokenSink::new(offset_delta);
        let mut state = state.clone();

        let mut embedded_ran_at = None;
        let mut stalled = 0;

        while !stream.eos() {
            let pos = stream.pos();

            if state.embedded_language().is_some() && embedded_ran_at != Some(pos) {
                state = self.run_embedded(line, &mut stream, state, offset_delta, &mut sink);
                embedded_ran_at = Some(stream.pos());
                continue;
            }

            let matched = if stalled < MAX_STALLED_STEPS {
                self.find_rule(&state, stream.rest())
            } else {
                None
            };

            match matched {
                Some((rule, len)) => {
                    let text = &line[pos..pos + len];
                    state = self.apply(rule, text, pos, state, &mut sink);
                    stream.seek(pos + len);
                }
                None => {
                    stream.next();
                    sink.language(pos, &self.lexer.language);
                    sink.token(pos, Arc::clone(&self.lexer.default_token), false);
                }
            }

            if stream.pos() == pos {
                stalled += 1;
            } else {
                stalled = 0;
            }
        }

        let start_language = state_language(&state, &self.lexer.language);
        sink.finish(state, offset_delta + stream.pos(), start_language)
    }
}

fn state_language(state: &LexerState, host: &Arc<str>) -> Arc<str> {
    Arc::from(state.active_language(host))
}

/// Collects tokens and mode transitions for one line.
struct TokenSink {
    offset_delta: usize,
    tokens: Vec<Token>,
    transitions: Vec<ModeTransition>,
    last_bracket: bool,
    /// Set after a language switch; the next token never merges backwards.
    barrier: bool,
}

impl TokenSink {
    fn new(offset_delta: usize) -> Self {
        Self {
            offset_delta,
            tokens: Vec::new(),
            transitions: Vec::new(),
            last_bracket: false,
            barrier: false,
        }
    }

    /// Record a token at line offset `start`.
    fn token(&mut self, start: usize, token_type: Arc<str>, bracket: bool) {
        if let Some(last) = self.tokens.last() {
            if !self.barrier && !bracket && !self.last_bracket && last.token_type == token_type {
                return;
            }
        }
        self.tokens.push(Token {
            start_index: self.offset_delta + start,
            token_type,
        });
        self.last_bracket = bracket;
        self.barrier = false;
    }

    /// Make `language` the active language from line offset `start`.
    fn language(&mut self, start: usize, language: &Arc<str>) {
        self.switch(self.offset_delta + start, language);
    }

    fn switch(&mut self, start_index: usize, language: &Arc<str>) {
        match self.transitions.last_mut() {
            Some(last) if last.language == *language => return,
            Some(last) if last.start_index == start_index => {
                last.language = Arc::clone(language);
                let len = self.transitions.len();
                if len > 1 && self.transitions[len - 2].language == *language {
                    self.transitions.pop();
                }
            }
            _ => self.transitions.push(ModeTransition {
                start_index,
                language: Arc::clone(language),
            }),
        }
        self.barrier = true;
    }

    /// Append an embedded tokenizer's output. Its offsets are already absolute.
    fn splice(&mut self, tokens: Vec<Token>, transitions: Vec<ModeTransition>) {
        let mut transitions = transitions.into_iter().peekable();
        for token in tokens {
            while let Some(t) = transitions.next_if(|t| t.start_index <= token.start_index) {
                self.switch(t.start_index, &t.language);
            }
            self.tokens.push(token);
        }
        for t in transitions {
            self.switch(t.start_index, &t.language);
        }
        self.last_bracket = false;
        self.barrier = true;
    }

    fn finish(mut self, end_state: LexerState, actual_stop_offset: usize, language: Arc<str>) -> LineTokens {
        if self.transitions.is_empty() {
            self.transitions.push(ModeTransition {
                start_index: self.offset_delta,
                language,
            });
        }
        LineTokens {
            tokens: self.tokens,
            end_state,
            actual_stop_offset,
            mode_transitions: self.transitions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::RuleDef;
    use crate::registry::Registration;

    fn tokens(result: &LineTokens) -> Vec<(usize, &str)> {
        result
            .tokens
            .iter()
            .map(|t| (t.start_index, &*t.token_type))
            .collect()
    }

    fn transitions(result: &LineTokens) -> Vec<(usize, &str)> {
        result
            .mode_transitions
            .iter()
            .map(|t| (t.start_index, &*t.language))
            .collect()
    }

    fn words() -> MonarchTokenizer {
        let grammar = Grammar::new("calc")
            .default_token("invalid")
            .state(
                "root",
                vec![
                    RuleDef::rule(r"\d+", "number"),
                    RuleDef::rule("[a-z]+", "word"),
                    RuleDef::rule(r"/\*", "comment").next("@comment"),
                    RuleDef::rule("[ \t]+", "white"),
                    RuleDef::rule("[(){}]", "@brackets"),
                ],
            )
            .state(
                "comment",
                vec![
                    RuleDef::rule(r"\*/", "comment").next("@pop"),
                    RuleDef::rule(".", "comment"),
                ],
            )
            .bracket("(", ")", "delimiter.parenthesis")
            .bracket("{", "}", "delimiter.curly");
        MonarchTokenizer::from_grammar(&grammar).unwrap()
    }

    #[test]
    fn numbers_then_words() {
        let tokenizer = words();
        let initial = tokenizer.initial_state();
        let result = tokenizer.tokenize("12ab", &initial, 0, None);
        assert_eq!(tokens(&result), vec![(0, "number"), (2, "word")]);
        assert_eq!(result.end_state, initial);
        assert_eq!(result.actual_stop_offset, 4);
        assert_eq!(transitions(&result), vec![(0, "calc")]);
    }

    #[test]
    fn balanced_comment_returns_to_initial_state() {
        let tokenizer = words();
        let initial = tokenizer.initial_state();
        let result = tokenizer.tokenize("/* x */y", &initial, 0, None);
        assert_eq!(tokens(&result), vec![(0, "comment"), (7, "word")]);
        assert_eq!(result.end_state, initial);
    }

    #[test]
    fn unterminated_comment_carries_over() {
        let tokenizer = words();
        let first = tokenizer.tokenize("1 /* open", &tokenizer.initial_state(), 0, None);
        assert_eq!(first.end_state.current(), "comment");

        let second = tokenizer.tokenize("still */ 2", &first.end_state, 0, None);
        assert_eq!(
            tokens(&second),
            vec![(0, "comment"), (8, "white"), (9, "number")]
        );
        assert_eq!(second.end_state, tokenizer.initial_state());
    }

    #[test]
    fn unmatched_characters_make_progress() {
        let tokenizer = words();
        let result = tokenizer.tokenize("a#$b", &tokenizer.initial_state(), 0, None);
        assert_eq!(tokens(&result), vec![(0, "word"), (1, "invalid"), (3, "word")]);
    }

    #[test]
    fn grammar_that_never_consumes_still_finishes() {
        let grammar = Grammar::new("stuck")
            .default_token("x")
            .state("root", vec![RuleDef::rule("", "@rematch").next("@push")]);
        let tokenizer = MonarchTokenizer::from_grammar(&grammar).unwrap();
        let result = tokenizer.tokenize("abc", &tokenizer.initial_state(), 0, None);
        assert_eq!(result.actual_stop_offset, 3);
        assert_eq!(tokens(&result), vec![(0, "x")]);
    }

    #[test]
    fn offset_delta_shifts_everything() {
        let tokenizer = words();
        let plain = tokenizer.tokenize("12 ab", &tokenizer.initial_state(), 0, None);
        let shifted = tokenizer.tokenize("12 ab", &tokenizer.initial_state(), 100, None);
        let expected: Vec<_> = tokens(&plain).into_iter().map(|(i, t)| (i + 100, t)).collect();
        assert_eq!(tokens(&shifted), expected);
        assert_eq!(shifted.actual_stop_offset, 105);
        assert_eq!(transitions(&shifted), vec![(100, "calc")]);
    }

    #[test]
    fn stop_offset_truncates() {
        let tokenizer = words();
        let result = tokenizer.tokenize("12 abc 34", &tokenizer.initial_state(), 10, Some(15));
        assert_eq!(tokens(&result), vec![(10, "number"), (12, "white"), (13, "word")]);
        assert_eq!(result.actual_stop_offset, 15);
    }

    #[test]
    fn empty_line_has_a_transition_and_no_tokens() {
        let tokenizer = words();
        let result = tokenizer.tokenize("", &tokenizer.initial_state(), 4, None);
        assert!(result.tokens.is_empty());
        assert_eq!(transitions(&result), vec![(4, "calc")]);
        assert_eq!(result.actual_stop_offset, 4);
    }

    #[test]
    fn brackets_are_never_merged_and_depth_saturates() {
        let tokenizer = words();
        let result = tokenizer.tokenize("(()", &tokenizer.initial_state(), 0, None);
        assert_eq!(
            tokens(&result),
            vec![
                (0, "delimiter.parenthesis"),
                (1, "delimiter.parenthesis"),
                (2, "delimiter.parenthesis"),
            ]
        );
        assert_eq!(result.end_state.bracket_depth(), 1);

        let closes = tokenizer.tokenize(")))}", &result.end_state, 0, None);
        assert_eq!(closes.end_state.bracket_depth(), 0);
    }

    #[test]
    fn equal_states_tokenize_identically() {
        let tokenizer = words();
        let a = tokenizer.tokenize("/* a", &tokenizer.initial_state(), 0, None).end_state;
        let b = tokenizer.tokenize("/* b", &tokenizer.initial_state(), 0, None).end_state;
        assert_eq!(a, b);
        let line = "x */ (1)";
        assert_eq!(
            tokenizer.tokenize(line, &a, 0, None),
            tokenizer.tokenize(line, &b, 0, None)
        );
    }

    fn embedding_registry() -> (Arc<TokenizerRegistry>, Vec<Registration>) {
        let registry = Arc::new(TokenizerRegistry::new());
        let mut registrations = Vec::new();

        let script = Grammar::new("script").default_token("source").state(
            "root",
            vec![
                RuleDef::rule("[a-z]+", "identifier"),
                RuleDef::rule("[0-9]+", "number"),
            ],
        );

        let style = Grammar::new("style").default_token("text").state(
            "root",
            vec![
                RuleDef::rule("`", "delimiter")
                    .next("@script")
                    .next_embedded("script"),
                RuleDef::rule("[a-z-]+", "property"),
                RuleDef::rule(":", "delimiter"),
            ],
        ).state(
            "script",
            vec![RuleDef::rule("`", "delimiter")
                .next("@pop")
                .next_embedded("@pop")],
        );

        let markup = Grammar::new("markup").default_token("text").state(
            "root",
            vec![
                RuleDef::rule("<style>", "tag")
                    .next("@style")
                    .next_embedded("style"),
                RuleDef::rule("[^<]+", "text"),
            ],
        ).state(
            "style",
            vec![RuleDef::rule("</style>", "tag")
                .next("@pop")
                .next_embedded("@pop")],
        );

        for grammar in [script, style, markup] {
            let tokenizer = MonarchTokenizer::from_grammar(&grammar)
                .unwrap()
                .with_embedded(&registry);
            registrations.push(registry.register(Arc::new(tokenizer)));
        }
        (registry, registrations)
    }

    #[test]
    fn one_level_embedding_switches_and_returns() {
        let (registry, _registrations) = embedding_registry();
        let style = registry.for_language("style").unwrap();
        let result = style.tokenize("a:`x 1`b", &style.initial_state(), 0, None);
        assert_eq!(
            tokens(&result),
            vec![
                (0, "property"),
                (1, "delimiter"),
                (3, "identifier"),
                (4, "source"),
                (5, "number"),
                (6, "delimiter"),
                (7, "property"),
            ]
        );
        assert_eq!(
            transitions(&result),
            vec![(0, "style"), (3, "script"), (6, "style")]
        );
        assert_eq!(result.end_state, style.initial_state());
    }

    #[test]
    fn two_level_embedding_across_lines() {
        let (registry, _registrations) = embedding_registry();
        let markup = registry.for_language("markup").unwrap();

        let first = markup.tokenize("hi<style>a:`x", &markup.initial_state(), 0, None);
        assert_eq!(
            transitions(&first),
            vec![(0, "markup"), (9, "style"), (12, "script")]
        );
        assert_eq!(first.end_state.embedded_language(), Some("style"));
        assert_eq!(first.end_state.active_language("markup"), "script");

        // Still inside the script block: the whole line belongs to it.
        let second = markup.tokenize("y 2", &first.end_state, 0, None);
        assert_eq!(transitions(&second), vec![(0, "script")]);
        assert_eq!(
            tokens(&second),
            vec![(0, "identifier"), (1, "source"), (2, "number")]
        );

        let third = markup.tokenize("z`b</style>ok", &second.end_state, 0, None);
        assert_eq!(
            transitions(&third),
            vec![(0, "script"), (1, "style"), (3, "markup")]
        );
        assert_eq!(
            tokens(&third),
            vec![
                (0, "identifier"),
                (1, "delimiter"),
                (2, "property"),
                (3, "tag"),
                (11, "text"),
            ]
        );
        assert_eq!(third.end_state, markup.initial_state());
    }

    #[test]
    fn empty_line_inside_embedding_names_inner_language() {
        let (registry, _registrations) = embedding_registry();
        let markup = registry.for_language("markup").unwrap();
        let open = markup.tokenize("<style>a:`", &markup.initial_state(), 0, None);
        let empty = markup.tokenize("", &open.end_state, 0, None);
        assert_eq!(transitions(&empty), vec![(0, "script")]);
        assert_eq!(empty.end_state, open.end_state);
    }

    #[test]
    fn unknown_embedded_language_is_ignored() {
        let grammar = Grammar::new("host").state(
            "root",
            vec![
                RuleDef::rule("`", "delimiter").next_embedded("missing"),
                RuleDef::rule("[a-z]+", "word"),
            ],
        );
        let registry = Arc::new(TokenizerRegistry::new());
        let tokenizer = MonarchTokenizer::from_grammar(&grammar)
            .unwrap()
            .with_embedded(&registry);
        let result = tokenizer.tokenize("`abc", &tokenizer.initial_state(), 0, None);
        assert_eq!(tokens(&result), vec![(0, "delimiter"), (1, "word")]);
        assert_eq!(result.end_state.embedded_language(), None);
    }
}
