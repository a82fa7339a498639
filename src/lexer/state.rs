//! Lexer state threaded from line to line.

use std::fmt;
use std::sync::Arc;

/// One entry of the rule-state stack. Frames are shared between states, so
/// pushing never copies the stack below.
#[derive(PartialEq, Eq, Hash)]
struct Frame {
    name: Arc<str>,
    parent: Option<Arc<Frame>>,
    depth: usize,
}

/// The embedded language active inside a host, with that language's own state.
#[derive(Clone, PartialEq, Eq, Hash)]
struct Embedded {
    language: Arc<str>,
    state: LexerState,
}

/// Resumption point for line-by-line tokenization.
///
/// A state is a value: every transition produces a new state and the stack
/// frames are shared, so cloning is cheap. Two states compare equal exactly
/// when they would tokenize any line identically: same rule-state stack,
/// same bracket depth and same embedded language and inner state.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LexerState {
    stack: Arc<Frame>,
    brackets: u32,
    embedded: Option<Arc<Embedded>>,
}

impl LexerState {
    /// A state with a single rule-state on the stack.
    pub fn new(start: impl Into<Arc<str>>) -> Self {
        Self {
            stack: Arc::new(Frame {
                name: start.into(),
                parent: None,
                depth: 1,
            }),
            brackets: 0,
            embedded: None,
        }
    }

    /// Name of the rule-state on top of the stack.
    pub fn current(&self) -> &str {
        &self.stack.name
    }

    /// Number of rule-states on the stack.
    pub fn depth(&self) -> usize {
        self.stack.depth
    }

    /// Running bracket nesting count. Never negative.
    pub fn bracket_depth(&self) -> u32 {
        self.brackets
    }

    /// The state this one was entered from, if any.
    pub fn parent(&self) -> Option<LexerState> {
        let parent = self.stack.parent.clone()?;
        Some(Self {
            stack: parent,
            brackets: self.brackets,
            embedded: self.embedded.clone(),
        })
    }

    /// Language id of the embedded tokenizer currently in control, if any.
    pub fn embedded_language(&self) -> Option<&str> {
        self.embedded.as_deref().map(|e| &*e.language)
    }

    /// The embedded tokenizer's own state, if an embedded language is active.
    pub fn embedded_state(&self) -> Option<&LexerState> {
        self.embedded.as_deref().map(|e| &e.state)
    }

    /// Innermost active language, following nested embeddings.
    pub fn active_language<'s>(&'s self, host: &'s str) -> &'s str {
        match self.embedded.as_deref() {
            Some(e) => e.state.active_language(&e.language),
            None => host,
        }
    }

    pub(crate) fn push(&self, name: Arc<str>) -> Self {
        Self {
            stack: Arc::new(Frame {
                name,
                depth: self.stack.depth + 1,
                parent: Some(Arc::clone(&self.stack)),
            }),
            ..self.clone()
        }
    }

    /// Pops the top rule-state. The root state is never popped.
    pub(crate) fn pop(&self) -> Self {
        match &self.stack.parent {
            Some(parent) => Self {
                stack: Arc::clone(parent),
                ..self.clone()
            },
            None => {
                tracing::debug!(state = self.current(), "pop on root lexer state ignored");
                self.clone()
            }
        }
    }

    pub(crate) fn pop_all(&self) -> Self {
        let mut root = Arc::clone(&self.stack);
        while let Some(parent) = root.parent.clone() {
            root = parent;
        }
        Self {
            stack: root,
            ..self.clone()
        }
    }

    pub(crate) fn switch_to(&self, name: Arc<str>) -> Self {
        Self {
            stack: Arc::new(Frame {
                name,
                depth: self.stack.depth,
                parent: self.stack.parent.clone(),
            }),
            ..self.clone()
        }
    }

    pub(crate) fn open_bracket(&self) -> Self {
        Self {
            brackets: self.brackets.saturating_add(1),
            ..self.clone()
        }
    }

    /// Closing with no open bracket leaves the count at zero.
    pub(crate) fn close_bracket(&self) -> Self {
        Self {
            brackets: self.brackets.saturating_sub(1),
            ..self.clone()
        }
    }

    pub(crate) fn enter_embedded(&self, language: Arc<str>, state: LexerState) -> Self {
        Self {
            embedded: Some(Arc::new(Embedded { language, state })),
            ..self.clone()
        }
    }

    pub(crate) fn with_embedded_state(&self, state: LexerState) -> Self {
        match self.embedded.as_deref() {
            Some(e) => self.enter_embedded(Arc::clone(&e.language), state),
            None => self.clone(),
        }
    }

    pub(crate) fn leave_embedded(&self) -> Self {
        Self {
            embedded: None,
            ..self.clone()
        }
    }
}

impl fmt::Debug for LexerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::with_capacity(self.stack.depth);
        let mut frame = Some(&self.stack);
        while let Some(current) = frame {
            names.push(&*current.name);
            frame = current.parent.as_ref();
        }
        names.reverse();

        let mut out = f.debug_struct("LexerState");
        out.field("stack", &names).field("brackets", &self.brackets);
        if let Some(embedded) = self.embedded.as_deref() {
            out.field("embedded", &(&*embedded.language, &embedded.state));
        }
        out.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_roundtrip_equals_original() {
        let root = LexerState::new("root");
        let inner = root.push("comment".into());
        assert_eq!(inner.current(), "comment");
        assert_eq!(inner.depth(), 2);
        assert_ne!(inner, root);
        assert_eq!(inner.pop(), root);
        assert_eq!(inner.parent(), Some(root.clone()));
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn pop_on_root_is_a_no_op() {
        let root = LexerState::new("root");
        assert_eq!(root.pop(), root);
    }

    #[test]
    fn pop_all_returns_to_root() {
        let root = LexerState::new("root");
        let deep = root
            .push("a".into())
            .push("b".into())
            .push("c".into());
        assert_eq!(deep.pop_all(), root);
    }

    #[test]
    fn switch_replaces_top_without_growing() {
        let state = LexerState::new("root").push("a".into());
        let switched = state.switch_to("b".into());
        assert_eq!(switched.current(), "b");
        assert_eq!(switched.depth(), 2);
        assert_eq!(switched.pop(), LexerState::new("root"));
    }

    #[test]
    fn bracket_depth_never_negative() {
        let state = LexerState::new("root");
        let closed = state.close_bracket().close_bracket();
        assert_eq!(closed.bracket_depth(), 0);
        assert_eq!(closed, state);
        assert_eq!(state.open_bracket().close_bracket(), state);
    }

    #[test]
    fn independently_built_states_compare_equal() {
        let a = LexerState::new("root").push("x".into()).open_bracket();
        let b = LexerState::new("root").push("x".into()).open_bracket();
        assert_eq!(a, b);
    }

    #[test]
    fn embedded_state_participates_in_equality() {
        let host = LexerState::new("root");
        let inner = LexerState::new("js");
        let embedded = host.enter_embedded("javascript".into(), inner.clone());
        assert_ne!(embedded, host);
        assert_eq!(embedded.embedded_language(), Some("javascript"));
        assert_eq!(embedded.active_language("less"), "javascript");
        assert_eq!(embedded.leave_embedded(), host);

        let advanced = embedded.with_embedded_state(inner.push("string".into()));
        assert_ne!(advanced, embedded);
    }

    #[test]
    fn active_language_follows_nested_embeddings() {
        let script = LexerState::new("root");
        let style = LexerState::new("root").enter_embedded("script".into(), script);
        let markup = LexerState::new("root").enter_embedded("style".into(), style);
        assert_eq!(markup.active_language("markup"), "script");
    }
}
