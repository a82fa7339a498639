//! Modes built from grammars listed in settings.

use std::sync::Arc;

use super::{LanguageFeatures, LanguageMode, ModeRegistration};
use crate::lexer::{CompileError, Grammar, MonarchTokenizer};

/// Tokenization and rich-edit support for a user grammar. The language id is
/// the grammar's name.
pub struct GrammarMode {
    tokenizer: MonarchTokenizer,
}

impl GrammarMode {
    pub fn new(grammar: &Grammar) -> Result<Self, CompileError> {
        Ok(Self {
            tokenizer: MonarchTokenizer::from_grammar(grammar)?,
        })
    }
}

impl LanguageMode for GrammarMode {
    fn id(&self) -> &str {
        self.tokenizer.lexer().language()
    }

    fn activate(&self, features: &LanguageFeatures) -> ModeRegistration {
        let tokenizer = self.tokenizer.clone().with_embedded(&features.tokenizers);
        let rich_edit = Arc::new(tokenizer.lexer().rich_edit_support().clone());

        let mut registration = ModeRegistration::new();
        registration.push(features.rich_edit.register(self.id(), rich_edit));
        registration.push(features.tokenizers.register(Arc::new(tokenizer)));
        registration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::RuleDef;

    #[test]
    fn grammar_name_is_the_language() {
        let grammar = Grammar::new("ini").state(
            "root",
            vec![RuleDef::rule(r"\[[^\]]*\]", "section"), RuleDef::rule("[^=]+", "key")],
        );
        let mode = GrammarMode::new(&grammar).unwrap();
        assert_eq!(mode.id(), "ini");

        let features = LanguageFeatures::new();
        let registration = mode.activate(&features);
        assert_eq!(registration.len(), 2);
        let tokenizer = features.tokenizers.for_language("ini").unwrap();
        let tokens = tokenizer.tokenize("[core]", &tokenizer.initial_state(), 0, None);
        assert_eq!(tokens.tokens[0].token_type.as_ref(), "section");
    }

    #[test]
    fn broken_grammar_is_rejected() {
        let grammar = Grammar::new("broken").state("root", vec![RuleDef::rule("(", "x")]);
        assert!(matches!(
            GrammarMode::new(&grammar),
            Err(CompileError::InvalidPattern { .. })
        ));
    }
}
