//! JavaScript, tokenization only. Mostly seen embedded in LESS.

use std::sync::Arc;

use super::{LanguageFeatures, LanguageMode, ModeRegistration};
use crate::lexer::{CompileError, Grammar, MonarchTokenizer};

pub const LANGUAGE_ID: &str = "javascript";

const GRAMMAR: &str = include_str!("javascript.toml");

pub struct JavaScriptMode {
    tokenizer: MonarchTokenizer,
}

impl JavaScriptMode {
    pub fn new() -> Result<Self, CompileError> {
        let grammar = Grammar::from_toml(GRAMMAR).map_err(|e| CompileError::Malformed {
            grammar: LANGUAGE_ID.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            tokenizer: MonarchTokenizer::from_grammar(&grammar)?,
        })
    }
}

impl LanguageMode for JavaScriptMode {
    fn id(&self) -> &str {
        LANGUAGE_ID
    }

    fn activate(&self, features: &LanguageFeatures) -> ModeRegistration {
        let tokenizer = self.tokenizer.clone().with_embedded(&features.tokenizers);
        let rich_edit = Arc::new(tokenizer.lexer().rich_edit_support().clone());

        let mut registration = ModeRegistration::new();
        registration.push(features.tokenizers.register(Arc::new(tokenizer)));
        registration.push(features.rich_edit.register(LANGUAGE_ID, rich_edit));
        registration
    }
}
