//! The LESS stylesheet mode.
//!
//! Tokenization runs in-process from the bundled grammar. Everything else is
//! answered by a [`LessWorker`] reached through the worker pool.

mod worker;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Diagnostic, DiagnosticSeverity, DocumentHighlight,
    DocumentHighlightKind, FormattingOptions, Hover, HoverContents, LSPAny, Location,
    MarkupContent, MarkupKind, Position, Range, SymbolKind, TextEdit,
};

pub use worker::{
    IndentEdit, LessWorker, Occurrence, OutlineKind, OutlineNode, Problem, Suggestion,
    SuggestionKind,
};

use super::{LanguageFeatures, LanguageMode, ModeRegistration};
use crate::document::TextDocument;
use crate::features::*;
use crate::lexer::{CompileError, Grammar, MonarchTokenizer};
use crate::settings::{LessOptions, LintSeverity, Settings};
use crate::worker::{WorkerError, WorkerKey, WorkerPool, WorkerRegistry};

pub const LANGUAGE_ID: &str = "less";

const GRAMMAR: &str = include_str!("less.toml");

/// The bundled LESS grammar.
pub fn grammar() -> Result<Grammar, CompileError> {
    Grammar::from_toml(GRAMMAR).map_err(|e| CompileError::Malformed {
        grammar: LANGUAGE_ID.to_string(),
        message: e.to_string(),
    })
}

pub struct LessMode {
    tokenizer: MonarchTokenizer,
    pool: Arc<WorkerPool<LessWorker>>,
}

impl LessMode {
    pub fn new(pool: Arc<WorkerPool<LessWorker>>) -> Result<Self, CompileError> {
        Ok(Self {
            tokenizer: MonarchTokenizer::from_grammar(&grammar()?)?,
            pool,
        })
    }

    /// A mode whose workers come from `workers`, configured by `settings`.
    pub fn from_settings(
        workers: &WorkerRegistry<LessWorker>,
        settings: &Settings,
    ) -> Result<Self, CompileError> {
        let options = settings.modes.less.clone();
        let factory = Arc::new(move |slot: usize| {
            LessWorker::new(options.clone()).map_err(|e| WorkerError::Create {
                language: LANGUAGE_ID.to_string(),
                slot,
                message: e.to_string(),
            })
        });
        let pool = workers.get_or_create(
            WorkerKey::new(LANGUAGE_ID),
            settings.workers.count,
            factory,
        );
        Self::new(pool)
    }

    pub fn pool(&self) -> &Arc<WorkerPool<LessWorker>> {
        &self.pool
    }

    /// Elect the worker that validates in the background. Only the first
    /// call does anything.
    pub fn elect_validator(&self) -> Option<JoinHandle<Result<(), WorkerError>>> {
        elect_validator(&self.pool)
    }
}

fn elect_validator(
    pool: &Arc<WorkerPool<LessWorker>>,
) -> Option<JoinHandle<Result<(), WorkerError>>> {
    pool.elect_validator(|worker| {
        worker.mark_validator();
        tracing::debug!(language = LANGUAGE_ID, "validator ready");
    })
}

impl LanguageMode for LessMode {
    fn id(&self) -> &str {
        LANGUAGE_ID
    }

    fn dependencies(&self) -> Vec<String> {
        vec![super::javascript::LANGUAGE_ID.to_string()]
    }

    fn activate(&self, features: &LanguageFeatures) -> ModeRegistration {
        let tokenizer = self.tokenizer.clone().with_embedded(&features.tokenizers);
        let rich_edit = Arc::new(tokenizer.lexer().rich_edit_support().clone());
        let provider = Arc::new(LessFeatures {
            pool: Arc::clone(&self.pool),
        });

        let mut registration = ModeRegistration::new();
        registration.push(features.tokenizers.register(Arc::new(tokenizer)));
        registration.push(features.rich_edit.register(LANGUAGE_ID, rich_edit));
        registration.push(features.hover.register(LANGUAGE_ID, provider.clone()));
        registration.push(features.references.register(LANGUAGE_ID, provider.clone()));
        registration.push(features.declaration.register(LANGUAGE_ID, provider.clone()));
        registration.push(features.occurrences.register(LANGUAGE_ID, provider.clone()));
        registration.push(features.outline.register(LANGUAGE_ID, provider.clone()));
        registration.push(features.suggest.register(LANGUAGE_ID, provider.clone()));
        registration.push(features.value_set.register(LANGUAGE_ID, provider.clone()));
        registration.push(features.formatting.register(LANGUAGE_ID, provider.clone()));
        registration.push(features.color_declarations.register(LANGUAGE_ID, provider.clone()));
        registration.push(features.validation.register(LANGUAGE_ID, provider.clone()));
        registration.push(features.configuration.register(LANGUAGE_ID, provider));
        registration
    }

    fn creation_done(&self) {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::debug!(language = LANGUAGE_ID, "no runtime, validator election deferred");
            return;
        }
        self.elect_validator();
    }
}

/// Every LESS capability, each a delegation to the worker pool.
struct LessFeatures {
    pool: Arc<WorkerPool<LessWorker>>,
}

impl LessFeatures {
    fn locations(document: &TextDocument, spans: Vec<std::ops::Range<usize>>) -> Vec<Location> {
        spans
            .iter()
            .map(|span| Location::new(document.uri().clone(), document.index().span_to_range(span)))
            .collect()
    }
}

fn offset_of(document: &TextDocument, position: Position) -> Result<usize, ProviderError> {
    document
        .index()
        .position_to_offset(position)
        .ok_or_else(|| {
            ProviderError::Failed(format!(
                "position {}:{} is outside the document",
                position.line, position.character
            ))
        })
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

fn outline_entry(document: &TextDocument, node: OutlineNode) -> OutlineEntry {
    OutlineEntry {
        name: node.name,
        kind: match node.kind {
            OutlineKind::Rule => SymbolKind::CLASS,
            OutlineKind::Variable => SymbolKind::VARIABLE,
        },
        range: document.index().span_to_range(&node.span),
        selection_range: document.index().span_to_range(&node.selection),
        children: node
            .children
            .into_iter()
            .map(|child| outline_entry(document, child))
            .collect(),
    }
}

#[tower_lsp::async_trait]
impl HoverProvider for LessFeatures {
    async fn provide_hover(
        &self,
        document: &TextDocument,
        position: Position,
        _token: &CancellationToken,
    ) -> ProviderResult<Hover> {
        let offset = offset_of(document, position)?;
        let text = document.text().to_string();
        let found = self
            .pool
            .run_on_elected_worker(move |worker| worker.hover(&text, offset))
            .await?;
        Ok(found.map(|(span, value)| Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: format!("```less\n{value}\n```"),
            }),
            range: Some(document.index().span_to_range(&span)),
        }))
    }
}

#[tower_lsp::async_trait]
impl ReferenceProvider for LessFeatures {
    async fn provide_references(
        &self,
        document: &TextDocument,
        position: Position,
        include_declaration: bool,
        _token: &CancellationToken,
    ) -> ProviderResult<Vec<Location>> {
        let offset = offset_of(document, position)?;
        let text = document.text().to_string();
        let spans = self
            .pool
            .run_on_elected_worker(move |worker| {
                worker.references(&text, offset, include_declaration)
            })
            .await?;
        Ok(non_empty(Self::locations(document, spans)))
    }
}

#[tower_lsp::async_trait]
impl DeclarationProvider for LessFeatures {
    async fn provide_declaration(
        &self,
        document: &TextDocument,
        position: Position,
        _token: &CancellationToken,
    ) -> ProviderResult<Vec<Location>> {
        let offset = offset_of(document, position)?;
        let text = document.text().to_string();
        let spans = self
            .pool
            .run_on_elected_worker(move |worker| worker.declarations(&text, offset))
            .await?;
        Ok(non_empty(Self::locations(document, spans)))
    }
}

#[tower_lsp::async_trait]
impl OccurrencesProvider for LessFeatures {
    async fn provide_occurrences(
        &self,
        document: &TextDocument,
        position: Position,
        _token: &CancellationToken,
    ) -> ProviderResult<Vec<DocumentHighlight>> {
        let offset = offset_of(document, position)?;
        let text = document.text().to_string();
        let occurrences = self
            .pool
            .run_on_elected_worker(move |worker| worker.occurrences(&text, offset))
            .await?;
        Ok(non_empty(
            occurrences
                .into_iter()
                .map(|o| DocumentHighlight {
                    range: document.index().span_to_range(&o.span),
                    kind: Some(match o.declaration {
                        true => DocumentHighlightKind::WRITE,
                        false => DocumentHighlightKind::READ,
                    }),
                })
                .collect(),
        ))
    }
}

#[tower_lsp::async_trait]
impl OutlineProvider for LessFeatures {
    async fn provide_outline(
        &self,
        document: &TextDocument,
        _token: &CancellationToken,
    ) -> ProviderResult<Vec<OutlineEntry>> {
        let text = document.text().to_string();
        let nodes = self
            .pool
            .run_on_elected_worker(move |worker| worker.outline(&text))
            .await?;
        Ok(non_empty(
            nodes
                .into_iter()
                .map(|node| outline_entry(document, node))
                .collect(),
        ))
    }
}

#[tower_lsp::async_trait]
impl SuggestProvider for LessFeatures {
    fn trigger_characters(&self) -> Vec<String> {
        vec!["@".to_string(), ":".to_string()]
    }

    async fn provide_suggestions(
        &self,
        document: &TextDocument,
        position: Position,
        token: &CancellationToken,
    ) -> ProviderResult<SuggestResult> {
        let offset = offset_of(document, position)?;
        let text = document.text().to_string();
        let suggestions = self
            .pool
            .run_on_elected_worker(move |worker| worker.suggestions(&text, offset))
            .await?;
        if token.is_cancelled() {
            return Ok(None);
        }
        Ok(Some(SuggestResult {
            items: suggestions
                .into_iter()
                .map(|s| CompletionItem {
                    label: s.label,
                    kind: Some(match s.kind {
                        SuggestionKind::Variable => CompletionItemKind::VARIABLE,
                        SuggestionKind::Keyword => CompletionItemKind::KEYWORD,
                        SuggestionKind::Property => CompletionItemKind::PROPERTY,
                        SuggestionKind::Value => CompletionItemKind::VALUE,
                    }),
                    detail: s.detail,
                    ..Default::default()
                })
                .collect(),
            incomplete: false,
        }))
    }
}

#[tower_lsp::async_trait]
impl ValueSetNavigationProvider for LessFeatures {
    async fn navigate_value_set(
        &self,
        document: &TextDocument,
        range: Range,
        up: bool,
        _token: &CancellationToken,
    ) -> ProviderResult<ValueSetReplacement> {
        let span = match document.index().range_to_span(range) {
            Some(span) if !span.is_empty() => span,
            _ => match document.word_at(range.start) {
                Some((span, _)) => span,
                None => return Ok(None),
            },
        };
        let value = document.text()[span.clone()].to_string();
        let replaced = self
            .pool
            .run_on_elected_worker(move |worker| worker.navigate_value_set(&value, up))
            .await?;
        Ok(replaced.map(|value| ValueSetReplacement {
            range: document.index().span_to_range(&span),
            value,
        }))
    }
}

#[tower_lsp::async_trait]
impl FormattingProvider for LessFeatures {
    async fn format_document(
        &self,
        document: &TextDocument,
        options: &FormattingOptions,
        _token: &CancellationToken,
    ) -> ProviderResult<Vec<TextEdit>> {
        let unit = match options.insert_spaces {
            true => " ".repeat(options.tab_size as usize),
            false => "\t".to_string(),
        };
        let text = document.text().to_string();
        let edits = self
            .pool
            .run_on_elected_worker(move |worker| worker.format(&text, &unit))
            .await?;
        Ok(non_empty(
            edits
                .into_iter()
                .map(|edit| {
                    let line = edit.line as u32;
                    TextEdit::new(
                        Range::new(
                            Position::new(line, 0),
                            Position::new(line, edit.current as u32),
                        ),
                        edit.indent,
                    )
                })
                .collect(),
        ))
    }
}

#[tower_lsp::async_trait]
impl ColorDeclarationProvider for LessFeatures {
    async fn provide_color_declarations(
        &self,
        document: &TextDocument,
        _token: &CancellationToken,
    ) -> ProviderResult<Vec<ColorDeclaration>> {
        let text = document.text().to_string();
        let colors = self
            .pool
            .run_on_elected_worker(move |worker| worker.color_declarations(&text))
            .await?;
        Ok(non_empty(
            colors
                .into_iter()
                .map(|(span, value)| ColorDeclaration {
                    range: document.index().span_to_range(&span),
                    value,
                })
                .collect(),
        ))
    }
}

#[tower_lsp::async_trait]
impl ValidationProvider for LessFeatures {
    async fn validate(
        &self,
        document: &TextDocument,
        _token: &CancellationToken,
    ) -> ProviderResult<Vec<Diagnostic>> {
        // Without a runtime at creation the election happens here.
        if let Some(election) = elect_validator(&self.pool) {
            election
                .await
                .map_err(|e| ProviderError::Failed(e.to_string()))??;
        }
        let text = document.text().to_string();
        let problems = self
            .pool
            .run_on_validator(move |worker| worker.validate(&text))
            .await?;
        Ok(non_empty(
            problems
                .into_iter()
                .map(|problem| Diagnostic {
                    range: document.index().span_to_range(&problem.span),
                    severity: Some(match problem.severity {
                        LintSeverity::Warning => DiagnosticSeverity::WARNING,
                        _ => DiagnosticSeverity::ERROR,
                    }),
                    source: Some(LANGUAGE_ID.to_string()),
                    message: problem.message,
                    ..Default::default()
                })
                .collect(),
        ))
    }
}

#[tower_lsp::async_trait]
impl ConfigurationProvider for LessFeatures {
    async fn configure(&self, options: &LSPAny) -> Result<(), ProviderError> {
        let options: LessOptions = serde_json::from_value(options.clone())
            .map_err(|e| ProviderError::InvalidOptions(e.to_string()))?;
        tracing::debug!(language = LANGUAGE_ID, ?options, "reconfiguring workers");
        self.pool
            .run_on_all_workers(move |worker| worker.configure(options.clone()))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tower_lsp::lsp_types::Url;

    use super::*;

    fn mode(workers: usize) -> (LessMode, LanguageFeatures) {
        let registry = WorkerRegistry::new();
        let mut settings = Settings::default();
        settings.workers.count = workers;
        (
            LessMode::from_settings(&registry, &settings).unwrap(),
            LanguageFeatures::new(),
        )
    }

    fn document(text: &str) -> TextDocument {
        TextDocument::new(Url::parse("file:///site.less").unwrap(), LANGUAGE_ID, 1, text.to_string())
    }

    #[test]
    fn bundled_grammar_compiles() {
        let grammar = grammar().unwrap();
        assert_eq!(grammar.name, LANGUAGE_ID);
        assert!(MonarchTokenizer::from_grammar(&grammar).is_ok());
    }

    #[tokio::test]
    async fn registers_every_capability() {
        let (mode, features) = mode(1);
        let registration = mode.activate(&features);
        assert_eq!(registration.len(), 13);

        let doc = document("@a: 1;");
        assert!(features.hover.has(&doc));
        assert!(features.configuration.has(&doc));
        assert!(features.tokenizers.for_language(LANGUAGE_ID).is_some());

        drop(registration);
        assert!(features.is_empty());
    }

    #[tokio::test]
    async fn tokenizes_less_with_embedded_script() {
        let (mode, features) = mode(1);
        let _less = mode.activate(&features);
        let _script = crate::modes::JavaScriptMode::new().unwrap().activate(&features);

        let tokenizer = features.tokenizers.for_language(LANGUAGE_ID).unwrap();
        let line = "@x: `1 + 2`;";
        let tokens = tokenizer.tokenize(line, &tokenizer.initial_state(), 0, None);
        let languages: Vec<&str> = tokens
            .mode_transitions
            .iter()
            .map(|t| &*t.language)
            .collect();
        assert_eq!(languages, vec!["less", "javascript", "less"]);
        assert_eq!(tokens.tokens[0].token_type.as_ref(), "variable.less");
        assert!(tokens
            .tokens
            .iter()
            .any(|t| t.token_type.as_ref() == "number.js"));
        assert_eq!(tokens.end_state, tokenizer.initial_state());
    }

    #[tokio::test]
    async fn providers_answer_through_workers() {
        let (mode, features) = mode(2);
        let _registration = mode.activate(&features);
        let doc = document("@gap: 4px;\n.a { margin: @gap; }\n");
        let aggregator = Aggregator::default();
        let none = CancellationToken::none();

        let hovers = aggregator
            .provide_hover(&features.hover, &doc, Position::new(1, 15), &none)
            .await;
        assert_eq!(hovers.len(), 1);

        let locations = aggregator
            .provide_declarations(&features.declaration, &doc, Position::new(1, 15), &none)
            .await;
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].range.start, Position::new(0, 0));

        let outline = aggregator
            .provide_outline(&features.outline, &doc, &none)
            .await;
        let names: Vec<&str> = outline.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["@gap", ".a"]);

        let step = aggregator
            .provide_navigate_value_set(
                &features.value_set,
                &doc,
                Range::new(Position::new(0, 6), Position::new(0, 9)),
                true,
                &none,
            )
            .await
            .unwrap();
        assert_eq!(step.value, "5px");
    }

    #[tokio::test]
    async fn configuration_reaches_every_worker() {
        let (mode, features) = mode(2);
        let _registration = mode.activate(&features);
        let doc = document(".a {");
        let aggregator = Aggregator::default();
        let none = CancellationToken::none();

        let diagnostics = aggregator
            .provide_diagnostics(&features.validation, &doc, &none)
            .await;
        assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::ERROR));

        for provider in features.configuration.ordered(&doc) {
            provider
                .configure(&json!({ "lint": { "unbalanced_braces": "ignore" } }))
                .await
                .unwrap();
        }
        let severities = mode
            .pool()
            .run_on_all_workers(|worker| worker.options().lint.unbalanced_braces)
            .await
            .unwrap();
        assert_eq!(severities, vec![LintSeverity::Ignore, LintSeverity::Ignore]);
        assert!(aggregator
            .provide_diagnostics(&features.validation, &doc, &none)
            .await
            .is_empty());

        let providers = features.configuration.ordered(&doc);
        let err = providers[0]
            .configure(&json!({ "lint": { "unbalanced_braces": 3 } }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidOptions(_)));
    }

    #[tokio::test]
    async fn validator_is_elected_on_one_worker() {
        let (mode, _features) = mode(2);
        mode.elect_validator().unwrap().await.unwrap().unwrap();
        assert!(mode.elect_validator().is_none());

        let flags = mode
            .pool()
            .run_on_all_workers(|worker| worker.is_validator())
            .await
            .unwrap();
        assert_eq!(flags, vec![false, true]);
    }

    #[tokio::test]
    async fn validation_runs_on_the_elected_validator() {
        let (mode, features) = mode(2);
        let _registration = mode.activate(&features);
        let doc = document(".a {");

        let diagnostics = Aggregator::default()
            .provide_diagnostics(&features.validation, &doc, &CancellationToken::none())
            .await;
        assert_eq!(diagnostics.len(), 1);

        let pool = mode.pool();
        let counts = pool
            .run_on_all_workers(|worker| (worker.is_validator(), worker.validations()))
            .await
            .unwrap();
        assert_eq!(counts, vec![(false, 0), (true, 1)]);
        assert!(pool.run_on_validator(|worker| worker.is_validator()).await.unwrap());
    }

    #[tokio::test]
    async fn colors_are_reported_through_the_aggregator() {
        let (mode, features) = mode(1);
        let _registration = mode.activate(&features);
        let doc = document("@brand: #336699;\n.a { color: @brand; border: 1px solid rgb(0, 0, 0); }\n");

        let colors = Aggregator::default()
            .provide_color_declarations(&features.color_declarations, &doc, &CancellationToken::none())
            .await;
        let found: Vec<(u32, u32, &str)> = colors
            .iter()
            .map(|c| (c.range.start.line, c.range.start.character, c.value.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![(0, 8, "#336699"), (1, 12, "#336699"), (1, 38, "rgb(0, 0, 0)")]
        );
    }
}
