//! Line tokenization and multi-provider language features, served over LSP.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService};

pub mod document;
pub mod features;
pub mod lexer;
pub mod lsp;
pub mod modes;
pub mod registry;
pub mod settings;
pub mod stream;
pub mod worker;

pub use document::{DocumentState, DocumentStore, LineIndex, TextDocument, TokenizedLines};
pub use features::{Aggregator, CancellationToken};
pub use modes::{LanguageFeatures, LanguageMode, ModeService};
pub use settings::{discover_settings, load_settings, Settings};

use modes::LessWorker;
use worker::WorkerRegistry;

/// Cancels a request's token when the request future is dropped, which is
/// what tower-lsp does on `$/cancelRequest`.
struct RequestGuard(CancellationToken);

impl RequestGuard {
    fn new() -> Self {
        Self(CancellationToken::new())
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

pub struct Backend {
    client: Client,
    documents: DocumentStore,
    modes: ModeService,
    aggregator: Aggregator,
    workers: WorkerRegistry<LessWorker>,
    settings: OnceLock<Settings>,
    workspace_root: OnceLock<PathBuf>,
    /// Token of the latest validation per document.
    validations: DashMap<Url, CancellationToken>,
}

impl Backend {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            documents: DocumentStore::new(),
            modes: ModeService::new(Arc::new(LanguageFeatures::new())),
            aggregator: Aggregator::default(),
            workers: WorkerRegistry::new(),
            settings: OnceLock::new(),
            workspace_root: OnceLock::new(),
            validations: DashMap::new(),
        }
    }

    fn features(&self) -> &LanguageFeatures {
        self.modes.features()
    }

    fn settings(&self) -> &Settings {
        self.settings.get_or_init(Settings::default)
    }

    fn open_document(&self, document: TextDocument) {
        self.modes.activate(document.language_id());
        let lines = self
            .features()
            .tokenizers
            .for_language(document.language_id())
            .map(|tokenizer| {
                TokenizedLines::new(
                    tokenizer,
                    self.settings().tokenizer.max_line_length,
                    document.text(),
                )
            });
        if lines.is_none() {
            tracing::debug!(language = document.language_id(), "no tokenizer for document");
        }
        self.documents.open(document, lines);
    }

    /// Validate a document and publish the result, superseding any validation
    /// still running for it.
    async fn publish_diagnostics_for(&self, document: TextDocument) {
        let token = CancellationToken::new();
        if let Some(previous) = self.validations.insert(document.uri().clone(), token.clone()) {
            previous.cancel();
        }

        let diagnostics = self
            .aggregator
            .provide_diagnostics(&self.features().validation, &document, &token)
            .await;
        if token.is_cancelled() {
            return;
        }

        self.client
            .publish_diagnostics(document.uri().clone(), diagnostics, Some(document.version()))
            .await;
    }

    fn document(&self, uri: &Url) -> Option<TextDocument> {
        let document = self.documents.get(uri);
        if document.is_none() {
            tracing::debug!(%uri, "request for unknown document");
        }
        document
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        // Extract workspace root from params
        let workspace_root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|f| f.uri.to_file_path().ok())
            .or_else(|| {
                #[allow(deprecated)]
                params.root_uri.as_ref()?.to_file_path().ok()
            });

        let (settings, grammars) = match workspace_root {
            Some(root) => {
                let _ = self.workspace_root.set(root.clone());

                // Discover settings by walking up the directory tree
                let (settings, settings_dir) = settings::discover_settings(&root);
                let grammars = settings::load_grammars(&settings, &settings_dir);
                (settings, grammars)
            }
            None => (Settings::default(), Vec::new()),
        };

        for mode in modes::builtin_modes(&settings, &grammars, &self.workers) {
            self.modes.add_mode(mode);
        }
        let _ = self.settings.set(settings);

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                references_provider: Some(OneOf::Left(true)),
                definition_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                document_formatting_provider: Some(OneOf::Left(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec!["@".to_string(), ":".to_string()]),
                    resolve_provider: Some(false),
                    ..Default::default()
                }),
                semantic_tokens_provider: Some(
                    SemanticTokensServerCapabilities::SemanticTokensOptions(
                        SemanticTokensOptions {
                            legend: lsp::legend(),
                            full: Some(SemanticTokensFullOptions::Bool(true)),
                            range: None,
                            work_done_progress_options: WorkDoneProgressOptions::default(),
                        },
                    ),
                ),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "langmode language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        for id in self.modes.active_modes() {
            self.modes.deactivate(&id);
        }
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let item = params.text_document;
        let document = TextDocument::new(item.uri, item.language_id, item.version, item.text);
        self.open_document(document.clone());
        self.publish_diagnostics_for(document).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // We use FULL sync, so there's exactly one change with the full text
        let Some(change) = params.content_changes.into_iter().next() else {
            return;
        };
        let uri = params.text_document.uri;
        let Some((document, retokenized)) =
            self.documents
                .update(&uri, params.text_document.version, change.text)
        else {
            tracing::warn!(%uri, "change for a document that is not open");
            return;
        };
        tracing::debug!(%uri, lines = ?retokenized, "document changed");
        self.publish_diagnostics_for(document).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.close(&uri);
        if let Some((_, token)) = self.validations.remove(&uri) {
            token.cancel();
        }
        // Clear diagnostics
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        // Options are keyed by language id.
        let Some(options) = params.settings.as_object() else {
            tracing::warn!("configuration is not an object, ignoring");
            return;
        };
        for (language, value) in options {
            for provider in self
                .features()
                .configuration
                .ordered_matching(language, None)
            {
                if let Err(e) = provider.configure(value).await {
                    tracing::warn!(%language, error = %e, "configuration rejected");
                    self.client
                        .show_message(MessageType::WARNING, format!("{language}: {e}"))
                        .await;
                }
            }
        }

        for document in self.documents.documents() {
            self.publish_diagnostics_for(document).await;
        }
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some(document) = self.document(uri) else {
            return Ok(None);
        };

        let guard = RequestGuard::new();
        let hovers = self
            .aggregator
            .provide_hover(&self.features().hover, &document, position, &guard.0)
            .await;
        Ok(lsp::merge_hovers(hovers))
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let Some(document) = self.document(uri) else {
            return Ok(None);
        };

        let guard = RequestGuard::new();
        let locations = self
            .aggregator
            .provide_references(
                &self.features().references,
                &document,
                position,
                params.context.include_declaration,
                &guard.0,
            )
            .await;
        Ok((!locations.is_empty()).then_some(locations))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some(document) = self.document(uri) else {
            return Ok(None);
        };

        let guard = RequestGuard::new();
        let locations = self
            .aggregator
            .provide_declarations(&self.features().declaration, &document, position, &guard.0)
            .await;
        Ok((!locations.is_empty()).then_some(GotoDefinitionResponse::Array(locations)))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let Some(document) = self.document(&params.text_document.uri) else {
            return Ok(None);
        };

        let guard = RequestGuard::new();
        let outline = self
            .aggregator
            .provide_outline(&self.features().outline, &document, &guard.0)
            .await;
        if outline.is_empty() {
            return Ok(None);
        }
        Ok(Some(DocumentSymbolResponse::Nested(
            outline.into_iter().map(lsp::document_symbol).collect(),
        )))
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let Some(document) = self.document(uri) else {
            return Ok(None);
        };

        let guard = RequestGuard::new();
        let result = self
            .aggregator
            .provide_suggestions(&self.features().suggest, &document, position, &guard.0)
            .await;
        Ok(lsp::completion_response(result))
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        let Some(document) = self.document(&params.text_document.uri) else {
            return Ok(None);
        };

        let guard = RequestGuard::new();
        Ok(self
            .aggregator
            .provide_document_formatting(
                &self.features().formatting,
                &document,
                &params.options,
                &guard.0,
            )
            .await)
    }

    async fn semantic_tokens_full(
        &self,
        params: SemanticTokensParams,
    ) -> Result<Option<SemanticTokensResult>> {
        let tokens = self
            .documents
            .read(&params.text_document.uri, |state| {
                let lines = state.lines.as_ref()?;
                Some(lsp::tokens_for_lines(state.document.index(), lines))
            })
            .flatten();

        Ok(tokens.map(|data| {
            SemanticTokensResult::Tokens(SemanticTokens {
                result_id: None,
                data,
            })
        }))
    }
}

pub fn create_service() -> (LspService<Backend>, tower_lsp::ClientSocket) {
    LspService::new(Backend::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_can_be_created() {
        let (_service, _socket) = create_service();
    }

    #[test]
    fn dropping_the_guard_cancels() {
        let guard = RequestGuard::new();
        let token = guard.0.clone();
        assert!(!token.is_cancelled());
        drop(guard);
        assert!(token.is_cancelled());
    }
}
