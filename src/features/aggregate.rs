//! Fan-out of a request to every matching provider.
//!
//! Each provider call runs as its own task. Results come back in registry
//! order no matter which call finishes first. A provider that fails or panics
//! is reported to the [`DiagnosticSink`] and contributes nothing; results that
//! are not [`Usable`] are dropped without a report.

use std::future::Future;
use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tower_lsp::lsp_types::{
    CodeLens, Diagnostic, DocumentHighlight, DocumentLink, FormattingOptions, Hover, Location,
    Position, Range, SignatureHelp, TextEdit,
};

use super::capabilities::*;
use super::CancellationToken;
use crate::document::TextDocument;
use crate::registry::LanguageFeatureRegistry;

/// Receives provider failures.
pub trait DiagnosticSink: Send + Sync {
    /// `index` is the provider's position in registry order.
    fn provider_failed(&self, capability: &'static str, index: usize, error: &ProviderError);
}

/// Logs provider failures.
#[derive(Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn provider_failed(&self, capability: &'static str, index: usize, error: &ProviderError) {
        tracing::warn!(capability, provider = index, %error, "provider failed");
    }
}

/// Runs capability requests against registries.
#[derive(Clone)]
pub struct Aggregator {
    sink: Arc<dyn DiagnosticSink>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl Aggregator {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { sink }
    }

    /// Call every provider concurrently and collect usable results in
    /// provider order.
    ///
    /// Returns once every call settled, or as soon as `token` is cancelled.
    /// On cancellation, calls that already finished still count; the rest are
    /// left running and their results are discarded.
    async fn fan_out<P, T, F, Fut>(
        &self,
        capability: &'static str,
        providers: Vec<Arc<P>>,
        token: &CancellationToken,
        call: F,
    ) -> Vec<T>
    where
        P: ?Sized + Send + Sync + 'static,
        T: Usable + Send + 'static,
        F: Fn(Arc<P>) -> Fut,
        Fut: Future<Output = ProviderResult<T>> + Send + 'static,
    {
        if providers.is_empty() || token.is_cancelled() {
            return Vec::new();
        }

        let handles: Vec<JoinHandle<ProviderResult<T>>> = providers
            .into_iter()
            .map(|provider| tokio::spawn(call(provider)))
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        let mut pending = handles.into_iter().enumerate();
        while let Some((index, mut handle)) = pending.next() {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                outcome = &mut handle => Some(outcome),
            };

            match outcome {
                Some(outcome) => self.settle(capability, index, outcome, &mut results),
                None => {
                    tracing::debug!(capability, "request cancelled, detaching pending providers");
                    let remaining = std::iter::once((index, handle)).chain(pending.by_ref());
                    for (index, handle) in remaining {
                        if handle.is_finished() {
                            let outcome = handle.await;
                            self.settle(capability, index, outcome, &mut results);
                        }
                    }
                    break;
                }
            }
        }
        results
    }

    fn settle<T: Usable>(
        &self,
        capability: &'static str,
        index: usize,
        outcome: Result<ProviderResult<T>, JoinError>,
        results: &mut Vec<T>,
    ) {
        match outcome {
            Ok(Ok(Some(value))) if value.is_usable() => results.push(value),
            Ok(Ok(_)) => {}
            Ok(Err(error)) => self.sink.provider_failed(capability, index, &error),
            Err(error) => {
                let error = ProviderError::Panicked(panic_message(error));
                self.sink.provider_failed(capability, index, &error);
            }
        }
    }

    pub async fn provide_hover(
        &self,
        registry: &LanguageFeatureRegistry<dyn HoverProvider>,
        document: &TextDocument,
        position: Position,
        token: &CancellationToken,
    ) -> Vec<Hover> {
        let providers = registry.ordered(document);
        let (document, inner) = (document.clone(), token.clone());
        self.fan_out("hover", providers, token, move |provider| {
            let (document, token) = (document.clone(), inner.clone());
            async move { provider.provide_hover(&document, position, &token).await }
        })
        .await
    }

    pub async fn provide_references(
        &self,
        registry: &LanguageFeatureRegistry<dyn ReferenceProvider>,
        document: &TextDocument,
        position: Position,
        include_declaration: bool,
        token: &CancellationToken,
    ) -> Vec<Location> {
        let providers = registry.ordered(document);
        let (document, inner) = (document.clone(), token.clone());
        let lists = self
            .fan_out("references", providers, token, move |provider| {
                let (document, token) = (document.clone(), inner.clone());
                async move {
                    provider
                        .provide_references(&document, position, include_declaration, &token)
                        .await
                }
            })
            .await;
        lists.into_iter().flatten().collect()
    }

    pub async fn provide_declarations(
        &self,
        registry: &LanguageFeatureRegistry<dyn DeclarationProvider>,
        document: &TextDocument,
        position: Position,
        token: &CancellationToken,
    ) -> Vec<Location> {
        let providers = registry.ordered(document);
        let (document, inner) = (document.clone(), token.clone());
        let lists = self
            .fan_out("declaration", providers, token, move |provider| {
                let (document, token) = (document.clone(), inner.clone());
                async move { provider.provide_declaration(&document, position, &token).await }
            })
            .await;
        lists.into_iter().flatten().collect()
    }

    pub async fn provide_occurrences(
        &self,
        registry: &LanguageFeatureRegistry<dyn OccurrencesProvider>,
        document: &TextDocument,
        position: Position,
        token: &CancellationToken,
    ) -> Vec<DocumentHighlight> {
        let providers = registry.ordered(document);
        let (document, inner) = (document.clone(), token.clone());
        let lists = self
            .fan_out("occurrences", providers, token, move |provider| {
                let (document, token) = (document.clone(), inner.clone());
                async move { provider.provide_occurrences(&document, position, &token).await }
            })
            .await;
        lists.into_iter().flatten().collect()
    }

    pub async fn provide_outline(
        &self,
        registry: &LanguageFeatureRegistry<dyn OutlineProvider>,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> Vec<OutlineEntry> {
        let providers = registry.ordered(document);
        let (document, inner) = (document.clone(), token.clone());
        let lists = self
            .fan_out("outline", providers, token, move |provider| {
                let (document, token) = (document.clone(), inner.clone());
                async move { provider.provide_outline(&document, &token).await }
            })
            .await;
        lists.into_iter().flatten().collect()
    }

    /// Suggestions of every provider, concatenated. Incomplete if any part is.
    pub async fn provide_suggestions(
        &self,
        registry: &LanguageFeatureRegistry<dyn SuggestProvider>,
        document: &TextDocument,
        position: Position,
        token: &CancellationToken,
    ) -> SuggestResult {
        let providers = registry.ordered(document);
        let (document, inner) = (document.clone(), token.clone());
        let parts = self
            .fan_out("suggest", providers, token, move |provider| {
                let (document, token) = (document.clone(), inner.clone());
                async move { provider.provide_suggestions(&document, position, &token).await }
            })
            .await;
        parts
            .into_iter()
            .fold(SuggestResult::default(), |mut merged, part| {
                merged.items.extend(part.items);
                merged.incomplete |= part.incomplete;
                merged
            })
    }

    pub async fn provide_code_lenses(
        &self,
        registry: &LanguageFeatureRegistry<dyn CodeLensProvider>,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> Vec<CodeLens> {
        let providers = registry.ordered(document);
        let (document, inner) = (document.clone(), token.clone());
        let lists = self
            .fan_out("code_lens", providers, token, move |provider| {
                let (document, token) = (document.clone(), inner.clone());
                async move { provider.provide_code_lenses(&document, &token).await }
            })
            .await;
        lists.into_iter().flatten().collect()
    }

    /// The first provider's resolution of `lens`, or `lens` unchanged.
    pub async fn resolve_code_lens(
        &self,
        registry: &LanguageFeatureRegistry<dyn CodeLensProvider>,
        document: &TextDocument,
        lens: CodeLens,
        token: &CancellationToken,
    ) -> CodeLens {
        let providers = registry.ordered(document);
        let (document, inner, original) = (document.clone(), token.clone(), lens.clone());
        self.fan_out("code_lens_resolve", providers, token, move |provider| {
            let (document, token, lens) = (document.clone(), inner.clone(), original.clone());
            async move { provider.resolve_code_lens(&document, lens, &token).await }
        })
        .await
        .into_iter()
        .find(|resolved| resolved.command.is_some())
        .unwrap_or(lens)
    }

    pub async fn provide_quick_fixes(
        &self,
        registry: &LanguageFeatureRegistry<dyn QuickFixProvider>,
        document: &TextDocument,
        range: Range,
        token: &CancellationToken,
    ) -> Vec<QuickFix> {
        let providers = registry.ordered(document);
        let (document, inner) = (document.clone(), token.clone());
        let lists = self
            .fan_out("quick_fix", providers, token, move |provider| {
                let (document, token) = (document.clone(), inner.clone());
                async move { provider.provide_quick_fixes(&document, range, &token).await }
            })
            .await;
        lists.into_iter().flatten().collect()
    }

    pub async fn provide_links(
        &self,
        registry: &LanguageFeatureRegistry<dyn LinkProvider>,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> Vec<DocumentLink> {
        let providers = registry.ordered(document);
        let (document, inner) = (document.clone(), token.clone());
        let lists = self
            .fan_out("links", providers, token, move |provider| {
                let (document, token) = (document.clone(), inner.clone());
                async move { provider.provide_links(&document, &token).await }
            })
            .await;
        lists.into_iter().flatten().collect()
    }

    pub async fn provide_color_declarations(
        &self,
        registry: &LanguageFeatureRegistry<dyn ColorDeclarationProvider>,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> Vec<ColorDeclaration> {
        let providers = registry.ordered(document);
        let (document, inner) = (document.clone(), token.clone());
        let lists = self
            .fan_out("color_declarations", providers, token, move |provider| {
                let (document, token) = (document.clone(), inner.clone());
                async move { provider.provide_color_declarations(&document, &token).await }
            })
            .await;
        lists.into_iter().flatten().collect()
    }

    pub async fn provide_diagnostics(
        &self,
        registry: &LanguageFeatureRegistry<dyn ValidationProvider>,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> Vec<Diagnostic> {
        let providers = registry.ordered(document);
        let (document, inner) = (document.clone(), token.clone());
        let lists = self
            .fan_out("validation", providers, token, move |provider| {
                let (document, token) = (document.clone(), inner.clone());
                async move { provider.validate(&document, &token).await }
            })
            .await;
        lists.into_iter().flatten().collect()
    }

    pub async fn run_task(
        &self,
        registry: &LanguageFeatureRegistry<dyn TaskProvider>,
        document: &TextDocument,
        task: TaskKind,
        token: &CancellationToken,
    ) -> Vec<TaskSummary> {
        let providers = registry.ordered(document);
        let (document, inner) = (document.clone(), token.clone());
        self.fan_out("task", providers, token, move |provider| {
            let (document, token) = (document.clone(), inner.clone());
            async move { provider.run_task(&document, task, &token).await }
        })
        .await
    }

    pub async fn provide_signature_help(
        &self,
        registry: &LanguageFeatureRegistry<dyn SignatureHelpProvider>,
        document: &TextDocument,
        position: Position,
        token: &CancellationToken,
    ) -> Option<SignatureHelp> {
        let providers = registry.ordered(document);
        let (document, inner) = (document.clone(), token.clone());
        self.fan_out("signature_help", providers, token, move |provider| {
            let (document, token) = (document.clone(), inner.clone());
            async move { provider.provide_signature_help(&document, position, &token).await }
        })
        .await
        .into_iter()
        .next()
    }

    pub async fn provide_rename(
        &self,
        registry: &LanguageFeatureRegistry<dyn RenameProvider>,
        document: &TextDocument,
        position: Position,
        new_name: &str,
        token: &CancellationToken,
    ) -> Option<RenameResult> {
        let providers = registry.ordered(document);
        let (document, inner, new_name) = (document.clone(), token.clone(), new_name.to_string());
        self.fan_out("rename", providers, token, move |provider| {
            let (document, token, new_name) = (document.clone(), inner.clone(), new_name.clone());
            async move {
                provider
                    .provide_rename(&document, position, &new_name, &token)
                    .await
            }
        })
        .await
        .into_iter()
        .next()
    }

    pub async fn provide_document_formatting(
        &self,
        registry: &LanguageFeatureRegistry<dyn FormattingProvider>,
        document: &TextDocument,
        options: &FormattingOptions,
        token: &CancellationToken,
    ) -> Option<Vec<TextEdit>> {
        let providers = registry.ordered(document);
        let (document, inner, options) = (document.clone(), token.clone(), options.clone());
        self.fan_out("formatting", providers, token, move |provider| {
            let (document, token, options) = (document.clone(), inner.clone(), options.clone());
            async move { provider.format_document(&document, &options, &token).await }
        })
        .await
        .into_iter()
        .next()
    }

    pub async fn provide_range_formatting(
        &self,
        registry: &LanguageFeatureRegistry<dyn FormattingProvider>,
        document: &TextDocument,
        range: Range,
        options: &FormattingOptions,
        token: &CancellationToken,
    ) -> Option<Vec<TextEdit>> {
        let providers = registry.ordered(document);
        let (document, inner, options) = (document.clone(), token.clone(), options.clone());
        self.fan_out("range_formatting", providers, token, move |provider| {
            let (document, token, options) = (document.clone(), inner.clone(), options.clone());
            async move { provider.format_range(&document, range, &options, &token).await }
        })
        .await
        .into_iter()
        .next()
    }

    /// Only providers listing `typed` among their trigger characters are asked.
    pub async fn provide_on_type_formatting(
        &self,
        registry: &LanguageFeatureRegistry<dyn OnTypeFormattingProvider>,
        document: &TextDocument,
        position: Position,
        typed: &str,
        options: &FormattingOptions,
        token: &CancellationToken,
    ) -> Option<Vec<TextEdit>> {
        let providers = registry
            .ordered(document)
            .into_iter()
            .filter(|provider| provider.trigger_characters().iter().any(|c| c == typed))
            .collect();
        let (document, inner, options, typed) =
            (document.clone(), token.clone(), options.clone(), typed.to_string());
        self.fan_out("on_type_formatting", providers, token, move |provider| {
            let (document, token, options, typed) =
                (document.clone(), inner.clone(), options.clone(), typed.clone());
            async move {
                provider
                    .format_on_type(&document, position, &typed, &options, &token)
                    .await
            }
        })
        .await
        .into_iter()
        .next()
    }

    pub async fn provide_navigate_value_set(
        &self,
        registry: &LanguageFeatureRegistry<dyn ValueSetNavigationProvider>,
        document: &TextDocument,
        range: Range,
        up: bool,
        token: &CancellationToken,
    ) -> Option<ValueSetReplacement> {
        let providers = registry.ordered(document);
        let (document, inner) = (document.clone(), token.clone());
        self.fan_out("navigate_value_set", providers, token, move |provider| {
            let (document, token) = (document.clone(), inner.clone());
            async move { provider.navigate_value_set(&document, range, up, &token).await }
        })
        .await
        .into_iter()
        .next()
    }

    pub async fn provide_emit_output(
        &self,
        registry: &LanguageFeatureRegistry<dyn EmitOutputProvider>,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> Option<EmitOutput> {
        let providers = registry.ordered(document);
        let (document, inner) = (document.clone(), token.clone());
        self.fan_out("emit_output", providers, token, move |provider| {
            let (document, token) = (document.clone(), inner.clone());
            async move { provider.emit_output(&document, &token).await }
        })
        .await
        .into_iter()
        .next()
    }
}

fn panic_message(error: JoinError) -> String {
    match error.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string()),
        Err(error) => error.to_string(),
    }
}
