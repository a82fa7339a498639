//! Provider contracts, one trait per capability.
//!
//! A language mode implements the traits for the capabilities it supports and
//! registers each implementation in the matching registry. Every call gets a
//! document snapshot and a [`CancellationToken`]; `Ok(None)` means "no
//! answer".

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_lsp::lsp_types::{
    CodeLens, Command, CompletionItem, Diagnostic, DocumentHighlight, DocumentLink,
    FormattingOptions, Hover, HoverContents, LSPAny, Location, MarkedString, Position, Range,
    SignatureHelp, SymbolKind, TextEdit, Url,
};

use super::CancellationToken;
use crate::document::TextDocument;
use crate::worker::WorkerError;

/// A provider that could not answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("provider panicked: {0}")]
    Panicked(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

pub type ProviderResult<T> = Result<Option<T>, ProviderError>;

// ============================================================================
// Result types
// ============================================================================

/// One outline node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    pub name: String,
    pub kind: SymbolKind,
    pub range: Range,
    pub selection_range: Range,
    pub children: Vec<OutlineEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuggestResult {
    pub items: Vec<CompletionItem>,
    /// More items exist; ask again as the user keeps typing.
    pub incomplete: bool,
}

/// A text edit in some document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEdit {
    pub uri: Url,
    pub range: Range,
    pub new_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameResult {
    pub edits: Vec<ResourceEdit>,
    /// Why the rename is not possible, if it is not.
    pub rejected: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuickFix {
    pub title: String,
    pub edits: Vec<ResourceEdit>,
    pub command: Option<Command>,
}

/// A color literal or a declaration whose value is a color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorDeclaration {
    pub range: Range,
    /// The color as written, e.g. `#336699` or `rgb(0, 0, 0)`.
    pub value: String,
}

/// Replacement for a value stepped up or down in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSetReplacement {
    pub range: Range,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub name: String,
    pub mime_type: String,
    pub content: String,
}

/// Files produced from a document, e.g. compiled output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitOutput {
    pub files: Vec<OutputFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Build,
    Rebuild,
    Clean,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSummary {
    pub task: TaskKind,
    pub errors: usize,
    pub warnings: usize,
    pub messages: Vec<String>,
}

// ============================================================================
// Completeness
// ============================================================================

/// Whether a provider result carries enough to be shown.
pub trait Usable {
    fn is_usable(&self) -> bool;
}

impl Usable for Hover {
    /// A hover needs both content and a range.
    fn is_usable(&self) -> bool {
        let has_content = match &self.contents {
            HoverContents::Scalar(marked) => !marked_is_empty(marked),
            HoverContents::Array(marked) => marked.iter().any(|m| !marked_is_empty(m)),
            HoverContents::Markup(markup) => !markup.value.trim().is_empty(),
        };
        has_content && self.range.is_some()
    }
}

fn marked_is_empty(marked: &MarkedString) -> bool {
    match marked {
        MarkedString::String(s) => s.trim().is_empty(),
        MarkedString::LanguageString(s) => s.value.trim().is_empty(),
    }
}

impl<T> Usable for Vec<T> {
    fn is_usable(&self) -> bool {
        !self.is_empty()
    }
}

impl Usable for SignatureHelp {
    fn is_usable(&self) -> bool {
        !self.signatures.is_empty()
    }
}

impl Usable for SuggestResult {
    fn is_usable(&self) -> bool {
        !self.items.is_empty() || self.incomplete
    }
}

impl Usable for RenameResult {
    fn is_usable(&self) -> bool {
        !self.edits.is_empty() || self.rejected.is_some()
    }
}

impl Usable for ValueSetReplacement {
    fn is_usable(&self) -> bool {
        !self.value.is_empty()
    }
}

impl Usable for EmitOutput {
    fn is_usable(&self) -> bool {
        !self.files.is_empty()
    }
}

impl Usable for CodeLens {
    fn is_usable(&self) -> bool {
        true
    }
}

impl Usable for TaskSummary {
    fn is_usable(&self) -> bool {
        true
    }
}

// ============================================================================
// Capabilities
// ============================================================================

#[tower_lsp::async_trait]
pub trait HoverProvider: Send + Sync {
    async fn provide_hover(
        &self,
        document: &TextDocument,
        position: Position,
        token: &CancellationToken,
    ) -> ProviderResult<Hover>;
}

#[tower_lsp::async_trait]
pub trait ReferenceProvider: Send + Sync {
    async fn provide_references(
        &self,
        document: &TextDocument,
        position: Position,
        include_declaration: bool,
        token: &CancellationToken,
    ) -> ProviderResult<Vec<Location>>;
}

#[tower_lsp::async_trait]
pub trait DeclarationProvider: Send + Sync {
    async fn provide_declaration(
        &self,
        document: &TextDocument,
        position: Position,
        token: &CancellationToken,
    ) -> ProviderResult<Vec<Location>>;
}

/// Highlights every occurrence of the symbol under the cursor.
#[tower_lsp::async_trait]
pub trait OccurrencesProvider: Send + Sync {
    async fn provide_occurrences(
        &self,
        document: &TextDocument,
        position: Position,
        token: &CancellationToken,
    ) -> ProviderResult<Vec<DocumentHighlight>>;
}

#[tower_lsp::async_trait]
pub trait OutlineProvider: Send + Sync {
    async fn provide_outline(
        &self,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> ProviderResult<Vec<OutlineEntry>>;
}

#[tower_lsp::async_trait]
pub trait RenameProvider: Send + Sync {
    async fn provide_rename(
        &self,
        document: &TextDocument,
        position: Position,
        new_name: &str,
        token: &CancellationToken,
    ) -> ProviderResult<RenameResult>;
}

#[tower_lsp::async_trait]
pub trait CodeLensProvider: Send + Sync {
    async fn provide_code_lenses(
        &self,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> ProviderResult<Vec<CodeLens>>;

    /// Fill in the command of a lens returned earlier.
    async fn resolve_code_lens(
        &self,
        _document: &TextDocument,
        lens: CodeLens,
        _token: &CancellationToken,
    ) -> ProviderResult<CodeLens> {
        Ok(Some(lens))
    }
}

#[tower_lsp::async_trait]
pub trait QuickFixProvider: Send + Sync {
    async fn provide_quick_fixes(
        &self,
        document: &TextDocument,
        range: Range,
        token: &CancellationToken,
    ) -> ProviderResult<Vec<QuickFix>>;
}

#[tower_lsp::async_trait]
pub trait SignatureHelpProvider: Send + Sync {
    fn trigger_characters(&self) -> Vec<String> {
        Vec::new()
    }

    async fn provide_signature_help(
        &self,
        document: &TextDocument,
        position: Position,
        token: &CancellationToken,
    ) -> ProviderResult<SignatureHelp>;
}

#[tower_lsp::async_trait]
pub trait SuggestProvider: Send + Sync {
    fn trigger_characters(&self) -> Vec<String> {
        Vec::new()
    }

    async fn provide_suggestions(
        &self,
        document: &TextDocument,
        position: Position,
        token: &CancellationToken,
    ) -> ProviderResult<SuggestResult>;
}

#[tower_lsp::async_trait]
pub trait FormattingProvider: Send + Sync {
    async fn format_document(
        &self,
        document: &TextDocument,
        options: &FormattingOptions,
        token: &CancellationToken,
    ) -> ProviderResult<Vec<TextEdit>>;

    async fn format_range(
        &self,
        _document: &TextDocument,
        _range: Range,
        _options: &FormattingOptions,
        _token: &CancellationToken,
    ) -> ProviderResult<Vec<TextEdit>> {
        Ok(None)
    }
}

#[tower_lsp::async_trait]
pub trait OnTypeFormattingProvider: Send + Sync {
    fn trigger_characters(&self) -> Vec<String>;

    async fn format_on_type(
        &self,
        document: &TextDocument,
        position: Position,
        typed: &str,
        options: &FormattingOptions,
        token: &CancellationToken,
    ) -> ProviderResult<Vec<TextEdit>>;
}

/// Steps the value in `range` to the next (`up`) or previous value of its set.
#[tower_lsp::async_trait]
pub trait ValueSetNavigationProvider: Send + Sync {
    async fn navigate_value_set(
        &self,
        document: &TextDocument,
        range: Range,
        up: bool,
        token: &CancellationToken,
    ) -> ProviderResult<ValueSetReplacement>;
}

#[tower_lsp::async_trait]
pub trait ColorDeclarationProvider: Send + Sync {
    async fn provide_color_declarations(
        &self,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> ProviderResult<Vec<ColorDeclaration>>;
}

#[tower_lsp::async_trait]
pub trait LinkProvider: Send + Sync {
    async fn provide_links(
        &self,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> ProviderResult<Vec<DocumentLink>>;
}

#[tower_lsp::async_trait]
pub trait EmitOutputProvider: Send + Sync {
    async fn emit_output(
        &self,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> ProviderResult<EmitOutput>;
}

#[tower_lsp::async_trait]
pub trait ValidationProvider: Send + Sync {
    async fn validate(
        &self,
        document: &TextDocument,
        token: &CancellationToken,
    ) -> ProviderResult<Vec<Diagnostic>>;
}

#[tower_lsp::async_trait]
pub trait TaskProvider: Send + Sync {
    async fn run_task(
        &self,
        document: &TextDocument,
        task: TaskKind,
        token: &CancellationToken,
    ) -> ProviderResult<TaskSummary>;
}

/// Accepts an open-ended options bag. Validating it is up to the provider.
#[tower_lsp::async_trait]
pub trait ConfigurationProvider: Send + Sync {
    async fn configure(&self, options: &LSPAny) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use tower_lsp::lsp_types::{MarkupContent, MarkupKind, SignatureInformation};

    use super::*;

    fn hover(text: &str, range: Option<Range>) -> Hover {
        Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: text.to_string(),
            }),
            range,
        }
    }

    #[test]
    fn hover_needs_content_and_range() {
        let range = Range::new(Position::new(0, 0), Position::new(0, 1));
        assert!(hover("text", Some(range)).is_usable());
        assert!(!hover("text", None).is_usable());
        assert!(!hover("  ", Some(range)).is_usable());

        let scalar = Hover {
            contents: HoverContents::Array(vec![MarkedString::String(String::new())]),
            range: Some(range),
        };
        assert!(!scalar.is_usable());
    }

    #[test]
    fn empty_results_are_not_usable() {
        assert!(!Vec::<Location>::new().is_usable());
        assert!(!SuggestResult::default().is_usable());
        assert!(!RenameResult::default().is_usable());
        assert!(!EmitOutput::default().is_usable());
        let help = SignatureHelp {
            signatures: vec![SignatureInformation {
                label: "f(a)".into(),
                documentation: None,
                parameters: None,
                active_parameter: None,
            }],
            active_signature: None,
            active_parameter: None,
        };
        assert!(help.is_usable());
    }

    #[test]
    fn task_kinds_deserialize_lowercase() {
        let kind: TaskKind = serde_json::from_str("\"rebuild\"").unwrap();
        assert_eq!(kind, TaskKind::Rebuild);
    }
}
