//! Language modes: the providers of one language, registered and disposed
//! together.

mod custom;
pub mod javascript;
pub mod less;
pub mod plaintext;

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

pub use custom::GrammarMode;
pub use javascript::JavaScriptMode;
pub use less::{LessMode, LessWorker};
pub use plaintext::PlainTextMode;

use crate::features::*;
use crate::lexer::{Grammar, TokenizerRegistry};
use crate::registry::{LanguageFeatureRegistry, Registration};
use crate::settings::Settings;
use crate::worker::WorkerRegistry;

/// One registry per capability.
#[derive(Default)]
pub struct LanguageFeatures {
    pub tokenizers: Arc<TokenizerRegistry>,
    pub rich_edit: LanguageFeatureRegistry<RichEditSupport>,
    pub hover: LanguageFeatureRegistry<dyn HoverProvider>,
    pub references: LanguageFeatureRegistry<dyn ReferenceProvider>,
    pub declaration: LanguageFeatureRegistry<dyn DeclarationProvider>,
    pub occurrences: LanguageFeatureRegistry<dyn OccurrencesProvider>,
    pub outline: LanguageFeatureRegistry<dyn OutlineProvider>,
    pub rename: LanguageFeatureRegistry<dyn RenameProvider>,
    pub code_lens: LanguageFeatureRegistry<dyn CodeLensProvider>,
    pub quick_fix: LanguageFeatureRegistry<dyn QuickFixProvider>,
    pub signature_help: LanguageFeatureRegistry<dyn SignatureHelpProvider>,
    pub suggest: LanguageFeatureRegistry<dyn SuggestProvider>,
    pub formatting: LanguageFeatureRegistry<dyn FormattingProvider>,
    pub on_type_formatting: LanguageFeatureRegistry<dyn OnTypeFormattingProvider>,
    pub value_set: LanguageFeatureRegistry<dyn ValueSetNavigationProvider>,
    pub links: LanguageFeatureRegistry<dyn LinkProvider>,
    pub color_declarations: LanguageFeatureRegistry<dyn ColorDeclarationProvider>,
    pub emit_output: LanguageFeatureRegistry<dyn EmitOutputProvider>,
    pub validation: LanguageFeatureRegistry<dyn ValidationProvider>,
    pub tasks: LanguageFeatureRegistry<dyn TaskProvider>,
    pub configuration: LanguageFeatureRegistry<dyn ConfigurationProvider>,
}

impl LanguageFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registrations across every registry.
    pub fn len(&self) -> usize {
        self.tokenizers.registry().len()
            + self.rich_edit.len()
            + self.hover.len()
            + self.references.len()
            + self.declaration.len()
            + self.occurrences.len()
            + self.outline.len()
            + self.rename.len()
            + self.code_lens.len()
            + self.quick_fix.len()
            + self.signature_help.len()
            + self.suggest.len()
            + self.formatting.len()
            + self.on_type_formatting.len()
            + self.value_set.len()
            + self.links.len()
            + self.color_declarations.len()
            + self.emit_output.len()
            + self.validation.len()
            + self.tasks.len()
            + self.configuration.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registrations made by one activation. Dropping it deactivates the mode.
#[derive(Default)]
pub struct ModeRegistration {
    registrations: Vec<Registration>,
}

impl ModeRegistration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, registration: Registration) {
        self.registrations.push(registration);
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn dispose(&self) {
        for registration in &self.registrations {
            registration.dispose();
        }
    }
}

pub trait LanguageMode: Send + Sync {
    /// Language id the mode serves.
    fn id(&self) -> &str;

    /// Modes that must be active first, e.g. languages embedded in this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Register every provider of the mode into `features`.
    fn activate(&self, features: &LanguageFeatures) -> ModeRegistration;

    /// Called once after the mode's registrations are in place.
    fn creation_done(&self) {}
}

/// Known modes and the ones currently active.
pub struct ModeService {
    features: Arc<LanguageFeatures>,
    modes: DashMap<String, Arc<dyn LanguageMode>>,
    active: DashMap<String, ModeRegistration>,
}

impl ModeService {
    pub fn new(features: Arc<LanguageFeatures>) -> Self {
        Self {
            features,
            modes: DashMap::new(),
            active: DashMap::new(),
        }
    }

    pub fn features(&self) -> &Arc<LanguageFeatures> {
        &self.features
    }

    /// Make `mode` available. A mode with the same id is replaced; an active
    /// one stays active until deactivated.
    pub fn add_mode(&self, mode: Arc<dyn LanguageMode>) {
        self.modes.insert(mode.id().to_string(), mode);
    }

    pub fn has_mode(&self, id: &str) -> bool {
        self.modes.contains_key(id)
    }

    /// Activate the mode for `id` and its dependencies. Returns `false` when
    /// no such mode exists or it is already active.
    pub fn activate(&self, id: &str) -> bool {
        let Some(mode) = self.modes.get(id).map(|m| Arc::clone(m.value())) else {
            return false;
        };
        if self.active.contains_key(id) {
            return false;
        }
        for dependency in mode.dependencies() {
            if dependency != id {
                self.activate(&dependency);
            }
        }

        match self.active.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let registration = mode.activate(&self.features);
                tracing::debug!(mode = id, registrations = registration.len(), "activated mode");
                slot.insert(registration);
                mode.creation_done();
                true
            }
        }
    }

    /// Dispose every registration of the mode for `id`.
    pub fn deactivate(&self, id: &str) -> bool {
        match self.active.remove(id) {
            Some((_, registration)) => {
                registration.dispose();
                tracing::debug!(mode = id, "deactivated mode");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.contains_key(id)
    }

    pub fn active_modes(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

/// Every built-in mode plus one mode per extra grammar. Modes that fail to
/// build are logged and left out.
pub fn builtin_modes(
    settings: &Settings,
    grammars: &[Grammar],
    workers: &WorkerRegistry<LessWorker>,
) -> Vec<Arc<dyn LanguageMode>> {
    let mut modes: Vec<Arc<dyn LanguageMode>> = vec![Arc::new(PlainTextMode::new())];

    match JavaScriptMode::new() {
        Ok(mode) => modes.push(Arc::new(mode)),
        Err(e) => tracing::error!(error = %e, "javascript mode unavailable"),
    }
    match LessMode::from_settings(workers, settings) {
        Ok(mode) => modes.push(Arc::new(mode)),
        Err(e) => tracing::error!(error = %e, "less mode unavailable"),
    }
    for grammar in grammars {
        match GrammarMode::new(grammar) {
            Ok(mode) => modes.push(Arc::new(mode)),
            Err(e) => tracing::warn!(error = %e, "skipping grammar mode"),
        }
    }
    modes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ModeService {
        let service = ModeService::new(Arc::new(LanguageFeatures::new()));
        let workers = WorkerRegistry::new();
        for mode in builtin_modes(&Settings::default(), &[], &workers) {
            service.add_mode(mode);
        }
        service
    }

    #[test]
    fn activation_is_idempotent() {
        let service = service();
        assert!(service.activate(plaintext::LANGUAGE_ID));
        let count = service.features().len();
        assert!(count > 0);

        assert!(!service.activate(plaintext::LANGUAGE_ID));
        assert_eq!(service.features().len(), count);
        assert!(!service.activate("cobol"));
    }

    #[test]
    fn dependencies_activate_first() {
        let service = service();
        assert!(service.activate(less::LANGUAGE_ID));
        assert_eq!(
            service.active_modes(),
            vec![javascript::LANGUAGE_ID.to_string(), less::LANGUAGE_ID.to_string()]
        );
        assert!(service
            .features()
            .tokenizers
            .for_language(javascript::LANGUAGE_ID)
            .is_some());
    }

    #[test]
    fn activate_deactivate_cycles_leave_registries_empty() {
        let service = service();
        for _ in 0..3 {
            for id in [plaintext::LANGUAGE_ID, less::LANGUAGE_ID] {
                service.activate(id);
            }
            assert!(!service.features().is_empty());

            for id in service.active_modes() {
                assert!(service.deactivate(&id));
            }
            assert!(service.features().is_empty());
            assert!(service.active_modes().is_empty());
        }
        assert!(!service.deactivate(less::LANGUAGE_ID));
    }

    #[test]
    fn dropping_a_registration_disposes_it() {
        let features = LanguageFeatures::new();
        let registration = PlainTextMode::new().activate(&features);
        assert_eq!(features.len(), registration.len());
        drop(registration);
        assert!(features.is_empty());
    }
}
