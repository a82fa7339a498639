//! Per-capability provider registries.
//!
//! A [`LanguageFeatureRegistry`] holds every provider of one capability
//! together with the documents it applies to. Registering returns a
//! [`Registration`]; disposing or dropping it removes exactly that entry.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::watch;

use crate::document::TextDocument;

/// Process-wide registration counter. Orders providers with equal scores.
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Which documents a provider applies to.
///
/// A missing or `*` language and a missing scheme match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSelector {
    language: Option<String>,
    scheme: Option<String>,
}

impl DocumentSelector {
    /// Matches every document.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()).filter(|l| l != "*"),
            scheme: None,
        }
    }

    /// Restrict to documents whose URI has `scheme`.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Whether a document with `language` and `scheme` is selected. A scheme
    /// restriction never matches when the scheme is unknown.
    pub fn matches(&self, language: &str, scheme: Option<&str>) -> bool {
        let language_ok = self.language.as_deref().map_or(true, |l| l == language);
        let scheme_ok = match (&self.scheme, scheme) {
            (None, _) => true,
            (Some(wanted), Some(scheme)) => wanted == scheme,
            (Some(_), None) => false,
        };
        language_ok && scheme_ok
    }
}

impl From<&str> for DocumentSelector {
    fn from(language: &str) -> Self {
        DocumentSelector::language(language)
    }
}

struct Entry<P: ?Sized> {
    selector: DocumentSelector,
    provider: Arc<P>,
    score: i32,
}

struct Inner<P: ?Sized> {
    entries: DashMap<u64, Entry<P>>,
    changes: watch::Sender<u64>,
}

impl<P: ?Sized> Inner<P> {
    fn bump(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }
}

trait Unregister: Send + Sync {
    fn unregister(&self, sequence: u64);
}

impl<P: ?Sized + Send + Sync> Unregister for Inner<P> {
    fn unregister(&self, sequence: u64) {
        if self.entries.remove(&sequence).is_some() {
            self.bump();
        }
    }
}

/// Providers of one capability, ordered by score then registration order.
pub struct LanguageFeatureRegistry<P: ?Sized> {
    inner: Arc<Inner<P>>,
}

impl<P: ?Sized + Send + Sync + 'static> LanguageFeatureRegistry<P> {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                changes,
            }),
        }
    }

    /// Register `provider` with score 0.
    pub fn register(&self, selector: impl Into<DocumentSelector>, provider: Arc<P>) -> Registration {
        self.register_with_score(selector, 0, provider)
    }

    /// Register `provider`. Higher scores are asked first.
    pub fn register_with_score(
        &self,
        selector: impl Into<DocumentSelector>,
        score: i32,
        provider: Arc<P>,
    ) -> Registration {
        let sequence = NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        self.inner.entries.insert(
            sequence,
            Entry {
                selector: selector.into(),
                provider,
                score,
            },
        );
        self.inner.bump();

        let inner: Arc<dyn Unregister> = self.inner.clone();
        Registration {
            owner: Arc::downgrade(&inner),
            sequence,
            disposed: AtomicBool::new(false),
        }
    }

    /// Providers applying to `document`, best first.
    pub fn ordered(&self, document: &TextDocument) -> Vec<Arc<P>> {
        self.ordered_matching(document.language_id(), Some(document.uri().scheme()))
    }

    /// Providers applying to a document with `language` and `scheme`, best
    /// first. The result is a snapshot.
    pub fn ordered_matching(&self, language: &str, scheme: Option<&str>) -> Vec<Arc<P>> {
        let mut matching: Vec<(i32, u64, Arc<P>)> = self
            .inner
            .entries
            .iter()
            .filter(|entry| entry.selector.matches(language, scheme))
            .map(|entry| (entry.score, *entry.key(), Arc::clone(&entry.provider)))
            .collect();
        matching.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        matching.into_iter().map(|(_, _, provider)| provider).collect()
    }

    pub fn has(&self, document: &TextDocument) -> bool {
        let scheme = document.uri().scheme();
        self.inner
            .entries
            .iter()
            .any(|entry| entry.selector.matches(document.language_id(), Some(scheme)))
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// A counter bumped on every registration and removal.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }
}

impl<P: ?Sized + Send + Sync + 'static> Default for LanguageFeatureRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ?Sized> fmt::Debug for LanguageFeatureRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageFeatureRegistry")
            .field("len", &self.inner.entries.len())
            .finish()
    }
}

/// Handle to one registry entry.
///
/// Dropping the handle removes the entry. It does not keep the registry
/// alive.
pub struct Registration {
    owner: Weak<dyn Unregister>,
    sequence: u64,
    disposed: AtomicBool,
}

impl Registration {
    /// Remove the entry. Later calls do nothing.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(owner) = self.owner.upgrade() {
            owner.unregister(self.sequence);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("sequence", &self.sequence)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
