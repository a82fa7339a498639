//! Background execution of expensive language work.
//!
//! Providers that need real analysis hand a closure to a [`WorkerPool`]
//! instead of doing the work inline. Pools are keyed by language and the
//! resources the workers load, and a [`WorkerRegistry`] keeps exactly one pool
//! per key.

mod pool;

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

pub use pool::{WorkerFactory, WorkerPool};

/// Identifies a set of workers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerKey {
    pub language: String,
    /// Resources the workers load, e.g. grammar or library paths.
    pub resources: Vec<String>,
}

impl WorkerKey {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            resources: Vec::new(),
        }
    }

    pub fn with_resources(mut self, resources: Vec<String>) -> Self {
        self.resources = resources;
        self
    }
}

/// A failed worker call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("failed to create worker {slot} for `{language}`: {message}")]
    Create {
        language: String,
        slot: usize,
        message: String,
    },

    #[error("worker for `{language}` crashed: {message}")]
    Crashed { language: String, message: String },

    #[error("no validator elected for `{language}`")]
    NoValidator { language: String },
}

/// One pool per key for the whole process.
pub struct WorkerRegistry<W> {
    pools: DashMap<WorkerKey, Arc<WorkerPool<W>>>,
}

impl<W: Send + Sync + 'static> WorkerRegistry<W> {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
        }
    }

    /// The pool for `key`, created with `worker_count` slots and `factory`
    /// if it does not exist yet.
    pub fn get_or_create(
        &self,
        key: WorkerKey,
        worker_count: usize,
        factory: WorkerFactory<W>,
    ) -> Arc<WorkerPool<W>> {
        let pool = self
            .pools
            .entry(key.clone())
            .or_insert_with(|| Arc::new(WorkerPool::new(key, worker_count, factory)));
        Arc::clone(pool.value())
    }

    pub fn get(&self, key: &WorkerKey) -> Option<Arc<WorkerPool<W>>> {
        self.pools.get(key).map(|pool| Arc::clone(pool.value()))
    }

    /// Drop the pool for `key`. Calls already holding it finish normally.
    pub fn remove(&self, key: &WorkerKey) -> Option<Arc<WorkerPool<W>>> {
        self.pools.remove(key).map(|(_, pool)| pool)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl<W: Send + Sync + 'static> Default for WorkerRegistry<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_pool_per_key() {
        let registry: WorkerRegistry<String> = WorkerRegistry::new();
        let factory: WorkerFactory<String> = Arc::new(|slot| Ok(format!("worker {slot}")));

        let a = registry.get_or_create(WorkerKey::new("less"), 2, Arc::clone(&factory));
        let b = registry.get_or_create(WorkerKey::new("less"), 5, Arc::clone(&factory));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.worker_count(), 2);

        let other = WorkerKey::new("less").with_resources(vec!["lib.less".into()]);
        let c = registry.get_or_create(other.clone(), 1, factory);
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(&other).is_some());
        assert!(registry.get(&other).is_none());
        assert_eq!(registry.len(), 1);
    }
}
