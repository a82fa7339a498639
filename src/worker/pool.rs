//! A fixed set of lazily created workers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use super::{WorkerError, WorkerKey};

/// Creates the worker for a slot.
pub type WorkerFactory<W> = Arc<dyn Fn(usize) -> Result<W, WorkerError> + Send + Sync>;

/// Slot requests run on.
const ELECTED_SLOT: usize = 0;

/// `worker_count` worker slots sharing one factory.
///
/// A slot's worker is created on first use. Creation is serialized per slot,
/// so concurrent first calls still create one worker; afterwards calls run
/// concurrently. Work runs on the blocking thread pool, so a panicking closure
/// surfaces as [`WorkerError::Crashed`] instead of taking the caller down.
pub struct WorkerPool<W> {
    key: WorkerKey,
    slots: Vec<OnceCell<Arc<W>>>,
    factory: WorkerFactory<W>,
    validator_elected: AtomicBool,
    created: AtomicUsize,
}

impl<W: Send + Sync + 'static> WorkerPool<W> {
    /// A pool with at least one slot.
    pub fn new(key: WorkerKey, worker_count: usize, factory: WorkerFactory<W>) -> Self {
        Self {
            key,
            slots: (0..worker_count.max(1)).map(|_| OnceCell::new()).collect(),
            factory,
            validator_elected: AtomicBool::new(false),
            created: AtomicUsize::new(0),
        }
    }

    pub fn key(&self) -> &WorkerKey {
        &self.key
    }

    pub fn worker_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of workers created so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    async fn worker(&self, slot: usize) -> Result<Arc<W>, WorkerError> {
        let worker = self.slots[slot]
            .get_or_try_init(|| async {
                tracing::debug!(language = %self.key.language, slot, "creating worker");
                let factory = Arc::clone(&self.factory);
                let worker = tokio::task::spawn_blocking(move || factory(slot))
                    .await
                    .map_err(|e| self.crashed(e))??;
                self.created.fetch_add(1, Ordering::AcqRel);
                Ok::<_, WorkerError>(Arc::new(worker))
            })
            .await?;
        Ok(Arc::clone(worker))
    }

    async fn run<F, T>(&self, slot: usize, f: F) -> Result<T, WorkerError>
    where
        F: FnOnce(&W) -> T + Send + 'static,
        T: Send + 'static,
    {
        let worker = self.worker(slot).await?;
        tokio::task::spawn_blocking(move || f(worker.as_ref()))
            .await
            .map_err(|e| self.crashed(e))
    }

    fn crashed(&self, error: tokio::task::JoinError) -> WorkerError {
        tracing::error!(language = %self.key.language, error = %error, "worker call failed");
        WorkerError::Crashed {
            language: self.key.language.clone(),
            message: error.to_string(),
        }
    }

    /// Run `f` on the elected worker.
    pub async fn run_on_elected_worker<F, T>(&self, f: F) -> Result<T, WorkerError>
    where
        F: FnOnce(&W) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.run(ELECTED_SLOT, f).await
    }

    fn validator_slot(&self) -> usize {
        self.slots.len() - 1
    }

    /// Run `f` on the worker elected by [`WorkerPool::elect_validator`].
    pub async fn run_on_validator<F, T>(&self, f: F) -> Result<T, WorkerError>
    where
        F: FnOnce(&W) -> T + Send + 'static,
        T: Send + 'static,
    {
        if !self.has_validator() {
            return Err(WorkerError::NoValidator {
                language: self.key.language.clone(),
            });
        }
        self.run(self.validator_slot(), f).await
    }

    /// Run `f` on every worker. Results are in slot order.
    pub async fn run_on_all_workers<F, T>(&self, f: F) -> Result<Vec<T>, WorkerError>
    where
        F: Fn(&W) -> T + Send + Sync + 'static,
        T: Send + 'static,
    {
        let f = Arc::new(f);
        let mut calls = Vec::with_capacity(self.slots.len());
        for slot in 0..self.slots.len() {
            let worker = self.worker(slot).await?;
            let f = Arc::clone(&f);
            calls.push(tokio::task::spawn_blocking(move || f(worker.as_ref())));
        }

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(call.await.map_err(|e| self.crashed(e))?);
        }
        Ok(results)
    }

    /// Elect one worker to run `f`, once for the life of the pool.
    ///
    /// Returns the handle of the validation task, or `None` when a validator
    /// was already elected. A failed election can be retried.
    pub fn elect_validator<F>(self: &Arc<Self>, f: F) -> Option<JoinHandle<Result<(), WorkerError>>>
    where
        F: FnOnce(&W) + Send + 'static,
    {
        if self.validator_elected.swap(true, Ordering::AcqRel) {
            return None;
        }
        let slot = self.validator_slot();
        tracing::debug!(language = %self.key.language, slot, "elected validator");
        let pool = Arc::clone(self);
        Some(tokio::spawn(async move {
            let result = pool.run(slot, f).await;
            if let Err(e) = &result {
                tracing::warn!(language = %pool.key.language, error = %e, "validator election failed");
                pool.validator_elected.store(false, Ordering::Release);
            }
            result
        }))
    }

    pub fn has_validator(&self) -> bool {
        self.validator_elected.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    struct Counter {
        slot: usize,
    }

    fn pool(count: usize) -> Arc<WorkerPool<Counter>> {
        let factory: WorkerFactory<Counter> = Arc::new(|slot| {
            std::thread::sleep(Duration::from_millis(5));
            Ok(Counter { slot })
        });
        Arc::new(WorkerPool::new(WorkerKey::new("test"), count, factory))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_calls_create_one_worker() {
        let pool = pool(2);
        let mut calls = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            calls.push(tokio::spawn(async move {
                pool.run_on_elected_worker(|w| w.slot).await
            }));
        }
        for call in calls {
            assert_eq!(call.await.unwrap(), Ok(0));
        }
        assert_eq!(pool.created(), 1);
    }

    #[tokio::test]
    async fn all_workers_in_slot_order() {
        let pool = pool(3);
        let slots = pool.run_on_all_workers(|w| w.slot).await.unwrap();
        assert_eq!(slots, vec![0, 1, 2]);
        assert_eq!(pool.created(), 3);
    }

    #[tokio::test]
    async fn panics_surface_as_errors() {
        let pool = pool(1);
        let result: Result<(), _> = pool
            .run_on_elected_worker(|_| panic!("analysis blew up"))
            .await;
        assert!(matches!(result, Err(WorkerError::Crashed { .. })));

        // The worker itself survives.
        assert_eq!(pool.run_on_elected_worker(|w| w.slot).await, Ok(0));
    }

    #[tokio::test]
    async fn creation_failures_are_reported() {
        let factory: WorkerFactory<Counter> = Arc::new(|slot| {
            Err(WorkerError::Create {
                language: "test".into(),
                slot,
                message: "missing grammar".into(),
            })
        });
        let pool = WorkerPool::new(WorkerKey::new("test"), 1, factory);
        let result = pool.run_on_elected_worker(|w| w.slot).await;
        assert!(matches!(result, Err(WorkerError::Create { slot: 0, .. })));
        assert_eq!(pool.created(), 0);
    }

    #[tokio::test]
    async fn validator_is_elected_once() {
        let pool = pool(2);
        let runs = Arc::new(AtomicUsize::new(0));

        let first = {
            let runs = Arc::clone(&runs);
            pool.elect_validator(move |w| {
                assert_eq!(w.slot, 1);
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };
        let second = {
            let runs = Arc::clone(&runs);
            pool.elect_validator(move |_| {
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert!(second.is_none());
        first.unwrap().await.unwrap().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(pool.has_validator());
    }

    #[tokio::test]
    async fn validator_calls_run_on_the_elected_slot() {
        let pool = pool(3);
        let result = pool.run_on_validator(|w| w.slot).await;
        assert!(matches!(result, Err(WorkerError::NoValidator { .. })));

        pool.elect_validator(|_| {}).unwrap().await.unwrap().unwrap();
        assert_eq!(pool.run_on_validator(|w| w.slot).await, Ok(2));
        assert_eq!(pool.run_on_elected_worker(|w| w.slot).await, Ok(0));
    }

    #[tokio::test]
    async fn failed_election_can_be_retried() {
        let pool = pool(2);
        let failed = pool
            .elect_validator(|_| panic!("validator setup failed"))
            .unwrap()
            .await
            .unwrap();
        assert!(matches!(failed, Err(WorkerError::Crashed { .. })));
        assert!(!pool.has_validator());

        pool.elect_validator(|_| {}).unwrap().await.unwrap().unwrap();
        assert!(pool.has_validator());
    }
}
