//! Per-path computation dedup.
//!
//! Every overlapping request for the same path joins one shared future, so N
//! simultaneous queries cost one computation. Each computation runs on its
//! own task, so it completes (and its slot is removed) even if every waiter
//! goes away. The slot is removed before any waiter sees the result.

use crate::error::LensError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type SharedCount = Shared<BoxFuture<'static, u64>>;

struct Slot {
    id: u64,
    future: SharedCount,
}

/// A joined computation. Awaiting it yields the count (0 on failure).
pub struct Flight {
    future: SharedCount,
    leader: bool,
}

impl Flight {
    /// Whether this caller started the computation (as opposed to joining).
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Await the shared result.
    pub async fn wait(self) -> u64 {
        self.future.await
    }
}

/// Remove the slot for `path` if it still belongs to computation `id`.
fn release(slots: &Mutex<HashMap<PathBuf, Slot>>, path: &Path, id: u64) {
    let mut slots = slots.lock();
    if slots.get(path).is_some_and(|slot| slot.id == id) {
        slots.remove(path);
    }
}

/// Registry of in-flight computations for one cache kind.
pub struct InFlightRegistry {
    kind: &'static str,
    slots: Arc<Mutex<HashMap<PathBuf, Slot>>>,
    next_id: AtomicU64,
}

impl InFlightRegistry {
    /// Creates an empty registry; `kind` labels log lines.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Join the computation running for `path`, or start one with `compute`.
    ///
    /// `compute` is only invoked when no computation is in flight. A failed
    /// computation resolves to 0 for every waiter; the error is logged here.
    ///
    /// Must be called from within a tokio runtime.
    pub fn join<F, Fut>(&self, path: &Path, compute: F) -> Flight
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64, LensError>> + Send + 'static,
    {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(path) {
            tracing::debug!("Joining in-flight {} count for {}", self.kind, path.display());
            return Flight {
                future: slot.future.clone(),
                leader: false,
            };
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let owned = path.to_path_buf();
        let registry = Arc::clone(&self.slots);
        let kind = self.kind;
        let work = compute();

        // The work runs on its own task so that dropping every waiter does
        // not abandon it halfway with the slot still registered.
        let task = {
            let owned = owned.clone();
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let result = work.await;
                release(&registry, &owned, id);
                match result {
                    Ok(lines) => lines,
                    Err(e) => {
                        tracing::warn!("Failed to count {} lines for {}: {}", kind, owned.display(), e);
                        0
                    }
                }
            })
        };

        let future = async move {
            match task.await {
                Ok(lines) => lines,
                Err(e) => {
                    release(&registry, &owned, id);
                    let err = LensError::TaskJoin(e.to_string());
                    tracing::warn!("{} count for {} did not finish: {}", kind, owned.display(), err);
                    0
                }
            }
        }
        .boxed()
        .shared();

        slots.insert(
            path.to_path_buf(),
            Slot {
                id,
                future: future.clone(),
            },
        );

        Flight {
            future,
            leader: true,
        }
    }

    /// Join or start, then await the result.
    pub async fn get_or_compute<F, Fut>(&self, path: &Path, compute: F) -> u64
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64, LensError>> + Send + 'static,
    {
        self.join(path, compute).wait().await
    }

    /// Whether a computation for `path` is running.
    pub fn contains(&self, path: &Path) -> bool {
        self.slots.lock().contains_key(path)
    }

    /// Number of running computations.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether nothing is running.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_overlapping_calls_share_one_computation() {
        let registry = Arc::new(InFlightRegistry::new("file"));
        let calls = Arc::new(AtomicUsize::new(0));
        let path = PathBuf::from("/repo/a.rs");

        let waiters = (0..10).map(|_| {
            let registry = Arc::clone(&registry);
            let calls = Arc::clone(&calls);
            let path = path.clone();
            async move {
                registry
                    .get_or_compute(&path, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(42)
                    })
                    .await
            }
        });

        let results = futures::future::join_all(waiters).await;
        assert!(results.iter().all(|&r| r == 42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failure_resolves_to_zero_and_clears_slot() {
        let registry = InFlightRegistry::new("folder");
        let path = PathBuf::from("/repo/missing");

        let lines = registry
            .get_or_compute(&path, || async {
                Err(LensError::io(
                    "/repo/missing",
                    std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
                ))
            })
            .await;

        assert_eq!(lines, 0);
        assert!(!registry.contains(&path));
    }

    #[tokio::test]
    async fn test_completed_slot_allows_fresh_computation() {
        let registry = InFlightRegistry::new("file");
        let path = PathBuf::from("/repo/a.rs");

        assert_eq!(registry.get_or_compute(&path, || async { Ok(1) }).await, 1);
        assert_eq!(registry.get_or_compute(&path, || async { Ok(2) }).await, 2);
    }

    #[tokio::test]
    async fn test_leader_is_first_caller_only() {
        let registry = InFlightRegistry::new("folder");
        let path = PathBuf::from("/repo");

        let first = registry.join(&path, || async { Ok(5) });
        let second = registry.join(&path, || async { Ok(9) });
        assert!(first.is_leader());
        assert!(!second.is_leader());
        assert_eq!(registry.len(), 1);

        assert_eq!(second.wait().await, 5);
        assert_eq!(first.wait().await, 5);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_computation_still_completes() {
        let registry = InFlightRegistry::new("file");
        let path = PathBuf::from("/repo/slow.rs");
        let finished = Arc::new(AtomicUsize::new(0));

        let done = Arc::clone(&finished);
        let waited = tokio::time::timeout(
            Duration::from_millis(10),
            registry.get_or_compute(&path, || async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            }),
        )
        .await;
        assert!(waited.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(!registry.contains(&path));
    }

    #[tokio::test]
    async fn test_panicking_computation_resolves_to_zero() {
        let registry = InFlightRegistry::new("folder");
        let path = PathBuf::from("/repo/broken");

        let lines = registry
            .get_or_compute(&path, || async {
                let total: Option<u64> = None;
                Ok(total.expect("walk exploded"))
            })
            .await;

        assert_eq!(lines, 0);
        assert!(registry.is_empty());
    }
}
