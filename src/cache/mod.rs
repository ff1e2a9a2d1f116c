//! Capacity-bounded, mutex-guarded dataset store for the remote backend.
//!
//! Constructed once at service start and passed by reference into every
//! handler; there is deliberately no module-level singleton. Eviction is
//! strict least-recently-used with no TTL.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use tracing::{debug, warn};

use crate::dataset::Dataset;
use crate::error::ExecError;

pub const DEFAULT_CAPACITY: usize = 1;

pub struct DatasetCache {
    inner: Mutex<LruCache<String, Dataset>>,
}

impl std::fmt::Debug for DatasetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl DatasetCache {
    pub fn new(capacity: usize) -> Result<Self, ExecError> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| ExecError::Config("cache capacity must be at least 1".into()))?;
        if capacity.get() == DEFAULT_CAPACITY {
            // Operational constraint, not a bug: concurrent sessions using
            // different dataset ids will evict each other's entries.
            warn!(
                capacity = capacity.get(),
                "dataset cache at default capacity; concurrent sessions with distinct ids evict each other"
            );
        }
        Ok(Self {
            inner: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Hit promotes `id` to most-recently-used.
    pub fn get(&self, id: &str) -> Option<Dataset> {
        self.lock().get(id).cloned()
    }

    /// Existing id: replace content and promote. New id at capacity: evict
    /// the least-recently-used entry first.
    pub fn put(&self, id: impl Into<String>, dataset: Dataset) {
        let id = id.into();
        let mut inner = self.lock();
        if inner.len() == inner.cap().get() && !inner.contains(&id) {
            if let Some((evicted, _)) = inner.peek_lru() {
                debug!(evicted = %evicted, incoming = %id, "evicting least-recently-used dataset");
            }
        }
        inner.put(id, dataset);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Dataset>> {
        // A poisoned lock only means another caller panicked mid-operation;
        // the LRU structure itself is still consistent.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
