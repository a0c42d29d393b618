//! Fixed-size pool of source connections.

use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info};

use crate::errors::PipelineError;
use crate::model::BoundModel;
use relational_indexer_repository::RelationalSource;

/// Smallest accepted pool size.
pub const MIN_POOL_SIZE: usize = 1;

/// Largest accepted pool size.
pub const MAX_POOL_SIZE: usize = 8;

/// A live source handle together with the model bound against it.
pub struct PoolEntry {
    pub source: Arc<dyn RelationalSource>,
    pub model: BoundModel,
    /// Connection the entry was built from, for logging.
    pub label: String,
}

/// Bounded pool; `acquire` waits until an entry is free.
///
/// Entries are moved out while borrowed, so an entry is never held by two
/// borrowers at once.
pub struct ConnectionPool<T> {
    entries: Mutex<Vec<T>>,
    semaphore: Semaphore,
    size: usize,
    acquires: AtomicU64,
    releases: AtomicU64,
}

impl<T> ConnectionPool<T> {
    pub fn new(entries: Vec<T>) -> Self {
        let size = entries.len();
        Self {
            semaphore: Semaphore::new(size),
            entries: Mutex::new(entries),
            size,
            acquires: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        }
    }

    /// Build `size` entries, assigning connections by rotating through `connections`.
    ///
    /// # Returns
    ///
    /// * `Ok(ConnectionPool)` - Every entry connected and bound
    /// * `Err(PipelineError)` - If the size is out of range, the list is empty, or an entry fails to build
    pub async fn build<C, F, Fut>(
        size: usize,
        connections: &[C],
        mut connect: F,
    ) -> Result<Self, PipelineError>
    where
        C: Clone,
        F: FnMut(usize, C) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        if !(MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&size) {
            return Err(PipelineError::config(format!(
                "pool size must be between {} and {}, got {}",
                MIN_POOL_SIZE, MAX_POOL_SIZE, size
            )));
        }
        if connections.is_empty() {
            return Err(PipelineError::config("no source connections configured"));
        }

        let mut entries = Vec::with_capacity(size);
        for slot in 0..size {
            let connection = connections[slot % connections.len()].clone();
            entries.push(connect(slot, connection).await?);
        }

        info!(size, connections = connections.len(), "Connection pool ready");
        Ok(Self::new(entries))
    }

    /// Borrow an entry, waiting until one is available.
    ///
    /// The entry goes back to the pool when the returned guard is dropped.
    pub async fn acquire(&self) -> Result<PooledEntry<'_, T>, PipelineError> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| PipelineError::worker("connection pool closed"))?;
        let entry = self
            .lock()
            .pop()
            .ok_or_else(|| PipelineError::worker("connection pool permit without entry"))?;

        self.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(PooledEntry {
            pool: self,
            entry: Some(entry),
            _permit: permit,
        })
    }

    fn release(&self, entry: T) {
        self.lock().push(entry);
        self.releases.fetch_add(1, Ordering::SeqCst);
        debug!("Connection returned to pool");
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Entries not currently borrowed.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn acquires(&self) -> u64 {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }
}

/// A borrowed pool entry.
pub struct PooledEntry<'a, T> {
    pool: &'a ConnectionPool<T>,
    entry: Option<T>,
    // Declared last so the permit is released after the entry is back.
    _permit: SemaphorePermit<'a>,
}

impl<T> Deref for PooledEntry<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `Drop` takes the entry out.
        match self.entry {
            Some(ref entry) => entry,
            None => unreachable!("pooled entry used after release"),
        }
    }
}

impl<T> Drop for PooledEntry<'_, T> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.pool.release(entry);
        }
    }
}
