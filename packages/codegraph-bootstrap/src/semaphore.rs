//! Counting semaphore bounding concurrent dimension tasks inside a tier.
//!
//! Backed by `tokio::sync::Semaphore`, which queues waiters FIFO and hands a released
//! permit straight to the oldest waiter. Permits are RAII guards: dropping a
//! [`DimensionPermit`] is the release, so every exit path of a task (return, `?`,
//! panic unwind) gives the permit back.

use crate::error::{BootstrapError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Default)]
struct HolderStats {
    current: AtomicUsize,
    peak: AtomicUsize,
}

/// Bounded permit pool with holder instrumentation
#[derive(Debug, Clone)]
pub struct DimensionSemaphore {
    inner: Arc<Semaphore>,
    permits: usize,
    stats: Arc<HolderStats>,
}

impl DimensionSemaphore {
    /// `permits` is clamped to at least 1 so a tier can always make progress.
    pub fn new(permits: usize) -> Self {
        let permits = permits.max(1);
        Self {
            inner: Arc::new(Semaphore::new(permits)),
            permits,
            stats: Arc::new(HolderStats::default()),
        }
    }

    /// Wait for a permit (FIFO among waiters).
    pub async fn acquire(&self) -> Result<DimensionPermit> {
        let permit = Arc::clone(&self.inner)
            .acquire_owned()
            .await
            .map_err(|_| BootstrapError::SemaphoreClosed)?;

        let now = self.stats.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak.fetch_max(now, Ordering::SeqCst);

        Ok(DimensionPermit {
            _permit: permit,
            stats: Arc::clone(&self.stats),
        })
    }

    /// Configured permit count
    pub fn permits(&self) -> usize {
        self.permits
    }

    /// Permits not currently held
    pub fn available(&self) -> usize {
        self.inner.available_permits()
    }

    /// Tasks currently holding a permit
    pub fn holders(&self) -> usize {
        self.stats.current.load(Ordering::SeqCst)
    }

    /// Highest holder count observed since creation
    pub fn peak_holders(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }
}

/// Held permit; released on drop
#[derive(Debug)]
pub struct DimensionPermit {
    _permit: OwnedSemaphorePermit,
    stats: Arc<HolderStats>,
}

impl DimensionPermit {
    /// Explicit release, same as dropping the guard
    pub fn release(self) {}
}

impl Drop for DimensionPermit {
    fn drop(&mut self) {
        // Counter goes down before the inner permit is returned to the pool.
        self.stats.current.fetch_sub(1, Ordering::SeqCst);
    }
}
