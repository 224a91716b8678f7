//! Bounded worker pool for compositor jobs
//!
//! Composition and JPEG encoding are CPU bound, so they run on tokio's
//! blocking threads. A semaphore caps how many run at once; a task tracker
//! lets shutdown wait for in-flight jobs instead of abandoning them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};

/// Bounded pool of blocking workers
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    size: usize,
}

impl WorkerPool {
    /// Create a pool running at most `size` jobs at once (minimum 1)
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            size,
        }
    }

    /// Pool size rule: `max(2, min(expected_clients, 2 * cpus))`
    pub fn default_size(expected_clients: usize) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        expected_clients.min(cpus * 2).max(2)
    }

    /// Maximum concurrent jobs
    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs currently queued or running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Whether the pool has stopped accepting jobs
    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Run a job on a worker and wait for its result
    ///
    /// The caller's task is suspended, not blocked, while the job runs. If
    /// the caller is dropped the job still runs to completion.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(Error::PoolClosed);
        }

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::PoolClosed)?;

        let handle = self.tracker.spawn_blocking(move || {
            let _permit = permit;
            job()
        });

        Ok(handle.await?)
    }

    /// Stop accepting jobs and wait for in-flight ones
    ///
    /// Returns `true` if every job finished within `grace`.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        self.permits.close();

        let drained = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();

        if drained {
            tracing::debug!("Worker pool drained");
        } else {
            tracing::warn!(
                in_flight = self.tracker.len(),
                grace_ms = grace.as_millis() as u64,
                "Worker pool shutdown grace period elapsed"
            );
        }
        drained
    }
}
