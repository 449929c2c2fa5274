//! Bounded pool for detached work.
//!
//! Stake submissions and settlement reconciliations must not block the
//! stream receiver, but unmanaged `tokio::spawn` calls would leave nothing
//! to await in tests and no cap on concurrent requests. This pool wraps
//! each job in a semaphore permit and an in-flight counter with an
//! awaitable idle state.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

/// Supervised spawn point for fire-and-forget jobs.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl WorkerPool {
    /// A pool running at most `limit` jobs concurrently.
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Spawn a job. Returns immediately; the job waits for a permit if the
    /// pool is saturated.
    pub fn spawn<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::AcqRel);

        let semaphore = Arc::clone(&self.semaphore);
        let in_flight = Arc::clone(&self.in_flight);
        let idle = Arc::clone(&self.idle);

        tokio::spawn(async move {
            // The semaphore is never closed, but a panic-free fallback
            // matters more than the permit here.
            if let Ok(_permit) = semaphore.acquire().await {
                job.await;
            }
            if in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                idle.notify_waiters();
            }
        });
    }

    /// Number of jobs spawned but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wait until every spawned job has completed.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
