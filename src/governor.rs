//! Concurrency governor: bounds simultaneous in-flight calls per client.
//!
//! Built on a tokio semaphore, whose `acquire` queues waiters in arrival
//! order. That gives the two guarantees callers rely on:
//! - at most `max_concurrent` wrapped operations run at once;
//! - operations start in submission order (FIFO), and none is ever
//!   dropped. Completion order is still whatever the network makes it.
//!
//! The wrapped operation is not constructed until a slot is held, so a
//! queued request costs nothing upstream.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorStatus {
    pub active: usize,
    pub pending: usize,
}

#[derive(Clone)]
pub struct Governor {
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    pending: Arc<AtomicUsize>,
}

impl Governor {
    /// Panics if `max_concurrent` is zero (nothing could ever run).
    pub fn new(max_concurrent: usize) -> Self {
        assert!(max_concurrent > 0, "governor needs at least one slot");
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            active: Arc::new(AtomicUsize::new(0)),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Run `operation` once a slot is free, queuing FIFO behind earlier
    /// callers when the client is saturated.
    pub async fn run<T, Fut, Op>(&self, operation: Op) -> T
    where
        Fut: Future<Output = T>,
        Op: FnOnce() -> Fut,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        // The semaphore is never closed, so acquire cannot fail.
        let permit =
            self.semaphore.acquire().await.expect("governor semaphore closed");
        self.pending.fetch_sub(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);

        let result = operation().await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        drop(permit);
        result
    }

    pub fn status(&self) -> GovernorStatus {
        GovernorStatus {
            active: self.active.load(Ordering::SeqCst),
            pending: self.pending.load(Ordering::SeqCst),
        }
    }
}

impl std::fmt::Debug for Governor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("Governor")
            .field("active", &status.active)
            .field("pending", &status.pending)
            .finish()
    }
}
