//! Bounded-concurrency gate for upstream calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::UpstreamError;

/// Counting semaphore shared by every call on one client.
///
/// Waiters are admitted in FIFO order. Dropping a waiting future gives up its queue
/// position; dropping a permit frees its slot.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

/// Held for as long as a call occupies a slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    pub async fn acquire(&self) -> GatePermit {
        match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => GatePermit { _permit: permit },
            // The semaphore is owned here and never closed.
            Err(_) => unreachable!("concurrency gate semaphore closed"),
        }
    }

    /// Waits at most `timeout` for a slot.
    pub async fn acquire_within(&self, timeout: Duration) -> Result<GatePermit, UpstreamError> {
        tokio::time::timeout(timeout, self.acquire())
            .await
            .map_err(|_| UpstreamError::GateTimeout {
                waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })
    }

    /// Runs `task` once a slot is free, holding the slot until it completes.
    pub async fn run<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let _permit = self.acquire().await;
        task.await
    }
}
