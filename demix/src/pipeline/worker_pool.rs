//! Bounded worker pool for pipeline execution.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Counting gate of fixed capacity. One slot is held for the full lifetime
/// of one job's pipeline execution; the permit is moved into the dispatched
/// task so release happens on exit regardless of outcome.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// Create a pool with the given capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Currently free slots.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Block until a slot frees or `cancel` fires (`None`).
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            _ = cancel.cancelled() => None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_capacity_minimum_is_one() {
        assert_eq!(WorkerPool::new(0).capacity(), 1);
        assert_eq!(WorkerPool::new(4).capacity(), 4);
    }

    #[tokio::test]
    async fn test_acquire_blocks_at_capacity_and_frees_on_drop() {
        let pool = WorkerPool::new(2);
        let cancel = CancellationToken::new();

        let a = pool.acquire(&cancel).await.unwrap();
        let _b = pool.acquire(&cancel).await.unwrap();
        assert_eq!(pool.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.acquire(&cancel)).await;
        assert!(blocked.is_err());

        drop(a);
        let c = tokio::time::timeout(Duration::from_millis(200), pool.acquire(&cancel))
            .await
            .expect("slot should free after drop");
        assert!(c.is_some());
    }

    #[tokio::test]
    async fn test_acquire_aborts_on_cancel() {
        let pool = WorkerPool::new(1);
        let cancel = CancellationToken::new();
        let _held = pool.acquire(&cancel).await.unwrap();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        assert!(pool.acquire(&cancel).await.is_none());
    }
}
