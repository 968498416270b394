//! Coalescing wakeup signal.
//!
//! Any number of concurrent [`WakeupSignal::wake`] calls collapse into at
//! most one pending wake; a waiter blocks until a wake is pending or a fixed
//! interior interval elapses, then re-runs its tick. This gives sub-second
//! reaction to new submissions without busy-polling or a notification
//! channel from the storage layer.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Default interior poll interval of the wait loop.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// A coalescing wake primitive.
pub struct WakeupSignal {
    pending: AtomicBool,
    notify: Notify,
    interval: Duration,
}

impl Default for WakeupSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeupSignal {
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_INTERVAL)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            pending: AtomicBool::new(false),
            notify: Notify::new(),
            interval,
        }
    }

    /// Mark a wake as pending. Idempotent, non-blocking, callable from any
    /// number of concurrent tasks.
    pub fn wake(&self) {
        self.pending.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Block until a pending wake is consumed or the interior interval
    /// elapses. The pending flag is cleared atomically on consumption.
    async fn sleep_until_wake(&self) {
        if self.pending.swap(false, Ordering::SeqCst) {
            return;
        }

        let sleep = tokio::time::sleep(self.interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = self.notify.notified() => {
                    // A stale permit (wake already consumed via the pending
                    // flag) does not end the sleep.
                    if self.pending.swap(false, Ordering::SeqCst) {
                        return;
                    }
                }
                _ = &mut sleep => return,
            }
        }
    }

    /// Run `on_tick` once immediately, then repeatedly after each consumed
    /// wake or interval expiry. `on_tick` returns whether the loop should go
    /// back to sleep; `false` re-runs it without sleeping. Exits cleanly when
    /// `cancel` fires.
    pub async fn wait<F, Fut>(&self, cancel: &CancellationToken, mut on_tick: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            if !on_tick().await {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = self.sleep_until_wake() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;

    #[tokio::test]
    async fn test_concurrent_wakes_coalesce_into_one() {
        let signal = Arc::new(WakeupSignal::with_interval(Duration::from_millis(200)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let signal = signal.clone();
            handles.push(tokio::spawn(async move { signal.wake() }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // First wait consumes the single pending wake immediately.
        let start = Instant::now();
        signal.sleep_until_wake().await;
        assert!(start.elapsed() < Duration::from_millis(100));

        // Second wait has nothing pending and must run into the interval.
        let start = Instant::now();
        signal.sleep_until_wake().await;
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_wake_unblocks_waiter() {
        let signal = Arc::new(WakeupSignal::with_interval(Duration::from_secs(60)));

        let waiter = signal.clone();
        let handle = tokio::spawn(async move {
            let start = Instant::now();
            waiter.sleep_until_wake().await;
            start.elapsed()
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        signal.wake();

        let elapsed = handle.await.unwrap();
        assert!(elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_wait_runs_tick_immediately_and_exits_on_cancel() {
        let signal = WakeupSignal::with_interval(Duration::from_millis(10));
        let cancel = CancellationToken::new();
        let ticks = AtomicU32::new(0);

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        signal
            .wait(&cancel, || {
                ticks.fetch_add(1, Ordering::SeqCst);
                async { true }
            })
            .await;

        // At least the immediate tick plus a few interval expirations.
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_wait_exits_without_tick_when_already_cancelled() {
        let signal = WakeupSignal::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let ticks = AtomicU32::new(0);
        signal
            .wait(&cancel, || {
                ticks.fetch_add(1, Ordering::SeqCst);
                async { true }
            })
            .await;

        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
