//! Retrying store: bounded retry with backoff over durable mutations.
//!
//! The storage layer is assumed to fail only transiently (lock contention),
//! so every mutation is retried a fixed number of times with exponential
//! backoff. Two write classes are kept explicit at the call site:
//!
//! - **critical** writes (state transitions, terminal saves, creation and
//!   deletion) propagate the error once retries are exhausted;
//! - **advisory** writes (`try_*`: heartbeat duration, early display name,
//!   individual download inserts) are logged and dropped instead.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::random;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::Result;
use crate::database::models::{Download, Job};
use crate::database::repositories::{DownloadRepository, JobRepository};
use crate::domain::JobState;

/// Backoff parameters for retried storage mutations.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// First retry delay.
    pub base: Duration,
    /// Multiplier applied per attempt.
    pub factor: u32,
    /// Total attempts, the initial try included.
    pub attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 4,
            attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (0-based), with up to 25% jitter.
    fn delay(&self, retry: u32) -> Duration {
        let exp = self.base.saturating_mul(self.factor.saturating_pow(retry));
        let jitter_ms = random::<u64>() % (exp.as_millis() as u64 / 4 + 1);
        exp + Duration::from_millis(jitter_ms)
    }
}

/// Wraps the job/download repositories with the retry discipline.
pub struct RetryingStore {
    jobs: Arc<dyn JobRepository>,
    downloads: Arc<dyn DownloadRepository>,
    backoff: BackoffPolicy,
}

impl RetryingStore {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        downloads: Arc<dyn DownloadRepository>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            jobs,
            downloads,
            backoff,
        }
    }

    async fn retry<T, F, Fut>(&self, op_name: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.backoff.attempts {
                        return Err(err);
                    }

                    let delay = self.backoff.delay(attempt - 1);
                    debug!(
                        "{} failed, retrying in {:?} (attempt {}/{}): {}",
                        op_name, delay, attempt, self.backoff.attempts, err
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    // Reads used by the scheduler tick.

    pub async fn list_by_state(&self, state: JobState) -> Result<Vec<Job>> {
        self.retry("listing jobs by state", || async {
            self.jobs.list_by_state(state).await
        })
        .await
    }

    // Critical writes.

    pub async fn create_job(&self, job: &Job) -> Result<()> {
        self.retry("creating job", || async { self.jobs.create(job).await })
            .await
    }

    pub async fn update_state(&self, id: &str, state: JobState) -> Result<()> {
        self.retry("updating job state", || async {
            self.jobs.update_state(id, state).await
        })
        .await
    }

    pub async fn update_err_reason(&self, id: &str, err_reason: &str) -> Result<()> {
        self.retry("updating job error reason", || async {
            self.jobs.update_err_reason(id, err_reason).await
        })
        .await
    }

    pub async fn save_job(&self, job: &Job) -> Result<()> {
        self.retry("saving job", || async { self.jobs.save(job).await })
            .await
    }

    pub async fn delete_job(&self, id: &str) -> Result<()> {
        self.retry("deleting job", || async { self.jobs.delete(id).await })
            .await
    }

    pub async fn delete_downloads_for_job(&self, job_id: &str) -> Result<()> {
        self.retry("deleting downloads", || async {
            self.downloads.delete_for_job(job_id).await
        })
        .await
    }

    // Advisory writes: retried the same way, dropped with a warning once
    // retries are exhausted.

    pub async fn try_update_name(&self, id: &str, name: &str) {
        if let Err(err) = self
            .retry("updating job name", || async {
                self.jobs.update_name(id, name).await
            })
            .await
        {
            warn!("dropping job name update for {}: {}", id, err);
        }
    }

    pub async fn try_update_duration(&self, id: &str, duration_ms: i64) {
        if let Err(err) = self
            .retry("updating job duration", || async {
                self.jobs.update_duration(id, duration_ms).await
            })
            .await
        {
            warn!("dropping job duration update for {}: {}", id, err);
        }
    }

    /// Insert one download row. Exhausted retries leave the artifact
    /// missing from the UI; the job itself still completes.
    pub async fn try_create_download(&self, download: &Download) {
        if let Err(err) = self
            .retry("creating download", || async {
                self.downloads.create(download).await
            })
            .await
        {
            warn!(
                "dropping download record {} for job {}: {}",
                download.name, download.job_id, err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyJobRepository {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl JobRepository for FlakyJobRepository {
        async fn get(&self, id: &str) -> Result<Job> {
            Err(crate::Error::not_found("Job", id))
        }
        async fn list_all(&self) -> Result<Vec<Job>> {
            Ok(vec![])
        }
        async fn list_by_state(&self, _state: JobState) -> Result<Vec<Job>> {
            Ok(vec![])
        }
        async fn find_by_link_and_model(&self, _link: &str, _model: &str) -> Result<Option<Job>> {
            Ok(None)
        }
        async fn create(&self, _job: &Job) -> Result<()> {
            Ok(())
        }
        async fn update_state(&self, _id: &str, _state: JobState) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(crate::Error::Other("database is locked".into()))
            } else {
                Ok(())
            }
        }
        async fn update_name(&self, _id: &str, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn update_err_reason(&self, _id: &str, _err_reason: &str) -> Result<()> {
            Ok(())
        }
        async fn update_duration(&self, _id: &str, _duration_ms: i64) -> Result<()> {
            Ok(())
        }
        async fn save(&self, _job: &Job) -> Result<()> {
            Ok(())
        }
        async fn reset_processing_jobs(&self) -> Result<u64> {
            Ok(0)
        }
        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }
    }

    struct NoopDownloadRepository;

    #[async_trait]
    impl DownloadRepository for NoopDownloadRepository {
        async fn create(&self, _download: &Download) -> Result<()> {
            Ok(())
        }
        async fn list_for_job(&self, _job_id: &str) -> Result<Vec<Download>> {
            Ok(vec![])
        }
        async fn delete_for_job(&self, _job_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn fast_backoff() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(1),
            factor: 2,
            attempts: 3,
        }
    }

    fn store_with(fail_first: u32) -> (RetryingStore, Arc<FlakyJobRepository>) {
        let jobs = Arc::new(FlakyJobRepository {
            calls: AtomicU32::new(0),
            fail_first,
        });
        let store = RetryingStore::new(jobs.clone(), Arc::new(NoopDownloadRepository), fast_backoff());
        (store, jobs)
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let (store, jobs) = store_with(2);
        store
            .update_state("j1", JobState::Processing)
            .await
            .unwrap();
        assert_eq!(jobs.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_propagate() {
        let (store, jobs) = store_with(10);
        let err = store.update_state("j1", JobState::Processing).await;
        assert!(err.is_err());
        assert_eq!(jobs.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_first_success_does_not_retry() {
        let (store, jobs) = store_with(0);
        store.update_state("j1", JobState::Done).await.unwrap();
        assert_eq!(jobs.calls.load(Ordering::SeqCst), 1);
    }
}
