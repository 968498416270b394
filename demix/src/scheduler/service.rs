//! Wakeup-driven scheduling service.
//!
//! Each tick lists the Submitted jobs, claims each one by durably moving it
//! to Processing, and dispatches pipeline execution into the bounded worker
//! pool without waiting for it to finish. Only the scheduler transitions
//! jobs out of Submitted, and it does so synchronously per job before
//! dispatch, so a job can never be claimed twice.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::database::models::Job;
use crate::database::{BackoffPolicy, RetryingStore};
use crate::domain::JobState;
use crate::pipeline::{JobPipeline, WorkerPool};
use crate::scheduler::WakeupSignal;
use crate::{Error, Result};

/// Scheduler construction parameters. No ambient globals: worker capacity,
/// per-job timeout and storage backoff all arrive here.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Worker pool capacity (minimum 1).
    pub workers: usize,
    /// Per-job pipeline timeout.
    pub job_timeout: Duration,
    /// Backoff parameters for retried storage mutations.
    pub backoff: BackoffPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            job_timeout: Duration::from_secs(3600),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// The claim-and-dispatch loop.
pub struct Scheduler {
    store: Arc<RetryingStore>,
    pool: Arc<WorkerPool>,
    pipeline: Arc<JobPipeline>,
    signal: Arc<WakeupSignal>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        store: Arc<RetryingStore>,
        pool: Arc<WorkerPool>,
        pipeline: Arc<JobPipeline>,
        signal: Arc<WakeupSignal>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            pool,
            pipeline,
            signal,
            cancel,
        }
    }

    /// Run until the cancellation token fires.
    pub async fn run(&self) {
        info!("scheduler started with {} worker slots", self.pool.capacity());
        self.signal.wait(&self.cancel, || self.tick()).await;
        info!("scheduler stopped");
    }

    /// One pass over the Submitted jobs. Always asks to go back to sleep;
    /// new submissions arrive via the wakeup signal.
    async fn tick(&self) -> bool {
        let jobs = match self.store.list_by_state(JobState::Submitted).await {
            Ok(jobs) => jobs,
            Err(err) => {
                error!("listing submitted jobs: {}", err);
                return true;
            }
        };

        for mut job in jobs {
            let Some(permit) = self.pool.acquire(&self.cancel).await else {
                // cancelled while waiting for a slot; leave the remaining
                // jobs Submitted
                return true;
            };

            match self.claim(&job).await {
                Ok(claimed) => job.state = claimed.as_str().to_string(),
                Err(err) => {
                    error!("claiming job {}: {}", job.id, err);
                    drop(permit);
                    continue;
                }
            }

            let pipeline = self.pipeline.clone();
            tokio::spawn(async move {
                pipeline.execute(job).await;
                drop(permit);
            });
        }

        true
    }

    /// Durably transition a job from Submitted to Processing, granting
    /// exclusive pipeline ownership.
    async fn claim(&self, job: &Job) -> Result<JobState> {
        let from = job.state().ok_or_else(|| {
            Error::validation(format!(
                "job {} has unrecognized state {:?}",
                job.id, job.state
            ))
        })?;
        let to = from.transition_to(JobState::Processing)?;
        self.store.update_state(&job.id, to).await?;
        Ok(to)
    }
}
