//! Shared fixtures: a file-backed test database and fake tool
//! collaborators.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use demix::Result;
use demix::database::models::Job;
use demix::database::repositories::{
    JobRepository, SqlxDownloadRepository, SqlxJobRepository,
};
use demix::database::{BackoffPolicy, DbPool, RetryingStore, init_pool, run_migrations};
use demix::domain::{JobState, ModelProfile};
use demix::pipeline::{JobPipeline, PipelineConfig};
use demix::tools::{Downloader, FetchedAudio, Mixer, Separator};

pub struct TestDb {
    /// Keeps the scratch directory alive for the duration of the test.
    pub dir: tempfile::TempDir,
    pub pool: DbPool,
    pub jobs: Arc<SqlxJobRepository>,
    pub downloads: Arc<SqlxDownloadRepository>,
    pub store: Arc<RetryingStore>,
}

impl TestDb {
    pub fn temp_dir(&self) -> PathBuf {
        self.dir.path().join("temp")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.dir.path().join("results")
    }

    /// Create a job row already claimed by a scheduler (Processing), the
    /// state a pipeline expects to receive it in.
    pub async fn claimed_job(&self, link: &str, model: &str) -> Job {
        let mut job = Job::new(link, model);
        self.jobs.create(&job).await.unwrap();
        self.jobs
            .update_state(&job.id, JobState::Processing)
            .await
            .unwrap();
        job.state = JobState::Processing.as_str().to_string();
        job
    }

    pub async fn job(&self, id: &str) -> Job {
        self.jobs.get(id).await.unwrap()
    }
}

pub async fn setup_db() -> TestDb {
    let dir = tempfile::TempDir::new().expect("creating test dir");
    let url = format!("sqlite://{}/test.sqlite?mode=rwc", dir.path().display());

    let pool = init_pool(&url).await.expect("creating test pool");
    run_migrations(&pool).await.expect("running migrations");

    tokio::fs::create_dir_all(dir.path().join("temp"))
        .await
        .unwrap();
    tokio::fs::create_dir_all(dir.path().join("results"))
        .await
        .unwrap();

    let jobs = Arc::new(SqlxJobRepository::new(pool.clone()));
    let downloads = Arc::new(SqlxDownloadRepository::new(pool.clone()));
    let store = Arc::new(RetryingStore::new(
        jobs.clone(),
        downloads.clone(),
        BackoffPolicy {
            base: Duration::from_millis(5),
            factor: 2,
            attempts: 3,
        },
    ));

    TestDb {
        dir,
        pool,
        jobs,
        downloads,
        store,
    }
}

/// Downloader fake: writes `track.mp3` into the target directory. Can be
/// gated on a zero-permit semaphore to hold pipelines in flight, or delayed
/// to give heartbeats time to fire.
pub struct FakeDownloader {
    pub title: String,
    pub gate: Option<Arc<Semaphore>>,
    pub delay: Option<Duration>,
    pub calls: AtomicU32,
}

impl FakeDownloader {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            gate: None,
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn gated(title: &str, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(title)
        }
    }

    pub fn delayed(title: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(title)
        }
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        _link: &str,
        _temp_dir: &Path,
        target_dir: &Path,
    ) -> Result<FetchedAudio> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        // mirror the real wrappers: the tool dies when the token fires
        if let Some(gate) = &self.gate {
            tokio::select! {
                _ = cancel.cancelled() => return Err(demix::Error::tool("download cancelled")),
                permit = gate.acquire() => {
                    permit.map_err(|_| demix::Error::tool("gate closed"))?.forget();
                }
            }
        }
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(demix::Error::tool("download cancelled")),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tokio::fs::create_dir_all(target_dir).await?;
        let path = target_dir.join("track.mp3");
        tokio::fs::write(&path, b"audio").await?;

        Ok(FetchedAudio {
            title: self.title.clone(),
            path,
        })
    }
}

/// Separator fake: emits one file per stem. `emit` overrides the stem set
/// to simulate contract violations; `seen_jobs_override` records the
/// concurrency the pipeline asked for.
#[derive(Default)]
pub struct FakeSeparator {
    pub emit: Option<Vec<String>>,
    pub seen_jobs_override: Mutex<Vec<Option<u32>>>,
}

impl FakeSeparator {
    pub fn emitting(names: &[&str]) -> Self {
        Self {
            emit: Some(names.iter().map(|n| n.to_string()).collect()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Separator for FakeSeparator {
    async fn split(
        &self,
        _cancel: &CancellationToken,
        profile: &ModelProfile,
        jobs_override: Option<u32>,
        _input: &Path,
        _temp_dir: &Path,
        target_dir: &Path,
    ) -> Result<HashMap<String, PathBuf>> {
        self.seen_jobs_override.lock().unwrap().push(jobs_override);

        let names: Vec<String> = match &self.emit {
            Some(names) => names.clone(),
            None => profile.stems().map(String::from).collect(),
        };

        tokio::fs::create_dir_all(target_dir).await?;
        let mut stems = HashMap::new();
        for name in names {
            let path = target_dir.join(format!("{name}-track.mp3"));
            tokio::fs::write(&path, b"stem").await?;
            stems.insert(name, path);
        }
        Ok(stems)
    }
}

/// Mixer fake: writes the blended output file.
pub struct FakeMixer;

#[async_trait]
impl Mixer for FakeMixer {
    async fn blend(
        &self,
        _cancel: &CancellationToken,
        inputs: &[PathBuf],
        output: &Path,
    ) -> Result<()> {
        assert!(!inputs.is_empty());
        tokio::fs::write(output, b"fono").await?;
        Ok(())
    }
}

/// Build a pipeline over the test database with a tight heartbeat.
pub fn test_pipeline(
    db: &TestDb,
    downloader: Arc<dyn Downloader>,
    separator: Arc<dyn Separator>,
    config_tweak: impl FnOnce(&mut PipelineConfig),
    shutdown: CancellationToken,
) -> JobPipeline {
    let mut config = PipelineConfig::new(
        db.temp_dir(),
        db.results_dir(),
        Duration::from_secs(30),
    );
    config.heartbeat_interval = Duration::from_millis(50);
    config_tweak(&mut config);

    JobPipeline::new(
        db.store.clone(),
        downloader,
        separator,
        Arc::new(FakeMixer),
        config,
        shutdown,
    )
}

/// Poll the job list until `cond` holds or the timeout elapses.
pub async fn wait_for_jobs<F>(db: &TestDb, timeout: Duration, mut cond: F) -> Vec<Job>
where
    F: FnMut(&[Job]) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let jobs = db.jobs.list_all().await.unwrap();
        if cond(&jobs) {
            return jobs;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached within {timeout:?}; jobs: {jobs:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Count jobs currently in a given state.
pub fn count_in_state(jobs: &[Job], state: JobState) -> usize {
    jobs.iter().filter(|j| j.state == state.as_str()).count()
}
