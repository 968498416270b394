//! Per-job pipeline: download, separate, remix, persist.
//!
//! One pipeline execution exclusively owns one job (and its output
//! directory) for its lifetime, runs inside one worker-pool slot under a
//! timeout measured from pipeline start, and performs the job's terminal
//! state transition. A concurrent heartbeat persists elapsed time so the UI
//! reflects progress of long-running jobs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::database::RetryingStore;
use crate::database::models::{Download, Job, MAX_TITLE_LEN};
use crate::domain::{JobState, ModelProfile, display_rank};
use crate::tools::{Downloader, Mixer, Separator};
use crate::utils::fs::remove_dir_all_if_exists;
use crate::utils::text::truncate_chars;
use crate::{Error, Result};

/// Pipeline execution parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Scratch root for tool temp directories.
    pub temp_dir: PathBuf,
    /// Results root; each job owns `<results>/<id>/`.
    pub results_dir: PathBuf,
    /// Absolute deadline per run, measured from pipeline start.
    pub job_timeout: Duration,
    /// Disables the separator concurrency clamp on retried jobs.
    pub no_graceful_retry: bool,
    /// Heartbeat period for advisory duration writes.
    pub heartbeat_interval: Duration,
}

impl PipelineConfig {
    pub fn new(temp_dir: PathBuf, results_dir: PathBuf, job_timeout: Duration) -> Self {
        Self {
            temp_dir,
            results_dir,
            job_timeout,
            no_graceful_retry: false,
            heartbeat_interval: Duration::from_secs(10),
        }
    }
}

/// Executes one claimed job end to end.
pub struct JobPipeline {
    store: Arc<RetryingStore>,
    downloader: Arc<dyn Downloader>,
    separator: Arc<dyn Separator>,
    mixer: Arc<dyn Mixer>,
    config: PipelineConfig,
    /// Root shutdown token; per-job contexts derive from it.
    shutdown: CancellationToken,
}

impl JobPipeline {
    pub fn new(
        store: Arc<RetryingStore>,
        downloader: Arc<dyn Downloader>,
        separator: Arc<dyn Separator>,
        mixer: Arc<dyn Mixer>,
        config: PipelineConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            downloader,
            separator,
            mixer,
            config,
            shutdown,
        }
    }

    /// Run the full pipeline for a claimed job and perform its terminal
    /// state transition. Never returns an error: every failure ends up on
    /// the job row as `err_reason`.
    pub async fn execute(&self, mut job: Job) {
        let started = Instant::now();
        let cancel = self.shutdown.child_token();

        info!("processing job {} ({}, model {})", job.id, job.link, job.model);

        let heartbeat = {
            let store = self.store.clone();
            let id = job.id.clone();
            let interval = self.config.heartbeat_interval;
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = cancel.cancelled() => {}
                    }
                    store
                        .try_update_duration(&id, started.elapsed().as_millis() as i64)
                        .await;
                    if cancel.is_cancelled() {
                        return;
                    }
                }
            })
        };

        let result = tokio::select! {
            result = self.run_steps(&mut job, &cancel) => result,
            _ = tokio::time::sleep(self.config.job_timeout) => {
                // dropping the steps future kills any in-flight tool process
                cancel.cancel();
                Err(Error::Timeout(self.config.job_timeout.as_secs()))
            }
        };

        cancel.cancel();
        let _ = heartbeat.await;

        match result {
            Ok(downloads) => {
                for download in &downloads {
                    self.store.try_create_download(download).await;
                }
                self.finish(&mut job, started).await;
            }
            Err(err) => self.fail(&job, err).await,
        }
    }

    async fn finish(&self, job: &mut Job, started: Instant) {
        let to = match transition(job, JobState::Done) {
            Ok(to) => to,
            Err(err) => {
                error!("finishing job {}: {}", job.id, err);
                return;
            }
        };

        job.state = to.as_str().to_string();
        job.err_reason.clear();
        job.duration_ms = started.elapsed().as_millis() as i64;

        if let Err(err) = self.store.save_job(job).await {
            // fatal for this job: it stays in Processing until the next
            // startup's crash recovery re-runs it
            error!("saving finished job {}: {}", job.id, err);
            return;
        }

        info!("job {} done in {:?}", job.id, started.elapsed());
    }

    async fn fail(&self, job: &Job, err: Error) {
        if self.shutdown.is_cancelled() {
            // crash recovery reverts the job on next startup; a terminal
            // write now could itself fail mid-shutdown
            info!("job {} interrupted by shutdown", job.id);
            return;
        }

        if err.is_contract_violation() {
            warn!("job {} hit a tool contract violation: {}", job.id, err);
        } else {
            warn!("job {} failed: {}", job.id, err);
        }

        if let Err(transition_err) = transition(job, JobState::Errored) {
            error!("failing job {}: {}", job.id, transition_err);
            return;
        }

        if let Err(persist_err) = self.store.update_state(&job.id, JobState::Errored).await {
            error!("recording failure of job {}: {}", job.id, persist_err);
        }
        if let Err(persist_err) = self
            .store
            .update_err_reason(&job.id, &err.to_string())
            .await
        {
            error!("recording failure reason of job {}: {}", job.id, persist_err);
        }
    }

    /// Steps 1-7: clear dir, download, separate, rename original, blend
    /// fono, build the sorted download records.
    async fn run_steps(&self, job: &mut Job, cancel: &CancellationToken) -> Result<Vec<Download>> {
        let job_dir = self.config.results_dir.join(&job.id);

        // idempotent, so retries start from a clean directory
        remove_dir_all_if_exists("clearing job directory", &job_dir).await?;

        let audio = self
            .downloader
            .fetch(cancel, &job.link, &self.config.temp_dir, &job_dir)
            .await
            .map_err(|e| Error::stage("downloading audio with yt-dlp", e))?;

        // persist early so the title shows up before processing completes;
        // the in-memory copy must match or the terminal save reverts it
        job.name = truncate_chars(&audio.title, MAX_TITLE_LEN);
        self.store.try_update_name(&job.id, &job.name).await;

        let profile = ModelProfile::by_name(&job.model)
            .ok_or_else(|| Error::validation(format!("unknown model profile {}", job.model)))?;

        // manual retries should not compete with fresh jobs for separator
        // capacity
        let jobs_override = if job.is_retry && !self.config.no_graceful_retry {
            Some(1)
        } else {
            None
        };

        let mut stems = self
            .separator
            .split(
                cancel,
                profile,
                jobs_override,
                &audio.path,
                &self.config.temp_dir,
                &job_dir,
            )
            .await
            .map_err(|e| Error::stage("splitting audio with demucs", e))?;

        validate_stems(profile, &stems)
            .map_err(|e| Error::stage("validating separator output", e))?;

        let file_name = audio
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::validation(format!(
                    "downloaded file has no usable name: {}",
                    audio.path.display()
                ))
            })?
            .to_string();

        let original = job_dir.join(format!("original-{file_name}"));
        tokio::fs::rename(&audio.path, &original)
            .await
            .map_err(|e| Error::io_path("renaming original file", &audio.path, e))?;
        stems.insert("original".to_string(), original);

        let fono_inputs = profile
            .fono
            .iter()
            .map(|stem| {
                stems
                    .get(*stem)
                    .cloned()
                    .ok_or_else(|| Error::contract(format!("missing fono stem {stem}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let fono = job_dir.join(format!("fono-{file_name}"));
        self.mixer
            .blend(cancel, &fono_inputs, &fono)
            .await
            .map_err(|e| Error::stage("blending fono track with ffmpeg", e))?;
        stems.insert("fono".to_string(), fono);

        let mut downloads: Vec<Download> = stems
            .into_iter()
            .map(|(name, path)| {
                let file = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Download::new(&job.id, name, format!("{}/{}", job.id, file))
            })
            .collect();

        // fixed order for UI consistency
        downloads.sort_by_key(|d| display_rank(&d.name));

        Ok(downloads)
    }
}

fn transition(job: &Job, to: JobState) -> Result<JobState> {
    let from = job.state().ok_or_else(|| {
        Error::validation(format!(
            "job {} has unrecognized state {:?}",
            job.id, job.state
        ))
    })?;
    from.transition_to(to)
}

fn validate_stems(profile: &ModelProfile, stems: &HashMap<String, PathBuf>) -> Result<()> {
    for name in stems.keys() {
        if !profile.contains_stem(name) {
            return Err(Error::contract(format!(
                "unexpected stem {name} for model {}",
                profile.name
            )));
        }
    }

    if stems.len() != profile.stem_count() {
        let declared: Vec<_> = profile.stems().collect();
        let mut got: Vec<_> = stems.keys().cloned().collect();
        got.sort();
        return Err(Error::contract(format!(
            "expected {} stems {declared:?}, got {got:?}",
            profile.stem_count()
        )));
    }

    Ok(())
}
