//! Job management routes.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/api/jobs` | List all jobs, newest first, with downloads |
//! | POST | `/api/jobs` | Submit a new job |
//! | GET | `/api/jobs/{id}` | Get one job with downloads |
//! | DELETE | `/api/jobs/{id}` | Remove a job, its downloads and artifacts |
//! | POST | `/api/jobs/{id}/retry` | Re-queue an errored job |

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::database::models::{Download, Job};
use crate::domain::{JobState, ModelProfile, display_rank};
use crate::utils::fs::remove_dir_all_if_exists;

/// Create the jobs router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs).post(submit_job))
        .route("/{id}", get(get_job).delete(remove_job))
        .route("/{id}/retry", post(retry_job))
}

/// Request body for submitting a job.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitJobRequest {
    /// Source link handed to the downloader.
    pub link: String,
    /// Model profile name; must be one of the known profiles.
    pub model: String,
}

/// Query parameters for fetching a single job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetJobParams {
    /// When true, hide the `original` and `fono` artifacts (the sing-along
    /// view).
    #[serde(default)]
    pub stems_only: bool,
}

/// A job with its downloads in display order.
#[derive(Debug, Serialize)]
pub struct JobWithDownloads {
    #[serde(flatten)]
    pub job: Job,
    /// Processing duration rounded for display, e.g. "1m42s".
    pub duration_display: String,
    pub downloads: Vec<Download>,
}

impl JobWithDownloads {
    fn new(job: Job, mut downloads: Vec<Download>) -> Self {
        downloads.sort_by_key(|d| display_rank(&d.name));
        Self {
            duration_display: format_duration_ms(job.duration_ms),
            job,
            downloads,
        }
    }
}

/// Round milliseconds to whole seconds and format as `1h2m3s` / `2m3s` /
/// `3s`.
fn format_duration_ms(ms: i64) -> String {
    let total_secs = (ms + 500) / 1000;
    let (hours, mins, secs) = (total_secs / 3600, total_secs % 3600 / 60, total_secs % 60);
    match (hours, mins) {
        (0, 0) => format!("{secs}s"),
        (0, _) => format!("{mins}m{secs}s"),
        _ => format!("{hours}h{mins}m{secs}s"),
    }
}

async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<JobWithDownloads>>> {
    let jobs = state.jobs.list_all().await?;

    let mut results = Vec::with_capacity(jobs.len());
    for job in jobs {
        let downloads = state.downloads.list_for_job(&job.id).await?;
        results.push(JobWithDownloads::new(job, downloads));
    }

    Ok(Json(results))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<GetJobParams>,
) -> ApiResult<Json<JobWithDownloads>> {
    let job = state.jobs.get(&id).await?;
    let mut downloads = state.downloads.list_for_job(&job.id).await?;

    if params.stems_only {
        downloads.retain(|d| d.name != "original" && d.name != "fono");
    }

    Ok(Json(JobWithDownloads::new(job, downloads)))
}

async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let link = request.link.trim();
    if link.is_empty() {
        return Err(ApiError::bad_request("link is required"));
    }

    if ModelProfile::by_name(&request.model).is_none() {
        return Err(ApiError::bad_request(format!(
            "model is not in whitelist {:?}",
            ModelProfile::names()
        )));
    }

    if state
        .jobs
        .find_by_link_and_model(link, &request.model)
        .await?
        .is_some()
    {
        return Err(ApiError::conflict("duplicate: link-model already exists"));
    }

    let job = Job::new(link, &request.model);
    state.store.create_job(&job).await?;
    state.signal.wake();

    Ok((StatusCode::CREATED, Json(job)))
}

async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    let mut job = state.jobs.get(&id).await?;

    let from = job
        .state()
        .ok_or_else(|| ApiError::internal(format!("job {} has unrecognized state", job.id)))?;
    let to = from.transition_to(JobState::Submitted)?;

    job.is_retry = true;
    job.state = to.as_str().to_string();
    job.duration_ms = 0;

    state.store.save_job(&job).await?;
    state.signal.wake();

    Ok(Json(job))
}

async fn remove_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    let job = state.jobs.get(&id).await?;

    let deletable = job.state().is_some_and(|s| s.is_deletable());
    if !deletable {
        return Err(ApiError::conflict(
            "job is processing; wait for it to finish before removing",
        ));
    }

    // the job owns its output directory for its lifetime
    let job_dir = state.results_dir.join(&job.id);
    remove_dir_all_if_exists("removing job directory", &job_dir).await?;

    state.store.delete_downloads_for_job(&job.id).await?;
    state.store.delete_job(&job.id).await?;

    Ok(StatusCode::NO_CONTENT)
}
