//! Job database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::JobState;

/// Maximum display-name length in characters; longer external-tool titles
/// are truncated before persisting.
pub const MAX_TITLE_LEN: usize = 80;

/// One processing request: download the link, separate it with the named
/// model profile, remix the instrumental track.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Source link handed to the downloader. Immutable.
    pub link: String,
    /// Model profile name. Immutable.
    pub model: String,
    /// Set when a prior attempt errored and a retry was requested; clamps
    /// separator concurrency on the next run.
    pub is_retry: bool,
    /// Lifecycle state string; see [`JobState`].
    pub state: String,
    /// Resolved display name, populated once the downloader reports a title.
    pub name: String,
    /// Failure reason, populated when the pipeline errors.
    pub err_reason: String,
    /// Cumulative processing duration in milliseconds, heartbeat-updated
    /// while the pipeline runs and finalized on completion.
    pub duration_ms: i64,
    /// ISO 8601 creation timestamp, for display ordering only.
    pub created_at: String,
}

impl Job {
    pub fn new(link: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            link: link.into(),
            model: model.into(),
            is_retry: false,
            state: JobState::Submitted.as_str().to_string(),
            name: String::new(),
            err_reason: String::new(),
            duration_ms: 0,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Parse the stored state string.
    pub fn state(&self) -> Option<JobState> {
        JobState::parse(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_new() {
        let job = Job::new("https://example.org/watch?v=x", "htdemucs");
        assert_eq!(job.state, "SUBMITTED");
        assert_eq!(job.state(), Some(JobState::Submitted));
        assert!(!job.is_retry);
        assert_eq!(job.duration_ms, 0);
        assert!(job.name.is_empty());
        assert!(job.err_reason.is_empty());
    }
}
