//! Job repository.

use async_trait::async_trait;

use crate::database::DbPool;
use crate::database::models::Job;
use crate::domain::JobState;
use crate::{Error, Result};

/// Job repository trait.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Job>;
    /// All jobs, newest first.
    async fn list_all(&self) -> Result<Vec<Job>>;
    async fn list_by_state(&self, state: JobState) -> Result<Vec<Job>>;
    /// Duplicate check for the (link, model) submission invariant.
    async fn find_by_link_and_model(&self, link: &str, model: &str) -> Result<Option<Job>>;
    async fn create(&self, job: &Job) -> Result<()>;
    async fn update_state(&self, id: &str, state: JobState) -> Result<()>;
    async fn update_name(&self, id: &str, name: &str) -> Result<()>;
    async fn update_err_reason(&self, id: &str, err_reason: &str) -> Result<()>;
    async fn update_duration(&self, id: &str, duration_ms: i64) -> Result<()>;
    /// Full-row update of every mutable field.
    async fn save(&self, job: &Job) -> Result<()>;
    /// Crash recovery: revert every Processing job to Submitted, other
    /// fields untouched. Returns the number of reverted rows.
    async fn reset_processing_jobs(&self) -> Result<u64>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// SQLx implementation of JobRepository.
pub struct SqlxJobRepository {
    pool: DbPool,
}

impl SqlxJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqlxJobRepository {
    async fn get(&self, id: &str) -> Result<Job> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))
    }

    async fn list_all(&self) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>("SELECT * FROM jobs ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(jobs)
    }

    async fn list_by_state(&self, state: JobState) -> Result<Vec<Job>> {
        let jobs =
            sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE state = ? ORDER BY created_at")
                .bind(state.as_str())
                .fetch_all(&self.pool)
                .await?;
        Ok(jobs)
    }

    async fn find_by_link_and_model(&self, link: &str, model: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE link = ? AND model = ?")
            .bind(link)
            .bind(model)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn create(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, link, model, is_retry, state, name, err_reason, duration_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.link)
        .bind(&job.model)
        .bind(job.is_retry)
        .bind(&job.state)
        .bind(&job.name)
        .bind(&job.err_reason)
        .bind(job.duration_ms)
        .bind(&job.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_state(&self, id: &str, state: JobState) -> Result<()> {
        sqlx::query("UPDATE jobs SET state = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_name(&self, id: &str, name: &str) -> Result<()> {
        sqlx::query("UPDATE jobs SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_err_reason(&self, id: &str, err_reason: &str) -> Result<()> {
        sqlx::query("UPDATE jobs SET err_reason = ? WHERE id = ?")
            .bind(err_reason)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_duration(&self, id: &str, duration_ms: i64) -> Result<()> {
        sqlx::query("UPDATE jobs SET duration_ms = ? WHERE id = ?")
            .bind(duration_ms)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET
                is_retry = ?,
                state = ?,
                name = ?,
                err_reason = ?,
                duration_ms = ?
            WHERE id = ?
            "#,
        )
        .bind(job.is_retry)
        .bind(&job.state)
        .bind(&job.name)
        .bind(&job.err_reason)
        .bind(job.duration_ms)
        .bind(&job.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_processing_jobs(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE jobs SET state = ? WHERE state = ?")
            .bind(JobState::Submitted.as_str())
            .bind(JobState::Processing.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
