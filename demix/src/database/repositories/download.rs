//! Download repository.

use async_trait::async_trait;

use crate::Result;
use crate::database::DbPool;
use crate::database::models::Download;

/// Download repository trait.
#[async_trait]
pub trait DownloadRepository: Send + Sync {
    async fn create(&self, download: &Download) -> Result<()>;
    async fn list_for_job(&self, job_id: &str) -> Result<Vec<Download>>;
    async fn delete_for_job(&self, job_id: &str) -> Result<()>;
}

/// SQLx implementation of DownloadRepository.
pub struct SqlxDownloadRepository {
    pool: DbPool,
}

impl SqlxDownloadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DownloadRepository for SqlxDownloadRepository {
    async fn create(&self, download: &Download) -> Result<()> {
        sqlx::query("INSERT INTO downloads (job_id, path, name) VALUES (?, ?, ?)")
            .bind(&download.job_id)
            .bind(&download.path)
            .bind(&download.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_for_job(&self, job_id: &str) -> Result<Vec<Download>> {
        let downloads =
            sqlx::query_as::<_, Download>("SELECT * FROM downloads WHERE job_id = ? ORDER BY path")
                .bind(job_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(downloads)
    }

    async fn delete_for_job(&self, job_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM downloads WHERE job_id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
