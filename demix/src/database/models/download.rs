//! Download database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One named output artifact belonging to a job. `(job_id, path)` is the
/// natural key; rows are created as a batch when a pipeline succeeds and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Download {
    pub job_id: String,
    /// Stem tag: original, fono, vocals, drums, bass, guitar, piano, other.
    pub name: String,
    /// Path relative to the results root (`<job id>/<file name>`).
    pub path: String,
}

impl Download {
    pub fn new(
        job_id: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            name: name.into(),
            path: path.into(),
        }
    }
}
