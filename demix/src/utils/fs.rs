//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and
//! fold the "missing is fine" cases of directory clearing into one place.

use std::path::Path;

use crate::{Error, Result};

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::io_path("creating directory", path, e))
}

/// Remove a directory tree if it exists; a missing directory is not an error.
pub async fn remove_dir_all_if_exists(op: &'static str, path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io_path(op, path, e)),
    }
}
