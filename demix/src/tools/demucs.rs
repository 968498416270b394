//! demucs separator wrapper.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use process_utils::{run_captured, tokio_command};
use tokio_util::sync::CancellationToken;

use super::Separator;
use crate::domain::ModelProfile;
use crate::utils::fs::ensure_dir_all;
use crate::{Error, Result};

/// Separator backed by the `demucs` binary.
///
/// demucs writes its stems under `<out>/<model>/` named
/// `{stem}-{track}.{ext}`; the wrapper moves them into the target directory
/// and validates the set against the profile.
pub struct Demucs {
    program: String,
}

impl Demucs {
    pub fn new() -> Self {
        Self {
            program: std::env::var("DEMUCS_PATH").unwrap_or_else(|_| "demucs".to_string()),
        }
    }

    fn build_args(model: &str, jobs: u32, scratch_dir: &Path, input: &Path) -> Vec<String> {
        vec![
            "-n".to_string(),
            model.to_string(),
            "--jobs".to_string(),
            jobs.to_string(),
            "--filename".to_string(),
            "{stem}-{track}.{ext}".to_string(),
            "-o".to_string(),
            scratch_dir.display().to_string(),
            "--mp3".to_string(),
            "--".to_string(),
            input.display().to_string(),
        ]
    }
}

impl Default for Demucs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Separator for Demucs {
    async fn split(
        &self,
        cancel: &CancellationToken,
        profile: &ModelProfile,
        jobs_override: Option<u32>,
        input: &Path,
        temp_dir: &Path,
        target_dir: &Path,
    ) -> Result<HashMap<String, PathBuf>> {
        let scratch = tempfile::Builder::new()
            .prefix("demucs")
            .tempdir_in(temp_dir)?;

        let jobs = jobs_override.unwrap_or_else(|| profile.separator_jobs());

        let mut cmd = tokio_command(&self.program);
        cmd.args(Self::build_args(profile.name, jobs, scratch.path(), input));

        let captured = run_captured(cmd, cancel).await?;
        if !captured.success() {
            return Err(Error::tool(format!(
                "executing demucs: exit status {}: {}",
                captured.status.code().unwrap_or(-1),
                captured.combined().trim()
            )));
        }

        ensure_dir_all(target_dir).await?;

        let output_dir = scratch.path().join(profile.name);
        let mut entries = tokio::fs::read_dir(&output_dir)
            .await
            .map_err(|e| Error::io_path("reading separator output directory", &output_dir, e))?;

        let mut stems = HashMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io_path("reading separator output directory", &output_dir, e))?
        {
            let file_name = entry.file_name().to_string_lossy().into_owned();

            let Some((stem, _)) = file_name.split_once('-') else {
                return Err(Error::contract(format!(
                    "unexpected file name {file_name:?} in separator output"
                )));
            };
            if !profile.contains_stem(stem) {
                return Err(Error::contract(format!(
                    "unexpected stem name {stem} for model {}",
                    profile.name
                )));
            }

            let new_path = target_dir.join(&file_name);
            tokio::fs::rename(entry.path(), &new_path)
                .await
                .map_err(|e| Error::io_path("moving stem file", &entry.path(), e))?;

            stems.insert(stem.to_string(), new_path);
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

        Ok(stems)
    }
}
