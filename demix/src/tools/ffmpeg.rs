//! ffmpeg mixer wrapper.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use process_utils::{run_captured, tokio_command};
use tokio_util::sync::CancellationToken;

use super::Mixer;
use crate::{Error, Result};

/// Mixer backed by the `ffmpeg` binary, blending inputs with the `amix`
/// filter.
pub struct Ffmpeg {
    program: String,
}

impl Ffmpeg {
    pub fn new() -> Self {
        Self {
            program: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
        }
    }

    /// Create with a custom ffmpeg path.
    #[allow(dead_code)]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn build_args(inputs: &[PathBuf], output: &Path) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "warning".to_string(),
        ];
        for input in inputs {
            args.push("-i".to_string());
            args.push(input.display().to_string());
        }
        args.extend([
            "-filter_complex".to_string(),
            format!(
                "amix=dropout_transition=0:normalize=0:inputs={}",
                inputs.len()
            ),
            "--".to_string(),
            output.display().to_string(),
        ]);
        args
    }
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mixer for Ffmpeg {
    async fn blend(
        &self,
        cancel: &CancellationToken,
        inputs: &[PathBuf],
        output: &Path,
    ) -> Result<()> {
        let mut cmd = tokio_command(&self.program);
        cmd.args(Self::build_args(inputs, output));

        let captured = run_captured(cmd, cancel).await?;
        if !captured.success() {
            // no partial output file may remain
            let _ = tokio::fs::remove_file(output).await;
            return Err(Error::tool(format!(
                "executing ffmpeg: exit status {}: {}",
                captured.status.code().unwrap_or(-1),
                captured.combined().trim()
            )));
        }

        Ok(())
    }
}
