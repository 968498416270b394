//! yt-dlp downloader wrapper.

use std::path::Path;

use async_trait::async_trait;
use process_utils::{run_captured, tokio_command};
use tokio_util::sync::CancellationToken;

use super::{Downloader, FetchedAudio};
use crate::{Error, Result};

/// Downloader backed by the `yt-dlp` binary.
///
/// Downloads the best audio track of a link, extracted to mp3, printing the
/// media title and the final file path on stdout (one line each).
pub struct YtDlp {
    program: String,
}

impl YtDlp {
    pub fn new() -> Self {
        Self {
            program: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
        }
    }

    fn build_args(link: &str, scratch_dir: &Path, target_dir: &Path) -> Vec<String> {
        vec![
            "--quiet".to_string(),
            "--paths".to_string(),
            format!("temp:{}", scratch_dir.display()),
            "--paths".to_string(),
            format!("home:{}", target_dir.display()),
            "-f".to_string(),
            "bestaudio".to_string(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--print".to_string(),
            "before_dl:%(title)U".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "--".to_string(),
            link.to_string(),
        ]
    }

    /// Parse stdout into (title, file path). Anything but exactly two lines
    /// is a contract violation.
    fn parse_stdout(stdout: &str) -> Result<(String, String)> {
        let lines: Vec<&str> = stdout.lines().collect();
        if lines.len() != 2 {
            return Err(Error::contract(format!(
                "splitting yt-dlp output: expected title and file path, got {} lines",
                lines.len()
            )));
        }
        Ok((lines[0].to_string(), lines[1].to_string()))
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for YtDlp {
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        link: &str,
        temp_dir: &Path,
        target_dir: &Path,
    ) -> Result<FetchedAudio> {
        let scratch = tempfile::Builder::new()
            .prefix("yt-dlp")
            .tempdir_in(temp_dir)?;
        // yt-dlp resolves temp paths relative to the home path unless they
        // are absolute
        let scratch_abs = std::path::absolute(scratch.path())?;

        let mut cmd = tokio_command(&self.program);
        cmd.args(Self::build_args(link, &scratch_abs, target_dir));

        let captured = run_captured(cmd, cancel).await?;
        if !captured.success() {
            return Err(Error::tool(format!(
                "executing yt-dlp: exit status {}: {}",
                captured.status.code().unwrap_or(-1),
                captured.stderr.trim()
            )));
        }

        let (title, path) = Self::parse_stdout(&captured.stdout)?;
        Ok(FetchedAudio {
            title,
            path: path.into(),
        })
    }
}
