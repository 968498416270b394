//! External tool collaborators: downloader, separator, mixer.
//!
//! Each tool is a subprocess wrapper behind a seam trait so the pipeline can
//! be exercised with fakes. Only input/output contracts matter here; the
//! tools' internals are not this system's concern.

pub mod demucs;
pub mod ffmpeg;
pub mod ytdlp;

pub use demucs::Demucs;
pub use ffmpeg::Ffmpeg;
pub use ytdlp::YtDlp;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::ModelProfile;
use crate::{Error, Result};

/// Result of a downloader fetch: the media title and the local audio file.
#[derive(Debug, Clone)]
pub struct FetchedAudio {
    pub title: String,
    pub path: PathBuf,
}

/// Fetch a remote link and produce a local audio file plus a display title.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `link` into `target_dir`, using scratch space under
    /// `temp_dir`. The child process is killed when `cancel` fires.
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        link: &str,
        temp_dir: &Path,
        target_dir: &Path,
    ) -> Result<FetchedAudio>;
}

/// Split one audio file into named stems according to a model profile.
#[async_trait]
pub trait Separator: Send + Sync {
    /// Returns a mapping of stem name to the produced file under
    /// `target_dir`. Must return exactly the stems the profile declares.
    /// `jobs_override` replaces the profile's default concurrency when set.
    async fn split(
        &self,
        cancel: &CancellationToken,
        profile: &ModelProfile,
        jobs_override: Option<u32>,
        input: &Path,
        temp_dir: &Path,
        target_dir: &Path,
    ) -> Result<HashMap<String, PathBuf>>;
}

/// Blend a set of audio files into one.
#[async_trait]
pub trait Mixer: Send + Sync {
    /// Either produces `output` or leaves no partial file behind.
    async fn blend(
        &self,
        cancel: &CancellationToken,
        inputs: &[PathBuf],
        output: &Path,
    ) -> Result<()>;
}

/// Verify the external binaries are present and runnable. A missing binary
/// aborts startup entirely.
pub async fn check_dependencies() -> Result<()> {
    for (program, probe) in [
        ("yt-dlp", "--version"),
        ("demucs", "--help"),
        ("ffmpeg", "-version"),
    ] {
        process_utils::probe_binary(program, probe)
            .await
            .map_err(|e| Error::config(format!("checking {program}: {e}")))?;
    }
    Ok(())
}
