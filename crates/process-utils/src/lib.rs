//! Small process helpers shared across the workspace.
//!
//! Wraps `tokio::process` with the two things every external-tool invocation
//! here needs: captured output (split and combined) and cancellation-aware
//! waiting that kills the child when the supplied token fires.

use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Errors from spawning or waiting on a child process.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("spawning {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("reading process output: {0}")]
    Io(#[from] std::io::Error),

    #[error("process cancelled")]
    Cancelled,
}

/// Captured output of a finished child process.
///
/// `status` is reported as-is; a non-zero exit is not an error at this layer
/// so callers can fold the captured text into their own error messages.
#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Stdout and stderr joined, for tools that interleave diagnostics
    /// across both streams.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
    }
}

impl NoWindowExt for Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on
/// Windows.
pub fn tokio_command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    cmd.no_window();
    cmd
}

/// Run a command to completion, capturing stdout and stderr.
///
/// The child is killed if `cancel` fires before it exits, in which case
/// [`ProcessError::Cancelled`] is returned. A non-zero exit status is
/// returned as a successful [`Captured`] for the caller to interpret.
pub async fn run_captured(
    mut cmd: Command,
    cancel: &CancellationToken,
) -> Result<Captured, ProcessError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;

    let mut stdout_pipe = child.stdout.take().expect("stdout piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped");

    let drain = async {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let (a, b) = tokio::join!(
            stdout_pipe.read_to_end(&mut stdout),
            stderr_pipe.read_to_end(&mut stderr),
        );
        a?;
        b?;
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((status, stdout, stderr))
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            // kill_on_drop reaps the child once `drain` is dropped.
            Err(ProcessError::Cancelled)
        }
        result = drain => {
            let (status, stdout, stderr) = result?;
            Ok(Captured {
                status,
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            })
        }
    }
}

/// Check that a binary is present and runnable by invoking it with a probe
/// argument (e.g. `--version`) and waiting for any exit.
pub async fn probe_binary(program: &str, arg: &str) -> Result<(), ProcessError> {
    let mut cmd = tokio_command(program);
    cmd.arg(arg);
    run_captured(cmd, &CancellationToken::new())
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn captures_split_and_combined_output() {
        let mut cmd = tokio_command("sh");
        cmd.args(["-c", "echo out; echo err >&2"]);

        let captured = run_captured(cmd, &CancellationToken::new()).await.unwrap();
        assert!(captured.success());
        assert_eq!(captured.stdout, "out\n");
        assert_eq!(captured.stderr, "err\n");
        assert_eq!(captured.combined(), "out\nerr\n");
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_an_error() {
        let mut cmd = tokio_command("sh");
        cmd.args(["-c", "echo boom >&2; exit 3"]);

        let captured = run_captured(cmd, &CancellationToken::new()).await.unwrap();
        assert!(!captured.success());
        assert_eq!(captured.status.code(), Some(3));
        assert_eq!(captured.stderr, "boom\n");
    }

    #[tokio::test]
    async fn cancellation_kills_the_child() {
        let cancel = CancellationToken::new();
        let mut cmd = tokio_command("sleep");
        cmd.arg("30");

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let start = std::time::Instant::now();
        let err = run_captured(cmd, &cancel).await.unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let cmd = tokio_command("definitely-not-a-real-binary-demix");
        let err = run_captured(cmd, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
