//! Bounded invocation of the external audio encoder.
//!
//! The encoder is an opaque command-line transcoder (ffmpeg by default). It is run with a fixed
//! argument list that strips any video stream and re-encodes audio to a constant 64 kbps MP3. The
//! only things this module relies on are the exit status, the text written to stderr, and the
//! output file appearing at the requested path.
//!
//! Every invocation is wall-clock bounded. When the budget runs out the child is killed and reaped
//! before [`Encoder::run`] returns, so a timed-out encode never leaves a process behind.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error as ThisError;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::EncoderConfig;

/// Audio codec passed to the encoder.
pub const AUDIO_CODEC: &str = "libmp3lame";

/// Constant target bitrate, roughly 0.5 MB per minute of audio.
pub const AUDIO_BITRATE: &str = "64k";

#[derive(ThisError, Debug)]
pub enum EncoderError {
    /// The encoder binary could not be started (missing, not executable, ...)
    #[error("failed to start encoder: {0}")]
    Spawn(#[source] std::io::Error),

    /// The encoder ran and reported failure. `code` is `None` when it was killed by a signal.
    #[error("encoder exited unsuccessfully (code {code:?}): {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    /// The encoder did not finish within the configured budget and was killed
    #[error("encoder timed out after {timeout:?}")]
    TimedOut { timeout: Duration },

    /// Waiting on the running encoder failed
    #[error("failed waiting for encoder: {0}")]
    Io(#[source] std::io::Error),
}

/// Output captured from one finished encoder process.
#[derive(Debug)]
struct Captured {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Handle for running the configured encoder binary.
///
/// Cheap to clone; holds no per-request state, so a single instance is shared by all requests.
#[derive(Debug, Clone)]
pub struct Encoder {
    program: PathBuf,
    timeout: Duration,
}

impl Encoder {
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: config.timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The fixed argument list for a transcode from `input` to `output`.
    ///
    /// `-nostdin` keeps the encoder from waiting on terminal input, `-vn` drops video, `-y`
    /// overwrites the output path.
    pub fn args(input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-nostdin".into(),
            "-i".into(),
            input.into(),
            "-vn".into(),
            "-c:a".into(),
            AUDIO_CODEC.into(),
            "-b:a".into(),
            AUDIO_BITRATE.into(),
            "-y".into(),
            output.into(),
        ]
    }

    /// Transcode `input` into a 64 kbps MP3 at `output`.
    pub async fn run(&self, input: &Path, output: &Path) -> Result<(), EncoderError> {
        let captured = self.execute(&Self::args(input, output), false).await?;

        if captured.status.success() {
            Ok(())
        } else {
            Err(EncoderError::Failed {
                code: captured.status.code(),
                stderr: captured.stderr,
            })
        }
    }

    /// Check that the encoder can be started, returning the first line of its version banner.
    pub async fn probe(&self) -> Result<String, EncoderError> {
        let captured = self.execute(&["-version".into()], true).await?;

        if !captured.status.success() {
            return Err(EncoderError::Failed {
                code: captured.status.code(),
                stderr: captured.stderr,
            });
        }

        Ok(captured.stdout.lines().next().unwrap_or_default().to_string())
    }

    async fn execute(&self, args: &[OsString], capture_stdout: bool) -> Result<Captured, EncoderError> {
        debug!(program = %self.program.display(), ?args, "Spawning encoder");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(if capture_stdout { Stdio::piped() } else { Stdio::null() })
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EncoderError::Spawn)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Pipes are drained alongside wait() so a chatty encoder cannot block on a full buffer
        let outcome = tokio::time::timeout(self.timeout, async {
            let (status, stdout, stderr) = tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr));
            status.map(|status| Captured { status, stdout, stderr })
        })
        .await;

        match outcome {
            Ok(result) => result.map_err(EncoderError::Io),
            Err(_) => {
                warn!(
                    program = %self.program.display(),
                    timeout = ?self.timeout,
                    "Encoder exceeded its time budget, killing it"
                );
                // kill() also waits, so the process is reaped once this returns
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed out encoder");
                }
                Err(EncoderError::TimedOut { timeout: self.timeout })
            }
        }
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };

    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        debug!(error = %e, "Failed to read encoder output pipe");
    }
    String::from_utf8_lossy(&buf).trim_end().to_string()
}
