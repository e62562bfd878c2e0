// Process execution helpers shared by the negotiator and the orchestrator

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

use super::diagnostics::classify_failure;
use super::errors::DownloadError;
use super::traits::ToolRunner;

/// Fully buffered result of one tool run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turn a non-zero exit into the classified error
    pub fn into_result(self) -> Result<CommandOutput, DownloadError> {
        if self.success() {
            Ok(self)
        } else {
            Err(classify_failure(&self))
        }
    }
}

/// Spawns real processes with `tokio::process`
///
/// The child is killed when the run future is dropped or the deadline
/// passes. Only the direct child gets the signal: an ffmpeg that yt-dlp
/// started for merging or extraction is not in its reach and exits on its
/// own once its input pipe closes. Its partial files still carry the job's
/// `dl-<job>.` prefix and are swept with the rest.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    deadline: Option<Duration>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the tool if it has not exited within `deadline`
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

#[async_trait]
impl ToolRunner for SystemRunner {
    async fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput, DownloadError> {
        let program_name = program.display().to_string();
        tracing::debug!("[Executor] {} {}", program_name, args.join(" "));

        let mut child = TokioCommand::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DownloadError::Spawn {
                program: program_name.clone(),
                source,
            })?;

        let mut stdout_pipe = child.stdout.take().ok_or_else(|| DownloadError::Spawn {
            program: program_name.clone(),
            source: std::io::Error::other("stdout was not captured"),
        })?;
        let mut stderr_pipe = child.stderr.take().ok_or_else(|| DownloadError::Spawn {
            program: program_name.clone(),
            source: std::io::Error::other("stderr was not captured"),
        })?;

        // Drain both pipes concurrently so a chatty stderr cannot stall the child
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
        });

        let status = match self.deadline {
            Some(deadline) => match timeout(deadline, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    let _ = child.kill().await;
                    stdout_task.abort();
                    stderr_task.abort();
                    tracing::warn!(
                        "[Executor] {} killed after {}s",
                        program_name,
                        deadline.as_secs()
                    );
                    return Err(DownloadError::Timeout {
                        program: program_name,
                        seconds: deadline.as_secs(),
                    });
                }
            },
            None => child.wait().await,
        }
        .map_err(|e| DownloadError::io(program, e))?;

        let stdout = join_pipe(stdout_task, program).await?;
        let stderr = join_pipe(stderr_task, program).await?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code(),
        })
    }
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
    program: &Path,
) -> Result<Vec<u8>, DownloadError> {
    task.await
        .map_err(|e| DownloadError::io(program, std::io::Error::other(e)))?
        .map_err(|e| DownloadError::io(program, e))
}

/// Best-effort delete; a missing file is not worth a log line
pub fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("[Cleanup] removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("[Cleanup] failed to remove {}: {}", path.display(), e),
    }
}
