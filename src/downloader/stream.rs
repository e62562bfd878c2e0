// Response body for finished downloads
//
// The temporary output file is deleted exactly once, whichever comes first:
// the last chunk, a read error, or the client going away.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Bytes;
use futures_util::Stream;

use super::errors::DownloadError;
use super::models::JobState;
use super::utils::remove_quietly;

/// Owns a temporary file path until `cleanup` or drop
#[derive(Debug)]
pub struct TempOutput {
    path: Option<PathBuf>,
}

impl TempOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// `None` once cleaned up
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn cleanup(&mut self) {
        if let Some(path) = self.path.take() {
            remove_quietly(&path);
        }
    }
}

impl Drop for TempOutput {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Wraps a byte stream read from a temporary file
pub struct CleanupStream<S> {
    job_id: String,
    // Taken (and so closed) before the file is removed
    inner: Option<S>,
    output: TempOutput,
    bytes_sent: u64,
}

impl<S> CleanupStream<S> {
    pub fn new(job_id: impl Into<String>, inner: S, output: TempOutput) -> Self {
        Self {
            job_id: job_id.into(),
            inner: Some(inner),
            output,
            bytes_sent: 0,
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    fn finish(&mut self, state: JobState) {
        debug_assert!(state.is_terminal());
        if self.inner.take().is_none() {
            return;
        }
        self.output.cleanup();

        match state {
            JobState::Completed => tracing::info!(
                "[Job {}] {} ({} bytes)",
                self.job_id,
                state,
                self.bytes_sent
            ),
            _ => tracing::warn!(
                "[Job {}] {} after {} bytes",
                self.job_id,
                state,
                self.bytes_sent
            ),
        }
    }
}

impl<S> Stream for CleanupStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = Result<Bytes, DownloadError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match Pin::new(inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes_sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish(JobState::Failed);
                Poll::Ready(Some(Err(DownloadError::StreamFailure(e))))
            }
            Poll::Ready(None) => {
                this.finish(JobState::Completed);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> Drop for CleanupStream<S> {
    fn drop(&mut self) {
        self.finish(JobState::Cancelled);
    }
}

/// Every `dl-<job>.*` file of a job that has not reached streaming.
///
/// Swept on drop while armed, so a failed job and a request future dropped
/// mid-run (client gone, outer timeout) both leave nothing behind. Disarm
/// once a [`CleanupStream`] owns the output.
#[derive(Debug)]
pub struct JobArtifacts {
    job_id: String,
    dir: PathBuf,
    prefix: String,
    armed: bool,
}

impl JobArtifacts {
    pub fn new(
        job_id: impl Into<String>,
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            dir: dir.into(),
            prefix: prefix.into(),
            armed: true,
        }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for JobArtifacts {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let removed = sweep_job_artifacts(&self.dir, &self.prefix);
        if removed > 0 {
            tracing::debug!("[Job {}] removed {} leftover file(s)", self.job_id, removed);
        }
    }
}

/// Remove every `<prefix>.*` file in `dir`, returning how many were removed
pub fn sweep_job_artifacts(dir: &Path, prefix: &str) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return 0,
        Err(e) => {
            tracing::warn!("[Cleanup] cannot list {}: {}", dir.display(), e);
            return 0;
        }
    };

    let dotted = format!("{}.", prefix);
    let mut removed = 0;
    for entry in entries {
        match entry {
            Ok(entry) if entry.file_name().to_string_lossy().starts_with(&dotted) => {
                remove_quietly(&entry.path());
                removed += 1;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("[Cleanup] error while listing {}: {}", dir.display(), e);
                break;
            }
        }
    }
    removed
}
