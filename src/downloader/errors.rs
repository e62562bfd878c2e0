// Error types for the download pipeline

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// The tool could not be started at all (missing binary, bad permissions)
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and exited non-zero
    #[error("Command failed: {}", display_stderr(.stderr))]
    ToolInvocationFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The platform asked for a signed-in session (bot check, age gate)
    #[error("Verification required: {}", display_stderr(.stderr))]
    VerificationRequired { stderr: String },

    /// The tool reported success but left nothing at the expected path
    #[error("Download failed (file not found after reported success): {}", .path.display())]
    OutputMissing { path: PathBuf },

    /// Reading the finished file failed while the response was streaming
    #[error("Stream failure: {0}")]
    StreamFailure(#[source] std::io::Error),

    /// Only raised when a tool deadline is configured
    #[error("{program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    /// Failed to parse yt-dlp JSON output
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid media URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn display_stderr(stderr: &str) -> &str {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        "Unknown error"
    } else {
        trimmed
    }
}

impl DownloadError {
    /// Whether the caller should be told to configure a cookie credential
    pub fn requires_credential(&self) -> bool {
        matches!(self, Self::VerificationRequired { .. })
    }

    /// Captured tool error text, if this failure came from a tool run
    pub fn tool_stderr(&self) -> Option<&str> {
        match self {
            Self::ToolInvocationFailed { stderr, .. } | Self::VerificationRequired { stderr } => {
                Some(stderr)
            }
            _ => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
