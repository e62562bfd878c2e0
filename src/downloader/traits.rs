// Tool runner trait definition

use std::path::Path;

use async_trait::async_trait;

use super::errors::DownloadError;
use super::utils::CommandOutput;

/// Runs an external tool to completion and hands back everything it printed.
///
/// A non-zero exit is *not* an error at this layer; callers decide via
/// [`CommandOutput::into_result`]. `Err` is reserved for failures to run the
/// process at all (spawn, wait, optional deadline).
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput, DownloadError>;
}
