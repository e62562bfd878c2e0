// Downloader module: tool discovery, execution, negotiation and download jobs

pub mod cookies;
pub mod diagnostics;
pub mod errors;
pub mod format_selector;
pub mod invocation;
pub mod models;
pub mod orchestrator;
pub mod stream;
pub mod tools;
pub mod traits;
pub mod utils;

pub use cookies::{Credential, CredentialProvisioner};
pub use errors::DownloadError;
pub use models::{DownloadMode, JobState, MediaMetadata, StreamVariant};
pub use orchestrator::{DownloadRequest, Downloader, PreparedDownload};
pub use tools::{ToolInfo, ToolLocator, ToolType};
pub use traits::ToolRunner;
pub use utils::{CommandOutput, SystemRunner};
