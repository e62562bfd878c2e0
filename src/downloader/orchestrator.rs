// Orchestrator: metadata negotiation and download jobs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::io::ReaderStream;

use crate::config::ServerConfig;

use super::cookies::{CookieFile, CredentialProvisioner};
use super::diagnostics::reason_for;
use super::errors::DownloadError;
use super::format_selector::FormatSelector;
use super::invocation::{
    classify_variant, download_args, metadata_args, sanitize_title, title_args, unique_job_id,
    InvocationContext,
};
use super::models::{JobState, MediaMetadata, RawMediaInfo};
use super::stream::{CleanupStream, JobArtifacts, TempOutput};
use super::tools::{tool_info, ToolInfo, ToolLocator, ToolPath, ToolType};
use super::traits::ToolRunner;
use super::utils::SystemRunner;

pub type DownloadBody = CleanupStream<ReaderStream<tokio::fs::File>>;

/// Parameters of one `GET /download`
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub url: String,
    pub variant: Option<String>,
    pub title: Option<String>,
}

/// A finished download, ready to be streamed
pub struct PreparedDownload {
    pub job_id: String,
    pub filename: String,
    pub content_type: &'static str,
    pub content_length: u64,
    pub body: DownloadBody,
}

impl PreparedDownload {
    /// RFC 5987 `Content-Disposition` value
    pub fn content_disposition(&self) -> String {
        format!(
            "attachment; filename*=UTF-8''{}",
            urlencoding::encode(&self.filename)
        )
    }
}

/// Resolved tools plus the per-job cookie file; the file is removed on drop
struct JobTools {
    ytdlp: ToolPath,
    ffmpeg: ToolPath,
    cookies: Option<CookieFile>,
}

pub struct Downloader {
    locator: ToolLocator,
    credentials: CredentialProvisioner,
    runner: Arc<dyn ToolRunner>,
    temp_dir: PathBuf,
    proxy: Option<String>,
}

impl Downloader {
    pub fn new(config: &ServerConfig) -> Self {
        let locator = ToolLocator::new(&config.app_root)
            .with_override(ToolType::YtDlp, config.ytdlp_path.clone())
            .with_override(ToolType::Ffmpeg, config.ffmpeg_path.clone());

        Self {
            locator,
            credentials: CredentialProvisioner::new(config.cookies.clone(), &config.temp_dir),
            runner: Arc::new(SystemRunner::new().with_deadline(config.tool_timeout)),
            temp_dir: config.temp_dir.clone(),
            proxy: config.proxy.clone(),
        }
    }

    /// Swap the process runner, e.g. for a scripted fake in tests
    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn has_credential(&self) -> bool {
        self.credentials.is_configured()
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Report which binaries would be used and whether they answer `--version`
    pub async fn tools_status(&self) -> Vec<ToolInfo> {
        let mut tools = Vec::with_capacity(2);
        for tool in [ToolType::YtDlp, ToolType::Ffmpeg] {
            tools.push(tool_info(&self.locator, self.runner.as_ref(), tool).await);
        }
        tools
    }

    async fn job_tools(&self, job_id: &str) -> JobTools {
        let ytdlp = self.locator.locate(ToolType::YtDlp);
        let ffmpeg = self.locator.locate(ToolType::Ffmpeg);
        tracing::debug!("[Downloader] yt-dlp: {}, ffmpeg: {}", ytdlp, ffmpeg);

        JobTools {
            ytdlp,
            ffmpeg,
            cookies: self.credentials.credential_file(job_id).await,
        }
    }

    fn context<'a>(&'a self, tools: &'a JobTools) -> InvocationContext<'a> {
        InvocationContext {
            ffmpeg: tools.ffmpeg.path(),
            cookies: tools.cookies.as_ref().map(CookieFile::path),
            proxy: self.proxy.as_deref(),
        }
    }

    /// Query the media and reduce its formats to the offered variants
    pub async fn negotiate(&self, url: &str) -> Result<MediaMetadata, DownloadError> {
        let url = validate_url(url)?;
        let job_id = unique_job_id();
        let tools = self.job_tools(&job_id).await;

        tracing::info!("[Downloader] Fetching metadata for {}", url);
        let output = self
            .runner
            .run(tools.ytdlp.path(), &metadata_args(url, &self.context(&tools)))
            .await?
            .into_result()?;

        let info: RawMediaInfo = serde_json::from_str(output.stdout.trim())
            .map_err(|e| DownloadError::Parse(format!("Failed to parse JSON: {}", e)))?;

        let formats = FormatSelector::build_variants(&info);
        tracing::info!(
            "[Downloader] ✓ {} variants offered for {:?}",
            formats.len(),
            info.title.as_deref().unwrap_or("")
        );

        Ok(MediaMetadata {
            duration: FormatSelector::duration_label(&info),
            title: info.title.unwrap_or_else(|| "Unknown".to_string()),
            thumbnail: info.thumbnail,
            formats,
        })
    }

    /// Run one download job up to the point where its file can be streamed.
    ///
    /// Every `dl-<job>.*` artifact is removed if the job fails, and also if
    /// this future is dropped before it finishes.
    pub async fn download(&self, request: DownloadRequest) -> Result<PreparedDownload, DownloadError> {
        let url = validate_url(&request.url)?.to_string();
        let job_id = unique_job_id();
        let stem = format!("dl-{}", job_id);
        let mut artifacts = JobArtifacts::new(&job_id, &self.temp_dir, &stem);
        log_state(&job_id, JobState::Preparing);

        match self.prepare(&job_id, &stem, &url, &request).await {
            Ok(prepared) => {
                // The body stream owns the output file from here on
                artifacts.disarm();
                log_state(&job_id, JobState::Streaming);
                Ok(prepared)
            }
            Err(e) => {
                let reason = reason_for(&e).map_or("", |r| r.description());
                tracing::warn!("[Job {}] {}: {} {}", job_id, JobState::Failed, reason, e);
                Err(e)
            }
        }
    }

    async fn prepare(
        &self,
        job_id: &str,
        stem: &str,
        url: &str,
        request: &DownloadRequest,
    ) -> Result<PreparedDownload, DownloadError> {
        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| DownloadError::io(&self.temp_dir, e))?;

        let tools = self.job_tools(job_id).await;
        let ctx = self.context(&tools);

        let raw_title = match request.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => {
                let output = self
                    .runner
                    .run(tools.ytdlp.path(), &title_args(url, &ctx))
                    .await?
                    .into_result()?;
                output.stdout.lines().next().unwrap_or("").to_string()
            }
        };
        let title = sanitize_title(&raw_title);

        let mode = classify_variant(request.variant.as_deref());
        tracing::info!(
            "[Job {}] {} mode for {:?}",
            job_id,
            if mode.is_audio() { "audio" } else { "video" },
            title
        );
        let template = self.temp_dir.join(format!("{}.%(ext)s", stem));
        let expected = self.temp_dir.join(format!("{}.{}", stem, mode.extension()));

        log_state(job_id, JobState::ExecutingTool);
        self.runner
            .run(tools.ytdlp.path(), &download_args(url, &mode, &template, &ctx))
            .await?
            .into_result()?;
        // Cookie file is no longer needed once the tool has exited
        drop(tools);

        log_state(job_id, JobState::VerifyingOutput);
        let output = TempOutput::new(&expected);
        let metadata = match tokio::fs::metadata(&expected).await {
            Ok(meta) if meta.is_file() => meta,
            _ => return Err(DownloadError::OutputMissing { path: expected }),
        };
        let file = tokio::fs::File::open(&expected)
            .await
            .map_err(|e| DownloadError::io(&expected, e))?;

        let filename = format!("{}.{}", title, mode.extension());
        tracing::info!(
            "[Job {}] {} ready ({} bytes) as {:?}",
            job_id,
            expected.display(),
            metadata.len(),
            filename
        );

        Ok(PreparedDownload {
            job_id: job_id.to_string(),
            filename,
            content_type: mode.content_type(),
            content_length: metadata.len(),
            body: CleanupStream::new(job_id, ReaderStream::new(file), output),
        })
    }
}

fn log_state(job_id: &str, state: JobState) {
    tracing::info!("[Job {}] {}", job_id, state);
}

/// Reject blank URLs and anything yt-dlp would parse as an option
pub fn validate_url(url: &str) -> Result<&str, DownloadError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(DownloadError::InvalidUrl("URL is required".to_string()));
    }
    if url.starts_with('-') {
        return Err(DownloadError::InvalidUrl(format!(
            "URL must not start with '-': {}",
            url
        )));
    }
    Ok(url)
}
