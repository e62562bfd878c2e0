// Common data models for the downloader

use std::fmt;

use serde::{Deserialize, Serialize};

/// One entry of the `formats` array printed by `yt-dlp --dump-json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    /// Platform-assigned format ID (e.g., "137", "140", "hls-1080p")
    pub format_id: Option<String>,
    /// File extension (mp4, webm, m4a)
    pub ext: Option<String>,
    /// Transfer protocol (https, m3u8_native, http_dash_segments)
    pub protocol: Option<String>,
    /// Video codec, "none" for audio-only
    pub vcodec: Option<String>,
    /// Audio codec, "none" for video-only
    pub acodec: Option<String>,
    pub height: Option<u32>,
    /// yt-dlp occasionally prints sizes as floats
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
}

impl RawFormat {
    /// Only an explicit "none" marks a missing track
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref() != Some("none")
    }

    pub fn has_audio(&self) -> bool {
        self.acodec.as_deref() != Some("none")
    }

    /// Exact size, else approximate size, else 0 (unknown)
    pub fn byte_estimate(&self) -> u64 {
        self.filesize
            .or(self.filesize_approx)
            .filter(|size| size.is_finite() && *size > 0.0)
            .map(|size| size as u64)
            .unwrap_or(0)
    }
}

/// The subset of the `--dump-json` document the negotiator reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMediaInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    /// Seconds
    pub duration: Option<f64>,
    /// Pre-formatted by yt-dlp, e.g. "3:32"
    pub duration_string: Option<String>,
    pub formats: Option<Vec<RawFormat>>,
}

/// One downloadable rendition offered to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamVariant {
    pub id: String,
    pub quality_label: String,
    pub container: String,
    pub has_audio: bool,
    pub has_video: bool,
    /// 0 when unknown
    pub content_length: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub is_high_res: bool,
}

/// Negotiation result returned by `GET /metadata`
#[derive(Debug, Clone, Serialize)]
pub struct MediaMetadata {
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration: String,
    pub formats: Vec<StreamVariant>,
}

/// What the tool is asked to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadMode {
    /// Extract and transcode to MP3
    Audio,
    /// Merge into MP4 using the given `-f` selector
    Video { selector: String },
}

impl DownloadMode {
    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Audio => "mp3",
            Self::Video { .. } => "mp4",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Audio => "audio/mpeg",
            Self::Video { .. } => "video/mp4",
        }
    }
}

/// Lifecycle of one download job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Preparing,
    ExecutingTool,
    VerifyingOutput,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preparing => "preparing",
            Self::ExecutingTool => "executing_tool",
            Self::VerifyingOutput => "verifying_output",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
