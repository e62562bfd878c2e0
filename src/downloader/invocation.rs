// yt-dlp argument construction and job naming
//
// Pure functions only; nothing here touches the filesystem or spawns.

use std::path::Path;

use rand::distr::Alphanumeric;
use rand::Rng;
use regex::Regex;

use super::format_selector::BEST_AUDIO_ID;
use super::models::DownloadMode;

/// Older clients ask for these itags when they mean "just the audio"
pub const LEGACY_AUDIO_IDS: [&str; 2] = ["140", "251"];

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const FALLBACK_SELECTOR: &str = "bestvideo+bestaudio/best";

lazy_static::lazy_static! {
    static ref NUMERIC_ID_RE: Regex = Regex::new(r"^\d+$").unwrap();
    static ref UNSAFE_TITLE_CHARS_RE: Regex = Regex::new(r"[^\w\s-]").unwrap();
}

/// Per-request inputs shared by every invocation
#[derive(Debug, Clone, Copy)]
pub struct InvocationContext<'a> {
    pub ffmpeg: &'a Path,
    pub cookies: Option<&'a Path>,
    pub proxy: Option<&'a str>,
}

impl InvocationContext<'_> {
    fn push_auth_and_network(&self, args: &mut Vec<String>) {
        if let Some(path) = self.cookies {
            args.push("--cookies".to_string());
            args.push(path.display().to_string());
        }
        if let Some(proxy) = self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.to_string());
        }
    }
}

/// Audio for the sentinel and legacy audio itags, video for everything else
pub fn classify_variant(variant: Option<&str>) -> DownloadMode {
    match variant.map(str::trim).filter(|v| !v.is_empty()) {
        Some(id) if id == BEST_AUDIO_ID || LEGACY_AUDIO_IDS.contains(&id) => DownloadMode::Audio,
        other => DownloadMode::Video {
            selector: format_selector(other),
        },
    }
}

/// `-f` value for video mode
pub fn format_selector(variant: Option<&str>) -> String {
    match variant {
        Some(id) if NUMERIC_ID_RE.is_match(id) => format!("{}+bestaudio/best", id),
        _ => FALLBACK_SELECTOR.to_string(),
    }
}

/// `--dump-json` metadata query
pub fn metadata_args(url: &str, ctx: &InvocationContext<'_>) -> Vec<String> {
    let mut args = vec![
        "--dump-json".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--no-check-certificates".to_string(),
        "--user-agent".to_string(),
        USER_AGENT.to_string(),
    ];
    ctx.push_auth_and_network(&mut args);
    args.push(url.to_string());
    args
}

/// Single-field title lookup
pub fn title_args(url: &str, ctx: &InvocationContext<'_>) -> Vec<String> {
    let mut args = vec![
        "--print".to_string(),
        "title".to_string(),
        "--no-warnings".to_string(),
        "--no-playlist".to_string(),
    ];
    ctx.push_auth_and_network(&mut args);
    args.push(url.to_string());
    args
}

/// Main download; `output_template` must contain `%(ext)s`
pub fn download_args(
    url: &str,
    mode: &DownloadMode,
    output_template: &Path,
    ctx: &InvocationContext<'_>,
) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        output_template.display().to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--no-check-certificates".to_string(),
        "--force-overwrites".to_string(),
        "--user-agent".to_string(),
        USER_AGENT.to_string(),
        "--ffmpeg-location".to_string(),
        ctx.ffmpeg.display().to_string(),
    ];
    ctx.push_auth_and_network(&mut args);

    match mode {
        DownloadMode::Audio => {
            args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                "mp3".to_string(),
                "--audio-quality".to_string(),
                "0".to_string(), // best VBR
            ]);
        }
        DownloadMode::Video { selector } => {
            args.extend([
                "-f".to_string(),
                selector.clone(),
                "--merge-output-format".to_string(),
                "mp4".to_string(),
            ]);
        }
    }

    args.push(url.to_string());
    args
}

/// Strip everything but word characters, whitespace and hyphens
pub fn sanitize_title(title: &str) -> String {
    let cleaned = UNSAFE_TITLE_CHARS_RE.replace_all(title, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Millisecond timestamp plus a random suffix, e.g. `1700000000000-a8Xk2pQ0z`
pub fn unique_job_id() -> String {
    let millis = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let mut rng = rand::rng();
    let suffix: String = std::iter::repeat_with(|| rng.sample(Alphanumeric) as char)
        .take(9)
        .collect();
    format!("{}-{}", millis, suffix)
}
