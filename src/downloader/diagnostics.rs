// Failure diagnostics over captured yt-dlp stderr
//
// Yields the coarse reason reported to clients, and decides whether a failure
// is the "configure cookies" kind.

use serde::Serialize;

use super::errors::DownloadError;
use super::utils::CommandOutput;

/// Why a tool run was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingReason {
    /// "Sign in to confirm you're not a bot", age gates, cookie prompts
    SignInRequired,

    PrivateVideo,
    /// Removed, deleted or otherwise gone
    VideoUnavailable,
    GeoBlocked,
    /// HTTP 429 from the platform
    RateLimited,
    /// HTTP 403 without a more specific marker
    Forbidden,
    NetworkTimeout,
    Unknown,
}

impl BlockingReason {
    /// Only this class is answered with "configure a credential"
    pub fn requires_credential(&self) -> bool {
        matches!(self, Self::SignInRequired)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::SignInRequired => "The platform requires a signed-in session",
            Self::PrivateVideo => "The video is private",
            Self::VideoUnavailable => "The video is no longer available",
            Self::GeoBlocked => "Blocked in this region",
            Self::RateLimited => "Rate limited by the platform",
            Self::Forbidden => "Access denied (HTTP 403)",
            Self::NetworkTimeout => "Network timeout",
            Self::Unknown => "Unknown failure",
        }
    }

    /// Short advice for the client
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::SignInRequired => Some(
                "Export cookies from a logged-in browser in Netscape cookie-jar format \
                 and set them in the YOUTUBE_COOKIES environment variable.",
            ),
            Self::PrivateVideo => Some("Cookies from an account with access are required."),
            Self::VideoUnavailable => Some("The video may have been deleted or made private."),
            Self::GeoBlocked => Some("Set YTDLP_PROXY to a proxy in an allowed region."),
            Self::RateLimited | Self::Forbidden => Some("Wait and try again later."),
            Self::NetworkTimeout | Self::Unknown => None,
        }
    }
}

/// Lower-case phrases per reason, checked top to bottom; first hit wins.
/// yt-dlp's bot-check advice mentions `--cookies`, so "cookies" alone is enough.
const MARKERS: &[(BlockingReason, &[&str])] = &[
    (BlockingReason::SignInRequired, &["sign in to confirm", "cookies"]),
    (
        BlockingReason::PrivateVideo,
        &["private video", "video is private", "sign in if you've been granted access"],
    ),
    (
        BlockingReason::VideoUnavailable,
        &[
            "video unavailable",
            "video is unavailable",
            "video has been removed",
            "no longer available",
        ],
    ),
    (
        BlockingReason::GeoBlocked,
        &["not available in your country", "blocked in your country", "geo restrict"],
    ),
    (BlockingReason::RateLimited, &["429", "too many requests", "rate limit"]),
    (BlockingReason::Forbidden, &["403", "forbidden"]),
    (
        BlockingReason::NetworkTimeout,
        &["timed out", "timeout", "connection refused", "network unreachable"],
    ),
];

/// Reason behind a captured error text; `None` when there is no text at all
pub fn diagnose_error(stderr: &str) -> Option<BlockingReason> {
    if stderr.trim().is_empty() {
        return None;
    }

    let haystack = stderr.to_lowercase();
    let reason = MARKERS
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| haystack.contains(p)))
        .map_or(BlockingReason::Unknown, |(reason, _)| *reason);
    Some(reason)
}

/// Map a failed tool run onto the error taxonomy. Pure over the captured output.
pub fn classify_failure(output: &CommandOutput) -> DownloadError {
    let stderr = output.stderr.clone();
    match diagnose_error(&stderr) {
        Some(reason) if reason.requires_credential() => DownloadError::VerificationRequired { stderr },
        _ => DownloadError::ToolInvocationFailed {
            exit_code: output.exit_code,
            stderr,
        },
    }
}

/// Reason for an arbitrary pipeline error, when it came from the tool
pub fn reason_for(error: &DownloadError) -> Option<BlockingReason> {
    match error {
        DownloadError::VerificationRequired { .. } => Some(BlockingReason::SignInRequired),
        DownloadError::Timeout { .. } => Some(BlockingReason::NetworkTimeout),
        other => other.tool_stderr().and_then(diagnose_error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(stderr: &str) -> CommandOutput {
        CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: Some(1),
        }
    }

    #[test]
    fn bot_check_needs_credential() {
        let error = "ERROR: [youtube] abc: Sign in to confirm you're not a bot. \
                     Use --cookies-from-browser or --cookies for the authentication.";
        assert_eq!(diagnose_error(error), Some(BlockingReason::SignInRequired));
    }

    #[test]
    fn age_gate_needs_credential() {
        let error = "Sign in to confirm your age. This video may be inappropriate for some users.";
        assert_eq!(diagnose_error(error), Some(BlockingReason::SignInRequired));
    }

    #[test]
    fn marker_table_order() {
        let cases = [
            ("ERROR: unable to download video data: HTTP Error 403: Forbidden", BlockingReason::Forbidden),
            ("ERROR: [youtube] x: This video is not available in your country", BlockingReason::GeoBlocked),
            ("ERROR: [youtube] x: Private video. Sign in if you've been granted access", BlockingReason::PrivateVideo),
            ("HTTP Error 429: Too Many Requests", BlockingReason::RateLimited),
            ("urlopen error [Errno 110] Connection timed out", BlockingReason::NetworkTimeout),
            ("ERROR: Postprocessing: ffprobe and ffmpeg not found", BlockingReason::Unknown),
            // A cookie hint outranks the 403 that accompanies it
            ("HTTP Error 403: Forbidden. Use --cookies", BlockingReason::SignInRequired),
        ];
        for (stderr, expected) in cases {
            assert_eq!(diagnose_error(stderr), Some(expected), "{}", stderr);
        }
    }

    #[test]
    fn empty_text_is_undiagnosed() {
        assert_eq!(diagnose_error("   "), None);
    }

    #[test]
    fn classify_maps_sign_in_to_verification() {
        let err = classify_failure(&failed("Sign in to confirm you're not a bot"));
        assert!(err.requires_credential());
        assert_eq!(reason_for(&err), Some(BlockingReason::SignInRequired));
    }

    #[test]
    fn classify_keeps_other_failures_generic() {
        let err = classify_failure(&failed("ERROR: Video unavailable"));
        assert!(!err.requires_credential());
        match &err {
            DownloadError::ToolInvocationFailed { exit_code, .. } => assert_eq!(*exit_code, Some(1)),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(reason_for(&err), Some(BlockingReason::VideoUnavailable));
    }
}
