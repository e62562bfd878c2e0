// FormatSelector - turns yt-dlp's raw format list into client-facing variants
//
// Pipeline, in order:
// - drop entries without a format id or with a manifest/segmented protocol
// - classify audio/video by the "none" codec marker
// - label by height ("720p", "720p (silent)") or as audio
// - single-pass dedupe by resolution label (audio beats silent, then bigger wins)
// - keep mp4/m4a/webm
// - append the synthetic best-audio variant
// - stable sort: video by height desc, then audio

use super::models::{RawFormat, RawMediaInfo, StreamVariant};

/// Sentinel id for "extract the best audio track as MP3"
pub const BEST_AUDIO_ID: &str = "audio-best";

const BEST_AUDIO_LABEL: &str = "Best Audio (MP3)";
const AUDIO_LABEL: &str = "Audio (MP3)";
const SUPPORTED_CONTAINERS: [&str; 3] = ["mp4", "m4a", "webm"];
const HIGH_RES_THRESHOLD: u32 = 720;

pub struct FormatSelector;

impl FormatSelector {
    /// Run the whole pipeline over a `--dump-json` document
    pub fn build_variants(info: &RawMediaInfo) -> Vec<StreamVariant> {
        let raw = info.formats.as_deref().unwrap_or_default();

        let described: Vec<StreamVariant> = raw
            .iter()
            .filter(|f| Self::is_usable(f))
            .map(Self::describe)
            .collect();

        let mut variants: Vec<StreamVariant> = Self::dedupe_by_label(described)
            .into_iter()
            .filter(|v| SUPPORTED_CONTAINERS.contains(&v.container.as_str()))
            .collect();

        variants.push(Self::best_audio(raw));
        Self::sort_variants(&mut variants);
        variants
    }

    fn is_usable(format: &RawFormat) -> bool {
        let has_id = format
            .format_id
            .as_deref()
            .map_or(false, |id| !id.trim().is_empty());
        // HLS/DASH manifests need re-muxing the download step doesn't do
        let direct = format
            .protocol
            .as_deref()
            .map_or(true, |p| p == "https" || p == "http");
        has_id && direct
    }

    fn describe(format: &RawFormat) -> StreamVariant {
        let has_video = format.has_video();
        let has_audio = format.has_audio();

        StreamVariant {
            id: format.format_id.clone().unwrap_or_default(),
            quality_label: Self::quality_label(has_video, has_audio, format.height),
            container: format.ext.clone().unwrap_or_default(),
            has_audio,
            has_video,
            content_length: format.byte_estimate(),
            height: format.height,
            is_high_res: format.height.map_or(false, |h| h > HIGH_RES_THRESHOLD),
        }
    }

    /// "1080p", "Video", or the generic audio label
    fn resolution_label(has_video: bool, height: Option<u32>) -> String {
        match (has_video, height) {
            (false, _) => AUDIO_LABEL.to_string(),
            (true, Some(h)) => format!("{}p", h),
            (true, None) => "Video".to_string(),
        }
    }

    /// Resolution label, annotated when a video stream carries no audio
    pub fn quality_label(has_video: bool, has_audio: bool, height: Option<u32>) -> String {
        let base = Self::resolution_label(has_video, height);
        if has_video && !has_audio {
            format!("{} (silent)", base)
        } else {
            base
        }
    }

    /// Greedy, encounter-order reduction keyed on the resolution label, so a
    /// muxed "720p" and a silent "720p" compete for one slot. A replacement
    /// takes over the slot of the entry it beats.
    fn dedupe_by_label(variants: Vec<StreamVariant>) -> Vec<StreamVariant> {
        let mut kept: Vec<StreamVariant> = Vec::with_capacity(variants.len());

        for candidate in variants {
            let key = Self::resolution_label(candidate.has_video, candidate.height);
            match kept
                .iter_mut()
                .find(|existing| Self::resolution_label(existing.has_video, existing.height) == key)
            {
                Some(existing) => {
                    let gains_audio = candidate.has_audio && !existing.has_audio;
                    let bigger = candidate.has_audio == existing.has_audio
                        && candidate.content_length > existing.content_length;
                    if gains_audio || bigger {
                        *existing = candidate;
                    }
                }
                None => kept.push(candidate),
            }
        }

        kept
    }

    /// The synthetic audio-extraction option. Sized after the largest
    /// audio-only stream, which the per-format filters may have dropped.
    fn best_audio(raw: &[RawFormat]) -> StreamVariant {
        let best_audio_size = raw
            .iter()
            .filter(|f| !f.has_video() && f.has_audio())
            .map(RawFormat::byte_estimate)
            .max()
            .unwrap_or(0);

        StreamVariant {
            id: BEST_AUDIO_ID.to_string(),
            quality_label: BEST_AUDIO_LABEL.to_string(),
            container: "mp3".to_string(),
            has_audio: true,
            has_video: false,
            content_length: best_audio_size,
            height: None,
            is_high_res: false,
        }
    }

    /// Video first (tallest first), audio last; `sort_by` is stable
    fn sort_variants(variants: &mut [StreamVariant]) {
        variants.sort_by(|a, b| match (a.has_video, b.has_video) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            (true, true) => b.height.unwrap_or(0).cmp(&a.height.unwrap_or(0)),
            (false, false) => std::cmp::Ordering::Equal,
        });
    }

    /// "3:32" / "1:02:05"; yt-dlp's own string wins when present
    pub fn duration_label(info: &RawMediaInfo) -> String {
        if let Some(label) = info.duration_string.as_deref().filter(|s| !s.is_empty()) {
            return label.to_string();
        }

        let total = info.duration.unwrap_or(0.0).max(0.0) as u64;
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{}:{:02}", minutes, seconds)
        }
    }
}
