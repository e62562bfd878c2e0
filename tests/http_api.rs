// End-to-end tests of the HTTP surface with a scripted yt-dlp stand-in

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use ytdl_relay::downloader::{CommandOutput, DownloadError, Downloader, ToolRunner};
use ytdl_relay::{router, AppState, ServerConfig};

const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
const COOKIE_JAR: &str = "# Netscape HTTP Cookie File\n.youtube.com\tTRUE\t/\tTRUE\t0\tSID\tsecret\n";
const PAYLOAD: &[u8] = b"not really an mp4 but close enough";

fn metadata_json() -> String {
    serde_json::json!({
        "title": "Never Gonna Give You Up",
        "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg",
        "duration": 212.0,
        "duration_string": "3:32",
        "formats": [
            {"format_id": "hls-1080", "ext": "mp4", "protocol": "m3u8_native",
             "vcodec": "avc1", "acodec": "mp4a", "height": 1080},
            {"format_id": "136", "ext": "mp4", "protocol": "https",
             "vcodec": "avc1.4d401f", "acodec": "none", "height": 720, "filesize": 5000},
            {"format_id": "22", "ext": "mp4", "protocol": "https",
             "vcodec": "avc1.64001F", "acodec": "mp4a.40.2", "height": 720, "filesize": 3000},
            {"format_id": "18", "ext": "mp4", "protocol": "https",
             "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "height": 360,
             "filesize_approx": 1000},
            {"format_id": "140", "ext": "m4a", "protocol": "https",
             "vcodec": "none", "acodec": "mp4a.40.2", "filesize": 400},
            {"format_id": "251", "ext": "webm", "protocol": "https",
             "vcodec": "none", "acodec": "opus", "filesize": 500}
        ]
    })
    .to_string()
}

/// Behaves like yt-dlp for the three invocation shapes the relay uses
#[derive(Default)]
struct FakeYtDlp {
    calls: Mutex<Vec<Vec<String>>>,
    /// Every run fails with this stderr
    failure: Option<String>,
    /// Leave a partial artifact behind, then fail the download run
    partial_then_fail: bool,
    /// Report success without writing the output file
    skip_output: bool,
    /// Leave a partial artifact behind, then never return
    hang_after_partial: bool,
}

impl FakeYtDlp {
    fn failing(stderr: &str) -> Self {
        Self {
            failure: Some(stderr.to_string()),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn download_call(&self) -> Option<Vec<String>> {
        self.calls()
            .into_iter()
            .find(|args| args.iter().any(|a| a == "-o"))
    }
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        stdout: stdout.into(),
        stderr: String::new(),
        exit_code: Some(0),
    }
}

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[async_trait]
impl ToolRunner for FakeYtDlp {
    async fn run(&self, _program: &Path, args: &[String]) -> Result<CommandOutput, DownloadError> {
        self.calls.lock().unwrap().push(args.to_vec());

        if let Some(stderr) = &self.failure {
            return Ok(CommandOutput {
                stdout: String::new(),
                stderr: stderr.clone(),
                exit_code: Some(1),
            });
        }
        if args.len() == 1 && args[0].ends_with("version") {
            return Ok(ok("2024.08.06\n"));
        }
        if args.iter().any(|a| a == "--dump-json") {
            return Ok(ok(metadata_json()));
        }
        if args.iter().any(|a| a == "--print") {
            return Ok(ok("Never Gonna Give You Up (Official Video)\n"));
        }

        let template = value_after(args, "-o").expect("download run without -o");
        let ext = if args.iter().any(|a| a == "-x") { "mp3" } else { "mp4" };

        if self.hang_after_partial {
            std::fs::write(template.replace("%(ext)s", "f137.mp4.part"), b"partial").unwrap();
            std::future::pending::<()>().await;
        }
        if self.partial_then_fail {
            std::fs::write(template.replace("%(ext)s", "f137.mp4.part"), b"partial").unwrap();
            return Ok(CommandOutput {
                stdout: String::new(),
                stderr: "ERROR: unable to download video data: HTTP Error 403: Forbidden".to_string(),
                exit_code: Some(1),
            });
        }
        if !self.skip_output {
            std::fs::write(template.replace("%(ext)s", ext), PAYLOAD).unwrap();
        }
        Ok(ok(""))
    }
}

struct Harness {
    app: Router,
    runner: Arc<FakeYtDlp>,
    tmp: tempfile::TempDir,
}

impl Harness {
    fn new(runner: FakeYtDlp) -> Self {
        Self::with_cookies(runner, None)
    }

    fn with_cookies(runner: FakeYtDlp, cookies: Option<&str>) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        let cookies = cookies.map(str::to_string);
        let config = ServerConfig::from_lookup(|name| match name {
            "APP_ROOT" => Some(root.display().to_string()),
            "DOWNLOAD_TMP_DIR" => Some(root.join("tmp").display().to_string()),
            "YOUTUBE_COOKIES" => cookies.clone(),
            _ => None,
        })
        .unwrap();

        let runner = Arc::new(runner);
        let downloader = Downloader::new(&config).with_runner(runner.clone());
        Self {
            app: router(AppState::new(downloader)),
            runner,
            tmp,
        }
    }

    fn temp_dir(&self) -> PathBuf {
        self.tmp.path().join("tmp")
    }

    fn leftovers(&self) -> Vec<String> {
        match std::fs::read_dir(self.temp_dir()) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn get(&self, uri: &str) -> axum::response::Response {
        self.app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

fn encode(url: &str) -> String {
    urlencoding::encode(url).into_owned()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let h = Harness::new(FakeYtDlp::default());
    let response = h.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn tools_reports_both_binaries() {
    let h = Harness::new(FakeYtDlp::default());
    let response = h.get("/tools").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let tools = body.as_array().unwrap();
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0]["name"], "yt-dlp");
    assert_eq!(tools[1]["name"], "ffmpeg");
    assert_eq!(tools[0]["version"], "2024.08.06");
    assert_eq!(tools[1]["isAvailable"], true);
}

#[tokio::test]
async fn metadata_returns_negotiated_variants() {
    let h = Harness::new(FakeYtDlp::default());
    let response = h.get(&format!("/metadata?url={}", encode(VIDEO_URL))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["title"], "Never Gonna Give You Up");
    assert_eq!(body["duration"], "3:32");

    let formats = body["formats"].as_array().unwrap();
    let ids: Vec<&str> = formats.iter().map(|f| f["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["22", "18", "251", "audio-best"]);

    let labels: Vec<&str> = formats
        .iter()
        .map(|f| f["qualityLabel"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["720p", "360p", "Audio (MP3)", "Best Audio (MP3)"]);

    // Muxed 720p beat the larger silent one
    assert_eq!(formats[0]["hasAudio"], true);
    assert_eq!(formats[0]["contentLength"], 3000);
    assert_eq!(formats[3]["contentLength"], 500);
    assert_eq!(formats[3]["container"], "mp3");
}

#[tokio::test]
async fn metadata_without_url_is_400() {
    let h = Harness::new(FakeYtDlp::default());
    for uri in ["/metadata", "/metadata?url=", "/download", "/download?url=%20"] {
        let response = h.get(uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn option_like_url_is_rejected() {
    let h = Harness::new(FakeYtDlp::default());
    let response = h.get("/metadata?url=--exec%3Dtouch%20x").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn bot_check_is_429_with_credential_flag() {
    let h = Harness::new(FakeYtDlp::failing(
        "ERROR: [youtube] dQw4w9WgXcQ: Sign in to confirm you're not a bot",
    ));

    for uri in [
        format!("/metadata?url={}", encode(VIDEO_URL)),
        format!("/download?url={}&title=x", encode(VIDEO_URL)),
    ] {
        let response = h.get(&uri).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = json_body(response).await;
        assert_eq!(body["requiresCredential"], true);
        assert_eq!(body["reason"], "sign_in_required");
    }
}

#[tokio::test]
async fn generic_failure_is_500_without_flag() {
    let h = Harness::new(FakeYtDlp::failing("ERROR: [youtube] abc: Video unavailable"));
    let response = h.get(&format!("/metadata?url={}", encode(VIDEO_URL))).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body.get("requiresCredential").is_none());
    assert_eq!(body["reason"], "video_unavailable");
    assert!(body["details"].as_str().unwrap().contains("Video unavailable"));
}

#[tokio::test]
async fn video_download_streams_file_then_deletes_it() {
    let h = Harness::new(FakeYtDlp::default());
    let response = h
        .get(&format!("/download?url={}&variant=22", encode(VIDEO_URL)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(
        headers[header::CONTENT_LENGTH],
        PAYLOAD.len().to_string().as_str()
    );
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename*=UTF-8''Never%20Gonna%20Give%20You%20Up%20Official%20Video.mp4"
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], PAYLOAD);
    assert!(h.leftovers().is_empty(), "left: {:?}", h.leftovers());

    let args = h.runner.download_call().unwrap();
    assert_eq!(value_after(&args, "-f"), Some("22+bestaudio/best"));
    assert_eq!(value_after(&args, "--merge-output-format"), Some("mp4"));
}

#[tokio::test]
async fn itag_alias_selects_audio_mode() {
    let h = Harness::new(FakeYtDlp::default());
    let response = h
        .get(&format!("/download?url={}&itag=140&title=My%20Song", encode(VIDEO_URL)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename*=UTF-8''My%20Song.mp3"
    );
    let _ = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    // A supplied title skips the title lookup
    assert!(!h.runner.calls().iter().any(|c| c.contains(&"--print".to_string())));
    let args = h.runner.download_call().unwrap();
    assert!(args.contains(&"-x".to_string()));
    assert!(!args.contains(&"-f".to_string()));
    assert!(h.leftovers().is_empty());
}

#[tokio::test]
async fn dropping_the_response_deletes_the_file() {
    let h = Harness::new(FakeYtDlp::default());
    let response = h
        .get(&format!("/download?url={}&variant=audio-best&title=x", encode(VIDEO_URL)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.leftovers().len(), 1);

    drop(response);
    assert!(h.leftovers().is_empty(), "left: {:?}", h.leftovers());
}

#[tokio::test]
async fn missing_output_is_500_and_leaves_nothing() {
    let h = Harness::new(FakeYtDlp {
        skip_output: true,
        ..Default::default()
    });
    let response = h
        .get(&format!("/download?url={}&variant=18&title=x", encode(VIDEO_URL)))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["details"].as_str().unwrap().contains("file not found"));
    assert!(h.leftovers().is_empty());
}

#[tokio::test]
async fn failed_download_sweeps_partial_artifacts() {
    let h = Harness::new(FakeYtDlp {
        partial_then_fail: true,
        ..Default::default()
    });
    let response = h
        .get(&format!("/download?url={}&variant=137&title=x", encode(VIDEO_URL)))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["reason"], "forbidden");
    assert!(h.leftovers().is_empty(), "left: {:?}", h.leftovers());
}

#[tokio::test]
async fn abandoned_download_sweeps_partial_artifacts() {
    let h = Harness::with_cookies(
        FakeYtDlp {
            hang_after_partial: true,
            ..Default::default()
        },
        Some(COOKIE_JAR),
    );
    let uri = format!("/download?url={}&variant=137&title=x", encode(VIDEO_URL));

    let outcome = tokio::time::timeout(Duration::from_millis(200), h.get(&uri)).await;

    assert!(outcome.is_err(), "download should still be running");
    assert!(h.runner.download_call().is_some());
    // Partial video and per-job cookie jar both went with the request
    assert!(h.leftovers().is_empty(), "left: {:?}", h.leftovers());
}

#[tokio::test]
async fn conflicting_query_parameters_are_a_json_400() {
    let h = Harness::new(FakeYtDlp::default());
    let response = h
        .get(&format!("/download?url={}&variant=22&itag=140", encode(VIDEO_URL)))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let body = json_body(response).await;
    assert_eq!(body["error"], "Invalid query string");
    assert!(body["details"].as_str().unwrap().contains("variant"));
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn no_cookies_flag_without_credential() {
    let h = Harness::new(FakeYtDlp::default());
    let _ = h.get(&format!("/metadata?url={}", encode(VIDEO_URL))).await;
    let response = h
        .get(&format!("/download?url={}&variant=22", encode(VIDEO_URL)))
        .await;
    let _ = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let calls = h.runner.calls();
    assert_eq!(calls.len(), 3);
    for args in calls {
        assert!(!args.contains(&"--cookies".to_string()));
    }
}

#[tokio::test]
async fn configured_cookies_are_passed_and_removed() {
    let h = Harness::with_cookies(FakeYtDlp::default(), Some(COOKIE_JAR));
    let response = h.get(&format!("/metadata?url={}", encode(VIDEO_URL))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let calls = h.runner.calls();
    let jar = value_after(&calls[0], "--cookies").expect("cookies flag");
    assert!(jar.starts_with(&h.temp_dir().display().to_string()));
    // Per-job jar is gone once the request finished
    assert!(!Path::new(jar).exists());
    assert!(h.leftovers().is_empty());
}
