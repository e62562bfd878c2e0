// External tool discovery, status reporting and yt-dlp installation

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::errors::DownloadError;
use super::traits::ToolRunner;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version", // ffmpeg uses a single dash
        }
    }

    fn file_name(&self) -> String {
        format!("{}{}", self.as_str(), std::env::consts::EXE_SUFFIX)
    }
}

/// Which resolution strategy produced a path
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Explicit `YTDLP_PATH` / `FFMPEG_PATH`
    Override,
    /// `<app_root>/bin`
    Bundled,
    /// `<app_root>/vendor/<tool>`
    Vendored,
    /// Well-known install prefixes
    System,
    /// Bare command name, resolved through PATH at spawn time
    PathLookup,
}

/// Strategies in priority order
const STRATEGIES: [CandidateSource; 5] = [
    CandidateSource::Override,
    CandidateSource::Bundled,
    CandidateSource::Vendored,
    CandidateSource::System,
    CandidateSource::PathLookup,
];

/// A resolved executable; the first argument of a spawn call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPath {
    path: PathBuf,
    source: CandidateSource,
}

impl ToolPath {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> CandidateSource {
        self.source
    }
}

impl fmt::Display for ToolPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[derive(Debug, Clone)]
pub struct ToolLocator {
    app_root: PathBuf,
    system_dirs: Vec<PathBuf>,
    ytdlp_override: Option<PathBuf>,
    ffmpeg_override: Option<PathBuf>,
}

impl ToolLocator {
    pub fn new(app_root: impl Into<PathBuf>) -> Self {
        let mut system_dirs = vec![
            PathBuf::from("/opt/homebrew/bin"), // Homebrew on Apple Silicon
            PathBuf::from("/usr/local/bin"),    // Homebrew on Intel Mac, manual installs
            PathBuf::from("/usr/bin"),          // Distro packages
        ];
        if let Some(home) = dirs::home_dir() {
            system_dirs.push(home.join(".local").join("bin")); // pip --user
        }

        Self {
            app_root: app_root.into(),
            system_dirs,
            ytdlp_override: None,
            ffmpeg_override: None,
        }
    }

    pub fn with_override(mut self, tool: ToolType, path: Option<PathBuf>) -> Self {
        match tool {
            ToolType::YtDlp => self.ytdlp_override = path,
            ToolType::Ffmpeg => self.ffmpeg_override = path,
        }
        self
    }

    pub fn with_system_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.system_dirs = dirs;
        self
    }

    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    fn candidates(&self, source: CandidateSource, tool: ToolType) -> Vec<PathBuf> {
        let file_name = tool.file_name();
        match source {
            CandidateSource::Override => match tool {
                ToolType::YtDlp => self.ytdlp_override.iter().cloned().collect(),
                ToolType::Ffmpeg => self.ffmpeg_override.iter().cloned().collect(),
            },
            CandidateSource::Bundled => vec![self.app_root.join("bin").join(&file_name)],
            CandidateSource::Vendored => vec![self
                .app_root
                .join("vendor")
                .join(tool.as_str())
                .join(&file_name)],
            CandidateSource::System => self
                .system_dirs
                .iter()
                .map(|dir| dir.join(&file_name))
                .collect(),
            CandidateSource::PathLookup => vec![PathBuf::from(tool.as_str())],
        }
    }

    /// Resolve a tool. Never fails: the last strategy is the bare command name,
    /// so a missing binary only shows up when the executor tries to spawn it.
    pub fn locate(&self, tool: ToolType) -> ToolPath {
        STRATEGIES
            .iter()
            .flat_map(|&source| {
                self.candidates(source, tool)
                    .into_iter()
                    .map(move |path| (source, path))
            })
            .find(|(source, path)| *source == CandidateSource::PathLookup || is_executable(path))
            .map(|(source, path)| ToolPath { path, source })
            .unwrap_or_else(|| ToolPath {
                path: PathBuf::from(tool.as_str()),
                source: CandidateSource::PathLookup,
            })
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub path: String,
    pub source: CandidateSource,
    pub version: Option<String>,
    pub is_available: bool,
}

/// Resolve a tool and ask it for its version
pub async fn tool_info(locator: &ToolLocator, runner: &dyn ToolRunner, tool: ToolType) -> ToolInfo {
    let resolved = locator.locate(tool);
    let version = match runner
        .run(resolved.path(), &[tool.version_arg().to_string()])
        .await
    {
        Ok(output) if output.success() => output
            .stdout
            .lines()
            .next()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty()),
        Ok(output) => {
            tracing::warn!(
                "[Tools] {} exited with {:?}: {}",
                resolved,
                output.exit_code,
                output.stderr.trim()
            );
            None
        }
        Err(e) => {
            tracing::warn!("[Tools] {} unavailable: {}", resolved, e);
            None
        }
    };

    ToolInfo {
        name: tool.as_str().to_string(),
        tool_type: tool,
        path: resolved.to_string(),
        source: resolved.source(),
        is_available: version.is_some(),
        version,
    }
}

const RELEASE_BASE: &str = "https://github.com/yt-dlp/yt-dlp/releases/latest/download";

/// Release asset name for an OS family (`std::env::consts::OS`)
pub fn release_asset(os: &str) -> Option<&'static str> {
    match os {
        "linux" => Some("yt-dlp"),
        "macos" => Some("yt-dlp_macos"),
        _ => None,
    }
}

/// Download the latest yt-dlp release into `bin_dir/yt-dlp` and mark it executable
pub async fn install_ytdlp(bin_dir: &Path, proxy: Option<&str>) -> Result<PathBuf, DownloadError> {
    let os = std::env::consts::OS;
    let asset = release_asset(os).ok_or_else(|| DownloadError::UnsupportedPlatform(os.to_string()))?;
    let url = format!("{}/{}", RELEASE_BASE, asset);

    tokio::fs::create_dir_all(bin_dir)
        .await
        .map_err(|e| DownloadError::io(bin_dir, e))?;

    let mut builder = reqwest::Client::builder();
    if let Some(proxy_url) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }
    let client = builder.build()?;

    tracing::info!("[Install] Detected {}. Downloading {}", os, url);
    // Redirects to the release CDN are followed by the client
    let mut response = client.get(&url).send().await?.error_for_status()?;

    let target = bin_dir.join(ToolType::YtDlp.as_str());
    let partial = bin_dir.join("yt-dlp.part");
    let mut file = tokio::fs::File::create(&partial)
        .await
        .map_err(|e| DownloadError::io(&partial, e))?;

    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(&partial, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| DownloadError::io(&partial, e))?;
    drop(file);

    tokio::fs::rename(&partial, &target)
        .await
        .map_err(|e| DownloadError::io(&target, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| DownloadError::io(&target, e))?;
    }

    tracing::info!("[Install] ✓ {} bytes written to {}", written, target.display());
    Ok(target)
}
