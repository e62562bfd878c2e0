//! Server configuration read from the environment.
//!
//! | Variable            | Meaning                                          |
//! |---------------------|--------------------------------------------------|
//! | `YOUTUBE_COOKIES`   | Netscape cookie-jar text passed to yt-dlp        |
//! | `BIND_ADDR`         | Listen address, e.g. `127.0.0.1:3000`            |
//! | `PORT`              | Listen on `0.0.0.0:<PORT>` when no `BIND_ADDR`   |
//! | `APP_ROOT`          | Root for `bin/` and `vendor/` tool lookups       |
//! | `DOWNLOAD_TMP_DIR`  | Where downloads and cookie files are written     |
//! | `YTDLP_PATH`        | Explicit yt-dlp binary                           |
//! | `FFMPEG_PATH`       | Explicit ffmpeg binary                           |
//! | `YTDLP_PROXY`       | Proxy URL forwarded with `--proxy`               |
//! | `TOOL_TIMEOUT_SECS` | Kill tool runs after this many seconds           |
//! | `LOG_FORMAT`        | `json` or `pretty`                               |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::downloader::cookies::Credential;
use crate::telemetry::LogFormat;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: `{value}` ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub app_root: PathBuf,
    pub temp_dir: PathBuf,
    pub cookies: Option<Credential>,
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub proxy: Option<String>,
    /// `None` means tool runs are never killed for taking too long
    pub tool_timeout: Option<Duration>,
    pub log_format: LogFormat,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any name → value source; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let bind_addr = resolve_bind_addr(get("BIND_ADDR"), get("PORT"))?;

        let app_root = get("APP_ROOT")
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let temp_dir = get("DOWNLOAD_TMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| app_root.join("tmp"));

        let tool_timeout = match get("TOOL_TIMEOUT_SECS") {
            Some(raw) => {
                let seconds: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::InvalidValue {
                        name: "TOOL_TIMEOUT_SECS",
                        value: raw.clone(),
                        reason: e.to_string(),
                    }
                })?;
                // 0 disables the deadline
                (seconds > 0).then(|| Duration::from_secs(seconds))
            }
            None => None,
        };

        let log_format = match get("LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().map_err(|reason| ConfigError::InvalidValue {
                name: "LOG_FORMAT",
                value: raw.clone(),
                reason,
            })?,
            None => LogFormat::infer(),
        };

        Ok(Self {
            bind_addr,
            app_root,
            temp_dir,
            cookies: Credential::from_config(lookup("YOUTUBE_COOKIES")),
            ytdlp_path: get("YTDLP_PATH").map(PathBuf::from),
            ffmpeg_path: get("FFMPEG_PATH").map(PathBuf::from),
            proxy: get("YTDLP_PROXY").map(|p| p.trim().to_string()),
            tool_timeout,
            log_format,
        })
    }
}

fn resolve_bind_addr(
    bind_addr: Option<String>,
    port: Option<String>,
) -> Result<SocketAddr, ConfigError> {
    if let Some(raw) = bind_addr {
        return raw.trim().parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidValue {
                name: "BIND_ADDR",
                value: raw.clone(),
                reason: e.to_string(),
            }
        });
    }

    if let Some(raw) = port {
        let port: u16 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
            ConfigError::InvalidValue {
                name: "PORT",
                value: raw.clone(),
                reason: e.to_string(),
            }
        })?;
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }

    DEFAULT_BIND_ADDR
        .parse()
        .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
            name: "BIND_ADDR",
            value: DEFAULT_BIND_ADDR.to_string(),
            reason: e.to_string(),
        })
}
