// Fetch the latest yt-dlp release into <APP_ROOT>/bin

use std::process::ExitCode;

use ytdl_relay::downloader::tools::{install_ytdlp, release_asset};
use ytdl_relay::{telemetry, ServerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = telemetry::init_logging(config.log_format) {
        eprintln!("Failed to initialise logging: {}", e);
        return ExitCode::FAILURE;
    }

    let os = std::env::consts::OS;
    if release_asset(os).is_none() {
        // Not fatal: the server can still use a system-wide yt-dlp
        tracing::warn!(
            "[Install] No prebuilt yt-dlp for {}. Install it manually or set YTDLP_PATH.",
            os
        );
        return ExitCode::SUCCESS;
    }

    let bin_dir = config.app_root.join("bin");
    match install_ytdlp(&bin_dir, config.proxy.as_deref()).await {
        Ok(path) => {
            tracing::info!("[Install] yt-dlp installed at {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("[Install] Failed to install yt-dlp: {}", e);
            ExitCode::FAILURE
        }
    }
}
