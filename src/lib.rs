pub mod config;
pub mod downloader;
pub mod server;
pub mod telemetry;

pub use config::ServerConfig;
pub use server::{router, AppState};
