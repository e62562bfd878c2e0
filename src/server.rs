//! HTTP surface: `/health`, `/tools`, `/metadata` and `/download`.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::downloader::diagnostics::{reason_for, BlockingReason};
use crate::downloader::{DownloadError, DownloadRequest, Downloader, MediaMetadata, ToolInfo};

#[derive(Clone)]
pub struct AppState {
    pub downloader: Arc<Downloader>,
}

impl AppState {
    pub fn new(downloader: Downloader) -> Self {
        Self {
            downloader: Arc::new(downloader),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tools", get(tools))
        .route("/metadata", get(metadata))
        .route("/download", get(download))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Bind and serve until the process is stopped
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let downloader = Downloader::new(&config);
    let has_credential = downloader.has_credential();
    let app = router(AppState::new(downloader));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind_addr,
            source,
        })?;

    tracing::info!("[Server] Listening on http://{}", config.bind_addr);
    tracing::info!("[Server] Temporary files in {}", config.temp_dir.display());
    if !has_credential {
        tracing::info!("[Server] YOUTUBE_COOKIES not set; requests run without cookies");
    }

    axum::serve(listener, app).await.map_err(ServerError::Serve)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<BlockingReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    requires_credential: Option<bool>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<String>,
    reason: Option<BlockingReason>,
    requires_credential: bool,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            details: None,
            reason: None,
            requires_credential: false,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// `summary` names the operation that failed
    fn from_download(summary: &str, error: DownloadError) -> Self {
        let reason = reason_for(&error);

        match error {
            DownloadError::InvalidUrl(message) => Self::bad_request(message),
            DownloadError::VerificationRequired { .. } => Self {
                status: StatusCode::TOO_MANY_REQUESTS,
                message: "Platform verification required (bot check / cookies)".to_string(),
                details: BlockingReason::SignInRequired.hint().map(str::to_string),
                reason,
                requires_credential: true,
            },
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: summary.to_string(),
                details: Some(other.to_string()),
                reason,
                requires_credential: false,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            details: self.details,
            reason: self.reason,
            requires_credential: self.requires_credential.then_some(true),
        });
        (self.status, body).into_response()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request("Invalid query string").with_details(rejection.body_text())
    }
}

/// `Query` whose rejection is rendered as the JSON error body
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[derive(Debug, Deserialize)]
pub struct MetadataQuery {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    url: Option<String>,
    #[serde(alias = "itag")]
    variant: Option<String>,
    title: Option<String>,
}

fn required_url(url: Option<String>) -> Result<String, ApiError> {
    url.filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("URL is required"))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn tools(State(state): State<AppState>) -> Json<Vec<ToolInfo>> {
    Json(state.downloader.tools_status().await)
}

async fn metadata(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<MetadataQuery>,
) -> Result<Json<MediaMetadata>, ApiError> {
    let url = required_url(query.url)?;

    state.downloader.negotiate(&url).await.map(Json).map_err(|e| {
        tracing::error!("[Metadata] {}", e);
        ApiError::from_download("Failed to fetch video info", e)
    })
}

async fn download(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<DownloadQuery>,
) -> Result<Response, ApiError> {
    let url = required_url(query.url)?;
    let request = DownloadRequest {
        url,
        variant: query.variant,
        title: query.title,
    };

    let prepared = state.downloader.download(request).await.map_err(|e| {
        tracing::error!("[Download] {}", e);
        ApiError::from_download("Download failed", e)
    })?;

    let disposition = HeaderValue::from_str(&prepared.content_disposition())
        .map_err(|e| ApiError::from_download("Download failed", DownloadError::Parse(e.to_string())))?;

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(prepared.content_type)),
        (header::CONTENT_DISPOSITION, disposition),
        (header::CONTENT_LENGTH, HeaderValue::from(prepared.content_length)),
    ];

    Ok((headers, Body::from_stream(prepared.body)).into_response())
}
