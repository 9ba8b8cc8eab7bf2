//! HTTP surface: the upload endpoint, the multipart decoder, and the
//! response emitter.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use serde_json::json;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use graymill_core::{relay, RelayOutcome, UploadArtifact};

use crate::client::FilterClient;
use crate::config::ServerConfig;

/// Multipart field carrying the video payload.
const UPLOAD_FIELD: &str = "video";

/// Filename suggested to the browser for the processed download.
const DOWNLOAD_FILENAME: &str = "processed_video.mp4";

/// Per-request relay parameters, fixed at startup.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub chunk_size: usize,
    pub timeout: Option<Duration>,
    pub upload_dir: PathBuf,
}

impl RelaySettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            chunk_size: config.relay.chunk_size,
            timeout: config.relay.timeout(),
            upload_dir: config.upload.dir(),
        }
    }
}

/// Shared application state. Requests share the filter client's channel and
/// nothing else; each relay owns its call and accumulator exclusively.
#[derive(Clone)]
pub struct ApiState {
    pub client: FilterClient,
    pub relay: RelaySettings,
}

impl ApiState {
    pub fn new(client: FilterClient, relay: RelaySettings) -> Self {
        Self { client, relay }
    }
}

/// Build the router. Non-POST methods on the upload route get 405 from
/// axum's method routing; the body limit is lifted since uploads are
/// streamed to disk, not held in memory.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/process-video", post(process_video))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::disable())
        .with_state(Arc::new(state))
}

/// Health check endpoint
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "graymill",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// A fault decoding the multipart upload. Client-side; handled at the
/// boundary and never reaches the relay controller.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no '{UPLOAD_FIELD}' field in upload")]
    MissingField,

    #[error("malformed multipart upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to persist upload: {0}")]
    Persist(#[from] tempfile::PathPersistError),
}

/// Error responses for the upload endpoint.
///
/// Decode faults carry their concrete reason back to the client; relay
/// faults map to one generic 500 so transport internals stay out of the
/// response body. Full detail is logged where the failure is observed.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or missing upload (client fault).
    InvalidUpload(String),
    /// The relay failed after the upload was accepted.
    RelayFailed,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InvalidUpload(reason) => (StatusCode::BAD_REQUEST, reason),
            Self::RelayFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "video processing failed".to_string(),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// `POST /process-video`: decode the upload, relay it through the filter
/// service, emit the outcome, and reclaim the temp file on every path.
async fn process_video(State(state): State<Arc<ApiState>>, multipart: Multipart) -> Response {
    let artifact = match decode_upload(multipart, &state.relay.upload_dir).await {
        Ok(artifact) => artifact,
        Err(err) => {
            warn!(%err, "rejected upload");
            return ApiError::InvalidUpload(err.to_string()).into_response();
        }
    };
    info!(bytes = artifact.len(), "upload decoded, starting relay");

    // The response is fully built before the handler returns, so headers
    // are committed exactly once. A write fault past this point belongs to
    // the transport and can only be logged by it.
    let response = match run_relay(&state, &artifact).await {
        Ok(processed) => {
            info!(bytes = processed.len(), "relay complete");
            emit_success(processed)
        }
        Err(err) => {
            error!(stage = %err.stage(), %err, "relay failed");
            ApiError::RelayFailed.into_response()
        }
    };

    artifact.discard().await;
    response
}

/// Stream the upload's `video` field into a temp file and hand back the
/// artifact. Nothing here touches the filter service; a decode fault means
/// no RPC call is ever opened.
async fn decode_upload(
    mut multipart: Multipart,
    upload_dir: &Path,
) -> Result<UploadArtifact, DecodeError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let tmp = tempfile::Builder::new()
            .prefix("graymill-upload-")
            .suffix(".mp4")
            .tempfile_in(upload_dir)?;
        let mut out = tokio::fs::OpenOptions::new()
            .write(true)
            .open(tmp.path())
            .await?;

        let mut written = 0u64;
        while let Some(bytes) = field.chunk().await? {
            out.write_all(&bytes).await?;
            written += bytes.len() as u64;
        }
        out.flush().await?;

        // Disarm the temp file's auto-delete; deletion now belongs to the
        // artifact alone.
        let path = tmp.into_temp_path().keep()?;
        return Ok(UploadArtifact::new(path, written));
    }
    Err(DecodeError::MissingField)
}

/// One relay attempt: open the upload, open one duplex call, pump.
async fn run_relay(state: &ApiState, artifact: &UploadArtifact) -> RelayOutcome {
    let source = artifact.open(state.relay.chunk_size).await?;
    let duplex = state.client.open_duplex();
    relay(source, duplex, state.relay.timeout).await
}

/// Deliver the accumulated bytes as one attachment download.
fn emit_success(processed: Bytes) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{DOWNLOAD_FILENAME}\""),
            ),
        ],
        processed,
    )
        .into_response()
}
