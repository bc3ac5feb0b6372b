//! HTTP surface for docmeta.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /metadata` – Upload a document as the raw request body and receive its metadata
//!   record. `Content-Type` declares the media type (`application/pdf`, the DOCX MIME, or
//!   `text/plain`); the optional `X-File-Name` header names the file (defaults to `upload`).
//!   When the content type is missing or `application/octet-stream`, the file name extension
//!   decides. Returns `422` with `{ "error": ... }` when no text could be extracted.
//! - `GET /metrics` – Observe pipeline counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::config::{CONFIG, Config};
use crate::document::{Document, MediaType};
use crate::metrics::MetricsSnapshot;
use crate::processing::{MetadataApi, MetadataError, MetadataRecord};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

/// Header carrying the original file name of an upload.
pub const FILE_NAME_HEADER: &str = "x-file-name";

const DEFAULT_FILE_NAME: &str = "upload";

/// Build the HTTP router, limiting uploads to `MAX_UPLOAD_BYTES`.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: MetadataApi + 'static,
{
    let limit = CONFIG
        .get()
        .map_or_else(|| Config::default().max_upload_bytes, |config| config.max_upload_bytes);
    create_router_with_limit(service, limit)
}

/// Build the HTTP router with an explicit upload limit in bytes.
pub fn create_router_with_limit<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: MetadataApi + 'static,
{
    Router::new()
        .route(
            "/metadata",
            post(create_metadata::<S>).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Resolve the declared media type, falling back to the file name extension for generic
/// or missing content types.
fn resolve_media_type(headers: &HeaderMap, file_name: &str) -> MediaType {
    let declared = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(MediaType::from_mime);

    match declared {
        Some(MediaType::Other(mime)) if is_generic(&mime) => {
            from_file_name(file_name).unwrap_or(MediaType::Other(mime))
        }
        Some(media_type) => media_type,
        None => from_file_name(file_name).unwrap_or_else(|| MediaType::Other(String::new())),
    }
}

fn is_generic(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    essence.is_empty() || essence.eq_ignore_ascii_case("application/octet-stream")
}

fn from_file_name(file_name: &str) -> Option<MediaType> {
    Path::new(file_name)
        .extension()
        .and_then(|extension| extension.to_str())
        .and_then(MediaType::from_extension)
}

/// Build metadata for the uploaded document.
async fn create_metadata<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MetadataRecord>, AppError>
where
    S: MetadataApi,
{
    let file_name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_FILE_NAME)
        .to_string();
    let media_type = resolve_media_type(&headers, &file_name);
    tracing::info!(file = %file_name, media_type = %media_type, bytes = body.len(), "Metadata request received");

    let document = Document::new(file_name, media_type, body.to_vec());
    let record = service.build_metadata(document).await?;
    Ok(Json(record))
}

/// Return the pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: MetadataApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "metadata",
                method: "POST",
                path: "/metadata",
                description: "Upload a PDF, DOCX, or plain-text document as the raw body and receive { fileInfo, extractedContent, generatedMetadata, processingStats }. Scanned PDFs are OCR'd automatically.",
                headers: Some(json!({
                    "Content-Type": "application/pdf",
                    "X-File-Name": "report.pdf"
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return pipeline counters: documents processed, extraction failures, OCR fallbacks, degraded summaries.",
                headers: None,
            },
        ],
    })
}

struct AppError(MetadataError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            MetadataError::ExtractionFailure => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<MetadataError> for AppError {
    fn from(inner: MetadataError) -> Self {
        Self(inner)
    }
}
