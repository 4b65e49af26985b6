//! API handlers for the pdfpress server
//!
//! Provides REST endpoints for:
//! - PDF merging (multipart file list)
//! - PDF compression (single file + quality or level)
//! - Health checks
//! - Static frontend delivery with a backend-only fallback

use std::path::Path;

use axum::{
    body::Body,
    extract::{Multipart, State},
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use pdfpress_core::{
    compress_file, is_pdf_filename, merge_documents, resolve_level, resolve_quality,
    CompressOptions, NamedDocument,
};

use crate::error::ApiError;
use crate::AppState;

/// Quality applied when the request names neither a quality nor a level.
const DEFAULT_QUALITY: u8 = 85;

// Metadata headers exposed to browser scripts through CORS.
pub const HEADER_ORIGINAL_SIZE: &str = "x-original-size";
pub const HEADER_COMPRESSED_SIZE: &str = "x-compressed-size";
pub const HEADER_REDUCTION: &str = "x-reduction-percentage";
pub const HEADER_QUALITY: &str = "x-quality-setting";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

/// Handler: GET /api/health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Handler: POST /api/pdf/merge
///
/// Accepts a multipart list of `files` entries (at least 2), appends their
/// pages in input order and streams back the merged document as an
/// attachment. Every filename is checked for a `.pdf` suffix before its
/// bytes are read; nothing touches the workspace until the merge succeeded.
pub async fn handle_merge(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut documents = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        if !is_pdf_filename(&filename) {
            return Err(ApiError::InvalidInput(format!("{} is not a PDF", filename)));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(format!("Failed to read {}: {}", filename, e)))?;
        documents.push(NamedDocument {
            filename,
            bytes: bytes.to_vec(),
        });
    }

    info!("Merge request: {} files", documents.len());
    let merged = merge_documents(documents)?;

    let artifact = state.workspace.unique_path("merged", "pdf");
    tokio::fs::write(&artifact, &merged)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to write merged output: {}", e)))?;
    let download_name = file_name_of(&artifact);

    info!("Merge complete: {} ({} bytes)", download_name, merged.len());
    attachment_response(merged, &download_name, &[])
}

/// Handler: POST /api/pdf/compress
///
/// Accepts one multipart `file` plus an optional `quality` (1-100) or
/// `level` (0-3) field; `level` wins when both are present. Parameters are
/// validated and the tool located before anything is written to disk.
pub async fn handle_compress(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut upload: Option<NamedDocument> = None;
    let mut quality_field: Option<String> = None;
    let mut level_field: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                if !is_pdf_filename(&filename) {
                    return Err(ApiError::InvalidInput(format!(
                        "{} is not a PDF",
                        filename
                    )));
                }
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::Validation(format!("Failed to read {}: {}", filename, e))
                })?;
                upload = Some(NamedDocument {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            Some("quality") => quality_field = field_text(field).await?,
            Some("level") => level_field = field_text(field).await?,
            _ => {}
        }
    }

    let upload = upload
        .ok_or_else(|| ApiError::Validation("A PDF file is required for compression".into()))?;

    let (preset, quality_setting) = match (level_field, quality_field) {
        (Some(level), _) => {
            let level: u8 = level.trim().parse().map_err(|_| {
                ApiError::Validation(format!("Level must be 0, 1, 2 or 3, got '{}'", level))
            })?;
            (resolve_level(level)?, format!("level={}", level))
        }
        (None, Some(quality)) => {
            let quality: u8 = quality.trim().parse().map_err(|_| {
                ApiError::Validation(format!(
                    "Quality must be between 1 and 100, got '{}'",
                    quality
                ))
            })?;
            (resolve_quality(quality)?, format!("quality={}", quality))
        }
        (None, None) => (
            resolve_quality(DEFAULT_QUALITY)?,
            format!("quality={}", DEFAULT_QUALITY),
        ),
    };

    // Locate the tool before any file lands on disk.
    if !state.tool.is_available() {
        return Err(ApiError::ToolUnavailable(format!(
            "'{}' was not found on the search path. Install Ghostscript \
             (e.g. `apt-get install ghostscript`) or pass --gs-binary",
            pdfpress_core::Ghostscript::DEFAULT_BINARY
        )));
    }

    info!(
        "Compress request: {} ({} bytes, {})",
        upload.filename,
        upload.bytes.len(),
        quality_setting
    );

    let input_path = state.workspace.unique_path("upload", "pdf");
    tokio::fs::write(&input_path, &upload.bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to persist upload: {}", e)))?;

    let opts = CompressOptions {
        preset,
        timeout: state.tool_timeout,
        min_reduction_pct: state.min_reduction_pct,
    };
    let outcome = compress_file(state.tool.as_ref(), &state.workspace, &input_path, &opts).await?;

    info!(
        "Compress complete: {} -> {} bytes ({:.2}% reduction, {} preset)",
        outcome.original_size, outcome.compressed_size, outcome.reduction_pct, outcome.preset_name
    );

    let body = tokio::fs::read(&outcome.output_path)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to read compressed output: {}", e)))?;
    let download_name = file_name_of(&outcome.output_path);

    attachment_response(
        body,
        &download_name,
        &[
            (HEADER_ORIGINAL_SIZE, outcome.original_size.to_string()),
            (HEADER_COMPRESSED_SIZE, outcome.compressed_size.to_string()),
            (HEADER_REDUCTION, format!("{:.2}", outcome.reduction_pct)),
            (HEADER_QUALITY, quality_setting),
        ],
    )
}

/// Handler: GET fallback for every unrouted path
///
/// Serves the requested static asset when the frontend build is present,
/// the SPA index for client-side routes, and a JSON notice otherwise.
pub async fn serve_frontend(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(serde_json::json!({ "error": "Method not allowed" })),
        )
            .into_response();
    }

    let Some(root) = &state.static_root else {
        return backend_only();
    };

    let rel = uri.path().trim_start_matches('/');
    if !rel.is_empty() && !rel.contains("..") {
        let candidate = root.join(rel);
        if candidate.is_file() {
            if let Ok(bytes) = tokio::fs::read(&candidate).await {
                debug!("Serving static asset {}", candidate.display());
                return asset_response(&candidate, bytes);
            }
        }
    }

    let index = root.join("index.html");
    match tokio::fs::read(&index).await {
        Ok(bytes) => asset_response(&index, bytes),
        Err(_) => backend_only(),
    }
}

/// JSON notice returned when no frontend build is available.
fn backend_only() -> Response {
    Json(serde_json::json!({
        "message": "Frontend build not found. Please ensure the frontend has been built.",
        "status": "backend-only mode",
    }))
    .into_response()
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<Option<String>, ApiError> {
    let text = field
        .text()
        .await
        .map_err(|e| ApiError::Validation(format!("Malformed form field: {}", e)))?;
    Ok(Some(text))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.pdf".to_string())
}

/// Build a PDF attachment response with optional metadata headers.
fn attachment_response(
    body: Vec<u8>,
    filename: &str,
    extra_headers: &[(&str, String)],
) -> Result<Response, ApiError> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", filename),
        );
    for (name, value) in extra_headers {
        builder = builder.header(*name, value.as_str());
    }
    builder
        .body(Body::from(body))
        .map_err(|e| ApiError::Internal(format!("Failed to build response: {}", e)))
}

/// Content type for a static asset, keyed by extension.
fn asset_response(path: &Path, bytes: Vec<u8>) -> Response {
    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("json") | Some("map") => "application/json",
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("woff2") => "font/woff2",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    };
    ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
}
