//! Versioned file routes
//!
//! Endpoints:
//! - POST /upload - Store a new version (multipart: `identifier`, `file`)
//! - GET /files - List every version record
//! - GET /files/:identifier?version=N - Download a version (default 1)
//! - DELETE /files/:identifier?version=N - Delete a version (default 1)
//! - GET /files/:identifier/diff/:version - Diff `version` against `version + 1`

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::store::VersionRecord;

/// Create the files router
pub fn router(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/files", get(list_files))
        .route("/files/:identifier", get(download_file).delete(delete_version))
        .route("/files/:identifier/diff/:version", get(show_diff))
}

#[derive(Debug, Deserialize)]
struct VersionQuery {
    version: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /upload
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<VersionRecord>> {
    let mut identifier: Option<String> = None;
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "identifier" => identifier = Some(field.text().await?),
            "file" => {
                let filename = field.file_name().map(str::to_string);
                let data = field.bytes().await?;
                upload = Some((filename, data.to_vec()));
            }
            _ => {}
        }
    }

    let identifier = identifier
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("Identifier is required".to_string()))?;
    let (filename, data) =
        upload.ok_or_else(|| AppError::BadRequest("File is required".to_string()))?;
    let filename = filename
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| identifier.clone());

    let record = state
        .store()
        .ingest_from_bytes(&identifier, &filename, &data)
        .await?;

    Ok(Json(record))
}

/// GET /files
async fn list_files(State(state): State<AppState>) -> Json<Vec<VersionRecord>> {
    Json(state.store().list().await)
}

/// GET /files/:identifier?version=N
async fn download_file(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Response> {
    let version = parse_version(query.version.as_deref())?;
    let file = state.store().read_version(&identifier, version).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, file.data.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", header_safe(&file.filename)),
        )
        .body(Body::from(file.data))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// DELETE /files/:identifier?version=N
async fn delete_version(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<VersionRecord>> {
    let version = parse_version(query.version.as_deref())?;
    let removed = state.store().remove(&identifier, version).await?;
    Ok(Json(removed))
}

/// GET /files/:identifier/diff/:version
async fn show_diff(
    State(state): State<AppState>,
    Path((identifier, version)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let base = parse_version(Some(&version))?;
    let report = state.store().diff(&identifier, base).await?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        report.text,
    ))
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse a version number, defaulting to 1 when absent
fn parse_version(raw: Option<&str>) -> Result<u32> {
    let Some(raw) = raw else {
        return Ok(1);
    };
    match raw.parse::<u32>() {
        Ok(version) if version > 0 => Ok(version),
        _ => Err(AppError::BadRequest(format!("Invalid version: '{}'", raw))),
    }
}

/// Make a filename safe to quote inside a header value
fn header_safe(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}
