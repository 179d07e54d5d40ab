use axum::{
    body::Body,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::header,
    response::Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{FileInfo, UploadResponse};
use crate::progress::ProgressRecord;
use crate::session::UploadSession;
use crate::state::AppState;
use crate::utils::parse_content_length;

/// optional client-chosen upload id, lets the client poll while still sending
pub const UPLOAD_ID_HEADER: &str = "x-upload-id";

// upload a file via multipart form data, tracking progress as bytes arrive
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<UploadResponse>, ApiError> {
    tracing::debug!("Processing file upload request");
    let (parts, body) = request.into_parts();

    let total_bytes = parse_content_length(
        parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok()),
    );

    let upload_id = match parts.headers.get(UPLOAD_ID_HEADER) {
        Some(value) => {
            let raw = value.to_str().unwrap_or_default().trim();
            Uuid::parse_str(raw)
                .map_err(|_| {
                    tracing::warn!("Rejecting malformed upload id {:?}", raw);
                    ApiError::InvalidUploadId(raw.to_string())
                })?
                .to_string()
        }
        None => Uuid::new_v4().to_string(),
    };

    let mut session = UploadSession::start(state.progress.clone(), upload_id.clone(), total_bytes)
        .ok_or_else(|| ApiError::UploadIdInUse(upload_id.clone()))?;

    // count raw body bytes before multipart parsing sees them
    let counted = Body::from_stream(session.counter().tap(body.into_data_stream()));
    let multipart = match Multipart::from_request(Request::from_parts(parts, counted), &state).await {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::warn!("Upload request is not a multipart form: {}", rejection);
            session.fail("not a multipart request");
            return Err(ApiError::MissingFile);
        }
    };

    let stored = session.run(multipart, state.sink.as_ref()).await?;

    tracing::info!(
        "✅ Uploaded file: {} ({} bytes, upload {})",
        stored.stored_name,
        stored.size,
        upload_id
    );

    Ok(Json(UploadResponse {
        success: true,
        message: "File uploaded successfully".to_string(),
        filename: stored.stored_name,
        size: stored.size,
        sha256: stored.sha256,
        upload_id,
    }))
}

// current progress of an upload; never waits on the upload itself
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> Result<Json<ProgressRecord>, ApiError> {
    state.progress.get(&upload_id).map(Json).ok_or_else(|| {
        tracing::debug!("Progress requested for unknown upload {}", upload_id);
        ApiError::UploadNotFound
    })
}

// list all stored files as a bare array
pub async fn list_files(State(state): State<Arc<AppState>>) -> Result<Json<Vec<FileInfo>>, ApiError> {
    let files = state.sink.list().await.map_err(|e| {
        tracing::error!("Failed to list files: {}", e);
        e
    })?;

    tracing::debug!("Found {} files total", files.len());
    Ok(Json(files))
}

// health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "upload-progress",
        "trackedUploads": state.progress.len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
