use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::ErrorResponse;
use crate::sink::SinkError;

/// errors surfaced to http clients
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No file provided")]
    MissingFile,

    #[error("Invalid upload id: {0}")]
    InvalidUploadId(String),

    #[error("Upload id already in use: {0}")]
    UploadIdInUse(String),

    #[error("Upload not found")]
    UploadNotFound,

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingFile => StatusCode::BAD_REQUEST,
            Self::InvalidUploadId(_) => StatusCode::BAD_REQUEST,
            Self::UploadIdInUse(_) => StatusCode::CONFLICT,
            Self::UploadNotFound => StatusCode::NOT_FOUND,
            Self::Sink(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
