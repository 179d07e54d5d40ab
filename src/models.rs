use chrono::{DateTime, Utc};
use serde::Serialize;

// information about a stored file
#[derive(Serialize, Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    /// creation time, or last modification where the filesystem has no birth time
    pub created: Option<DateTime<Utc>>,
}

// response for file upload endpoint
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub filename: String,
    pub size: u64,
    pub sha256: String,
    pub upload_id: String,
}

// generic error response
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}
