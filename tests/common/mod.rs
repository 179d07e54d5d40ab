#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use upload_progress::models::FileInfo;
use upload_progress::progress::ProgressStore;
use upload_progress::sink::{ChunkStream, DiskSink, FileSink, PendingFile, SinkError, StoredFile};
use upload_progress::state::AppState;

pub const BOUNDARY: &str = "------------------------upload-progress-test";

pub fn content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

/// one part of a hand-built multipart body
pub enum Part<'a> {
    File { field: &'a str, filename: &'a str, data: &'a [u8] },
    Text { field: &'a str, value: &'a str },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File { field, filename, data } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        field, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { field, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", field, value).as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn state_with_sink(sink: Arc<dyn FileSink>, expiry: Duration) -> Arc<AppState> {
    Arc::new(AppState::new(ProgressStore::new(expiry), sink))
}

pub fn disk_state(dir: &std::path::Path) -> Arc<AppState> {
    state_with_sink(Arc::new(DiskSink::new(dir)), Duration::from_secs(300))
}

/// sink that drains the stream but fails to make it durable
#[derive(Default)]
pub struct FailingCommitSink {
    pub discarded: AtomicUsize,
}

#[async_trait]
impl FileSink for FailingCommitSink {
    async fn write(&self, original_name: &str, mut chunks: ChunkStream<'_>) -> Result<PendingFile, SinkError> {
        let mut size = 0u64;
        while let Some(chunk) = chunks.next().await {
            size += chunk?.len() as u64;
        }
        Ok(PendingFile {
            stored_name: format!("pending-{}", original_name),
            size,
            sha256: String::new(),
            staging: tempfile::NamedTempFile::new()?.into_temp_path(),
        })
    }

    async fn commit(&self, _pending: PendingFile) -> Result<StoredFile, SinkError> {
        Err(SinkError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    }

    async fn discard(&self, _pending: PendingFile) {
        self.discarded.fetch_add(1, Ordering::SeqCst);
    }

    async fn list(&self) -> Result<Vec<FileInfo>, SinkError> {
        Err(SinkError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "listing unavailable",
        )))
    }
}
