use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tempfile::TempPath;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::models::FileInfo;
use crate::utils::sanitize_filename;

/// body chunks of a single file field, in arrival order
pub type ChunkStream<'a> = BoxStream<'a, Result<Bytes, SinkError>>;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// the request body ended abnormally (client abort, malformed multipart)
    #[error("{0}")]
    Body(String),

    #[error("stored name already taken: {0}")]
    NameTaken(String),
}

/// a fully received file that is not yet durable.
///
/// the staging file is deleted when this is dropped without being committed,
/// which covers handlers cancelled by a client disconnect.
#[derive(Debug)]
pub struct PendingFile {
    pub stored_name: String,
    pub size: u64,
    pub sha256: String,
    pub staging: TempPath,
}

/// a file that is durably stored under `stored_name`
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub stored_name: String,
    pub size: u64,
    pub sha256: String,
}

/// byte sink that persists uploaded streams
#[async_trait]
pub trait FileSink: Send + Sync {
    /// consume `chunks` into staging storage
    async fn write(&self, original_name: &str, chunks: ChunkStream<'_>) -> Result<PendingFile, SinkError>;

    /// make a staged file durable and visible under its stored name
    async fn commit(&self, pending: PendingFile) -> Result<StoredFile, SinkError>;

    /// throw away a staged file
    async fn discard(&self, pending: PendingFile);

    /// enumerate stored files
    async fn list(&self) -> Result<Vec<FileInfo>, SinkError>;
}

/// server-generated name: `<unix millis>-<12 random hex>-<sanitized original>`
pub fn generate_stored_name(original_name: &str) -> String {
    let mut sanitized = sanitize_filename(original_name);
    if sanitized.is_empty() {
        sanitized = "upload".to_string();
    }
    let token = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        chrono::Utc::now().timestamp_millis(),
        &token[..12],
        sanitized
    )
}

/// sink that stores files in a local directory
pub struct DiskSink {
    files_dir: PathBuf,
}

impl DiskSink {
    pub fn new(files_dir: impl Into<PathBuf>) -> Self {
        Self {
            files_dir: files_dir.into(),
        }
    }

    async fn stream_to(
        &self,
        mut file: fs::File,
        mut chunks: ChunkStream<'_>,
    ) -> Result<(u64, String), SinkError> {
        let mut hasher = Sha256::new();
        let mut size = 0u64;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;

        Ok((size, hex::encode(hasher.finalize())))
    }
}

#[async_trait]
impl FileSink for DiskSink {
    async fn write(&self, original_name: &str, chunks: ChunkStream<'_>) -> Result<PendingFile, SinkError> {
        let stored_name = generate_stored_name(original_name);
        let staging_path = self.files_dir.join(format!(".{}.part", stored_name));
        tracing::trace!("Staging {} at {:?}", original_name, staging_path);

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging_path)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create staging file for {}: {}", stored_name, e);
                e
            })?;
        // from here on the staging file goes away with `staging` unless committed
        let staging = TempPath::from_path(staging_path);

        match self.stream_to(file, chunks).await {
            Ok((size, sha256)) => {
                tracing::debug!("Staged {} ({} bytes)", stored_name, size);
                Ok(PendingFile {
                    stored_name,
                    size,
                    sha256,
                    staging,
                })
            }
            Err(e) => {
                tracing::error!("Failed to stage {}: {}", stored_name, e);
                Err(e)
            }
        }
    }

    async fn commit(&self, pending: PendingFile) -> Result<StoredFile, SinkError> {
        let PendingFile {
            stored_name,
            size,
            sha256,
            staging,
        } = pending;
        let final_path = self.files_dir.join(&stored_name);

        let synced = async { fs::File::open(&staging).await?.sync_all().await }.await;
        if let Err(e) = synced {
            tracing::error!("Failed to sync {}: {}", stored_name, e);
            return Err(e.into());
        }

        // the rename refuses to replace an existing file; on failure the
        // returned path still owns the staging file and removes it on drop
        if let Err(e) = staging.persist_noclobber(&final_path) {
            tracing::error!("Failed to persist {}: {}", stored_name, e.error);
            return Err(match e.error.kind() {
                ErrorKind::AlreadyExists => SinkError::NameTaken(stored_name),
                _ => SinkError::Io(e.error),
            });
        }

        Ok(StoredFile {
            stored_name,
            size,
            sha256,
        })
    }

    async fn discard(&self, pending: PendingFile) {
        match pending.staging.close() {
            Ok(()) => tracing::debug!("Discarded staged file {}", pending.stored_name),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to discard {}: {}", pending.stored_name, e),
        }
    }

    async fn list(&self) -> Result<Vec<FileInfo>, SinkError> {
        tracing::debug!("Listing files in directory: {:?}", self.files_dir);
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.files_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            // staging files and other hidden entries
            if name.starts_with('.') {
                continue;
            }

            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }

            // birth time is not available on every filesystem
            let created = metadata
                .created()
                .or_else(|_| metadata.modified())
                .ok()
                .map(chrono::DateTime::<chrono::Utc>::from);

            tracing::trace!("Found file: {} ({} bytes)", name, metadata.len());
            files.push(FileInfo {
                name,
                size: metadata.len(),
                created,
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunks(parts: &[&str]) -> ChunkStream<'static> {
        let items: Vec<Result<Bytes, SinkError>> =
            parts.iter().map(|p| Ok(Bytes::from(p.to_string()))).collect();
        stream::iter(items).boxed()
    }

    #[test]
    fn test_stored_name_keeps_sanitized_original() {
        let name = generate_stored_name("../report.pdf");
        assert!(name.ends_with("-report.pdf"));
        assert_ne!(name, "report.pdf");
        assert_ne!(name, generate_stored_name("../report.pdf"));
    }

    #[test]
    fn test_stored_name_for_empty_original() {
        assert!(generate_stored_name("///").ends_with("-upload"));
    }

    #[tokio::test]
    async fn test_write_commit_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiskSink::new(dir.path());

        let pending = sink
            .write("hello.txt", chunks(&["hello ", "world"]))
            .await
            .unwrap();
        assert_eq!(pending.size, 11);
        assert!(pending.staging.exists());

        // staged files are not listed
        assert!(sink.list().await.unwrap().is_empty());

        let stored = sink.commit(pending).await.unwrap();
        let content = std::fs::read_to_string(dir.path().join(&stored.stored_name)).unwrap();
        assert_eq!(content, "hello world");
        assert_eq!(
            stored.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );

        let listed = sink.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, stored.stored_name);
        assert_eq!(listed[0].size, 11);
    }

    #[tokio::test]
    async fn test_body_error_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiskSink::new(dir.path());

        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(SinkError::Body("connection reset".to_string())),
        ])
        .boxed();

        let err = sink.write("broken.bin", failing).await.unwrap_err();
        assert!(matches!(err, SinkError::Body(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_discard_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiskSink::new(dir.path());

        let pending = sink.write("a.bin", chunks(&["abc"])).await.unwrap();
        let staging = pending.staging.to_path_buf();
        sink.discard(pending).await;
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_dropped_pending_file_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiskSink::new(dir.path());

        let pending = sink.write("a.bin", chunks(&["abc"])).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        drop(pending);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_write_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiskSink::new(dir.path());

        // one chunk, then a body that never finishes
        let stalled = stream::iter(vec![Ok(Bytes::from_static(b"first half"))])
            .chain(stream::pending::<Result<Bytes, SinkError>>())
            .boxed();

        let write = sink.write("stalled.bin", stalled);
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(100), write).await;
        assert!(timed_out.is_err());

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_commit_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiskSink::new(dir.path());

        let pending = sink.write("a.bin", chunks(&["new"])).await.unwrap();
        std::fs::write(dir.path().join(&pending.stored_name), "old").unwrap();

        let name = pending.stored_name.clone();
        let err = sink.commit(pending).await.unwrap_err();
        assert!(matches!(err, SinkError::NameTaken(_)));
        assert_eq!(std::fs::read_to_string(dir.path().join(&name)).unwrap(), "old");
        // only the pre-existing file is left
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiskSink::new(dir.path().join("missing"));

        let err = sink.write("a.bin", chunks(&["abc"])).await.unwrap_err();
        assert!(matches!(err, SinkError::Io(_)));
    }
}
