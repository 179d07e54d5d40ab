use axum::extract::Multipart;
use futures_util::{StreamExt, TryStreamExt};

use crate::counter::ByteCounter;
use crate::error::ApiError;
use crate::progress::ProgressStore;
use crate::sink::{FileSink, PendingFile, SinkError, StoredFile};

/// multipart field that carries the uploaded file
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Receiving,
    Persisting,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Receiving)
                | (Receiving, Persisting)
                | (Persisting, Completed)
                | (Created | Receiving | Persisting, Failed)
        )
    }
}

/// one upload request from first byte to durable file.
///
/// the session owns its progress record for its whole lifetime: the record is
/// created in [`UploadSession::start`], handed to the store's expiry timer on
/// success, and removed immediately on failure. dropping a session that has
/// not reached a terminal state (the client went away and the handler future
/// was cancelled) counts as a failure.
pub struct UploadSession {
    id: String,
    state: SessionState,
    store: ProgressStore,
}

impl UploadSession {
    /// register `id` in `store`; `None` if the id is already tracked
    pub fn start(store: ProgressStore, id: impl Into<String>, total_bytes: Option<u64>) -> Option<Self> {
        let id = id.into();
        if !store.create(&id, total_bytes) {
            return None;
        }
        Some(Self {
            id,
            state: SessionState::Created,
            store,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// a byte counter bound to this session's progress record
    pub fn counter(&self) -> ByteCounter {
        ByteCounter::new(self.store.clone(), self.id.clone())
    }

    /// move to `next`; out-of-order transitions are logged and ignored
    pub fn advance(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                "Upload {}: ignoring transition {:?} -> {:?}",
                self.id,
                self.state,
                next
            );
            return false;
        }
        tracing::trace!("Upload {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
        true
    }

    /// mark the stored file as done; its record expires after the store's delay
    pub fn complete(&mut self, stored: &StoredFile) -> bool {
        if !self.advance(SessionState::Completed) {
            return false;
        }
        self.store.complete(&self.id, &stored.stored_name)
    }

    /// every failure ends here: the record is released right away
    pub fn fail(&mut self, reason: &str) {
        if self.advance(SessionState::Failed) {
            tracing::warn!("Upload {} failed: {}", self.id, reason);
            self.store.expire(&self.id);
        }
    }

    /// receive the file field from `multipart`, persist it through `sink`
    /// and settle the session
    pub async fn run(mut self, mut multipart: Multipart, sink: &dyn FileSink) -> Result<StoredFile, ApiError> {
        let result = self.persist(&mut multipart, sink).await;
        match &result {
            Ok(stored) => {
                self.complete(stored);
            }
            Err(e) => self.fail(&e.to_string()),
        }
        result
    }

    async fn persist(&mut self, multipart: &mut Multipart, sink: &dyn FileSink) -> Result<StoredFile, ApiError> {
        let pending = self.receive(multipart, sink).await?;
        self.advance(SessionState::Persisting);
        Ok(sink.commit(pending).await?)
    }

    // drains the whole body so the counter sees every byte
    async fn receive(&mut self, multipart: &mut Multipart, sink: &dyn FileSink) -> Result<PendingFile, ApiError> {
        let mut pending: Option<PendingFile> = None;

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to read multipart field for upload {}: {}", self.id, e);
                    if let Some(staged) = pending.take() {
                        sink.discard(staged).await;
                    }
                    return Err(SinkError::Body(e.to_string()).into());
                }
            };

            if self.state == SessionState::Created {
                self.advance(SessionState::Receiving);
            }

            let is_file = field.name() == Some(FILE_FIELD) && field.file_name().is_some();
            if pending.is_some() || !is_file {
                tracing::trace!("Upload {}: skipping field {:?}", self.id, field.name());
                continue;
            }

            let original_name = field.file_name().unwrap_or_default().to_string();
            tracing::debug!("Upload {}: receiving file {}", self.id, original_name);

            let chunks = field.map_err(|e| SinkError::Body(e.to_string())).boxed();
            pending = Some(sink.write(&original_name, chunks).await?);
        }

        pending.ok_or(ApiError::MissingFile)
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.fail("request dropped before the upload finished");
        }
    }
}
