use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};

use crate::progress::ProgressStore;

/// passive tap that reports body chunk sizes to the progress store.
///
/// chunks pass through unchanged; the counter only observes their length.
/// the total size lives on the progress record, fixed when it was created.
#[derive(Clone)]
pub struct ByteCounter {
    store: ProgressStore,
    upload_id: String,
}

impl ByteCounter {
    pub fn new(store: ProgressStore, upload_id: impl Into<String>) -> Self {
        Self {
            store,
            upload_id: upload_id.into(),
        }
    }

    /// record one received chunk of `len` bytes
    pub fn observe(&self, len: usize) {
        self.store.update(&self.upload_id, len as u64);
    }

    /// wrap `inner` so every successful chunk is counted before it is yielded
    pub fn tap<S, E>(self, inner: S) -> impl Stream<Item = Result<Bytes, E>> + Send + 'static
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Send + 'static,
    {
        inner.inspect_ok(move |chunk| self.observe(chunk.len()))
    }
}
