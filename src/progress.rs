use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::AbortHandle;

/// lifecycle of a tracked upload as seen by pollers
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RecordState {
    InProgress,
    Complete,
}

/// progress of one in-flight or recently completed upload
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub upload_id: String,
    /// whole percent, `None` while the total size is unknown
    pub progress: Option<u8>,
    /// server-side stored name, set once the sink has persisted the file
    pub filename: Option<String>,
    pub bytes_received: u64,
    pub total_bytes: Option<u64>,
    pub state: RecordState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    fn new(upload_id: &str, total_bytes: Option<u64>) -> Self {
        // a declared length of zero gives nothing to divide by
        let total_bytes = total_bytes.filter(|t| *t > 0);
        Self {
            upload_id: upload_id.to_string(),
            progress: total_bytes.map(|_| 0),
            filename: None,
            bytes_received: 0,
            total_bytes,
            state: RecordState::InProgress,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    fn add_bytes(&mut self, delta: u64) {
        self.bytes_received = self.bytes_received.saturating_add(delta);
        if let Some(total) = self.total_bytes {
            let pct = (self.bytes_received as u128 * 100 / total as u128).min(100);
            self.progress = Some(pct as u8);
        }
    }
}

struct Inner {
    records: DashMap<String, ProgressRecord>,
    expiry_timers: DashMap<String, AbortHandle>,
    expiry: Duration,
}

impl Inner {
    // called by the expiry timer itself, so the timer is not aborted here
    fn evict(&self, id: &str) {
        self.expiry_timers.remove(id);
        if self.records.remove(id).is_some() {
            tracing::debug!("⌛ Expired progress record {}", id);
        }
    }
}

/// process-wide map of upload id -> progress record
///
/// every operation touches a single dashmap entry and never awaits while
/// holding it, so concurrent sessions and pollers only ever see whole updates.
/// cloning is cheap and shares the same underlying map.
#[derive(Clone)]
pub struct ProgressStore {
    inner: Arc<Inner>,
}

impl ProgressStore {
    /// create an empty store whose completed records live for `expiry`
    pub fn new(expiry: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                records: DashMap::new(),
                expiry_timers: DashMap::new(),
                expiry,
            }),
        }
    }

    pub fn expiry(&self) -> Duration {
        self.inner.expiry
    }

    /// start tracking `id`; returns false and leaves the existing record
    /// untouched if the id is already tracked
    pub fn create(&self, id: &str, total_bytes: Option<u64>) -> bool {
        match self.inner.records.entry(id.to_string()) {
            Entry::Occupied(_) => {
                tracing::warn!("Progress record {} already exists, not replacing it", id);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(ProgressRecord::new(id, total_bytes));
                tracing::debug!("📝 Tracking upload {} (total: {:?} bytes)", id, total_bytes);
                true
            }
        }
    }

    /// add `delta` received bytes to `id`; silently ignores unknown ids
    pub fn update(&self, id: &str, delta: u64) {
        if let Some(mut record) = self.inner.records.get_mut(id) {
            if record.state != RecordState::InProgress {
                tracing::trace!("Ignoring {} bytes for completed upload {}", delta, id);
                return;
            }
            record.add_bytes(delta);
            tracing::trace!(
                "Upload {}: {} bytes received ({:?}%)",
                id,
                record.bytes_received,
                record.progress
            );
        }
    }

    /// mark `id` complete with its stored name and schedule its expiry.
    /// returns false if the id is unknown or was already complete
    pub fn complete(&self, id: &str, stored_name: &str) -> bool {
        {
            let Some(mut record) = self.inner.records.get_mut(id) else {
                tracing::warn!("Cannot complete unknown upload {}", id);
                return false;
            };
            if record.state == RecordState::Complete {
                tracing::warn!("Upload {} already complete, ignoring", id);
                return false;
            }
            record.state = RecordState::Complete;
            // trailing multipart framing may never be polled off the wire
            if record.total_bytes.is_some() {
                record.progress = Some(100);
            }
            record.filename = Some(stored_name.to_string());
            record.completed_at = Some(Utc::now());
        }

        self.schedule_expiry(id);
        true
    }

    pub fn get(&self, id: &str) -> Option<ProgressRecord> {
        self.inner.records.get(id).map(|r| r.value().clone())
    }

    /// remove `id` now, cancelling its pending expiry timer if any
    pub fn expire(&self, id: &str) {
        if let Some((_, timer)) = self.inner.expiry_timers.remove(id) {
            timer.abort();
        }
        if self.inner.records.remove(id).is_some() {
            tracing::debug!("🧹 Removed progress record {}", id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    fn schedule_expiry(&self, id: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No runtime to schedule expiry of {}, removing it now", id);
            self.expire(id);
            return;
        };

        let inner = Arc::clone(&self.inner);
        let key = id.to_string();
        let delay = self.inner.expiry;
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            inner.evict(&key);
        });

        if let Some(previous) = self
            .inner
            .expiry_timers
            .insert(id.to_string(), task.abort_handle())
        {
            previous.abort();
        }
        // a zero delay can fire before the handle is registered
        if !self.inner.records.contains_key(id) {
            self.inner.expiry_timers.remove(id);
        }
        tracing::trace!("Scheduled expiry of {} in {:?}", id, delay);
    }
}
