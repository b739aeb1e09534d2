//! Debounced, batched synchronization with the remote document store.
//!
//! Writes never go out one by one: they land in a pending queue keyed by
//! `(collection, doc id)` where later payloads overwrite earlier ones, and
//! a single deferred flush task sends whatever the queue holds once the
//! burst quiets down. Rapid successive saves (every answer toggle)
//! therefore collapse into one remote write carrying only the final state.

use serde_json::Value;
use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use exam_core::model::UserKey;
use exam_core::{Clock, KeySpace};
use storage::store::ProgressStore;

use crate::error::SyncError;
use crate::remote::{QueuedWrite, RemoteStore};
use crate::wire::ProgressDocument;

/// Quiet period before a queued batch is sent.
pub const SAVE_DEBOUNCE: StdDuration = StdDuration::from_millis(2000);

/// How long a fetched document stays fresh in the read cache.
const READ_CACHE_TTL_SECS: i64 = 60;

/// Remote collection names.
pub mod collections {
    pub const USERS: &str = "users";
    pub const PROGRESS: &str = "progress";
}

struct CacheEntry {
    data: Value,
    fetched_at: DateTime<Utc>,
}

#[derive(Default)]
struct SyncInner {
    queue: HashMap<(String, String), Value>,
    cache: HashMap<(String, String), CacheEntry>,
    profile_reconciled: bool,
    flush_task: Option<JoinHandle<()>>,
}

/// Client side of the eventual synchronization between the local store and
/// the remote document collection.
///
/// Cheap to clone; clones share the pending queue and read cache. All
/// failure handling is local: a broken or absent remote never surfaces as
/// an error from the write path, it only costs the remote copy until the
/// next save re-queues fresh state.
#[derive(Clone)]
pub struct SyncClient {
    remote: Arc<dyn RemoteStore>,
    store: Arc<dyn ProgressStore>,
    keys: KeySpace,
    clock: Clock,
    debounce: StdDuration,
    inner: Arc<Mutex<SyncInner>>,
}

impl SyncClient {
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        store: Arc<dyn ProgressStore>,
        keys: KeySpace,
        clock: Clock,
    ) -> Self {
        Self {
            remote,
            store,
            keys,
            clock,
            debounce: SAVE_DEBOUNCE,
            inner: Arc::new(Mutex::new(SyncInner::default())),
        }
    }

    /// Replace the debounce interval (tests use a short one).
    #[must_use]
    pub fn with_debounce(mut self, debounce: StdDuration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Replace the clock; the pending queue and cache stay shared with the
    /// original client.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.remote.is_available()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SyncInner> {
        // A poisoned lock means a panic mid-mutation; the queue contents
        // are still the latest-wins payloads, so continuing is safe.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Queue (or overwrite) the pending write for `(collection, doc_id)`
    /// and restart the debounce timer. Exactly one deferred flush exists
    /// per queue; re-scheduling replaces it.
    ///
    /// Must be called from within a Tokio runtime. No-op when the remote
    /// store is unavailable.
    pub fn queue_write(&self, collection: &str, doc_id: &str, data: Value) {
        if !self.remote.is_available() {
            return;
        }

        let key = (collection.to_string(), doc_id.to_string());
        let mut inner = self.lock();
        inner.cache.remove(&key);
        inner.queue.insert(key, data);

        if let Some(task) = inner.flush_task.take() {
            task.abort();
        }
        let client = self.clone();
        let debounce = self.debounce;
        inner.flush_task = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            // Detach before flushing so a concurrent re-schedule cannot
            // abort an in-flight batch.
            client.lock().flush_task = None;
            client.flush().await;
        }));
    }

    /// Send everything queued as one batch, stamping each entry with the
    /// sync timestamp. Returns how many documents were written.
    ///
    /// The queue is drained atomically up front: a write arriving while
    /// the batch is in flight lands in a fresh queue. On failure the
    /// drained batch is dropped, not retried; the in-memory session still
    /// holds the authoritative state, so the next save re-queues it.
    pub async fn flush(&self) -> usize {
        let drained: Vec<((String, String), Value)> = {
            let mut inner = self.lock();
            if inner.queue.is_empty() {
                return 0;
            }
            mem::take(&mut inner.queue).into_iter().collect()
        };

        let synced_at = self.clock.now();
        let batch: Vec<QueuedWrite> = drained
            .into_iter()
            .map(|((collection, doc_id), mut data)| {
                if let Some(object) = data.as_object_mut() {
                    object.insert(
                        "syncedAt".to_string(),
                        Value::String(synced_at.to_rfc3339()),
                    );
                }
                QueuedWrite {
                    collection,
                    doc_id,
                    data,
                }
            })
            .collect();

        match self.remote.commit(&batch).await {
            Ok(()) => {
                let mut inner = self.lock();
                for write in &batch {
                    inner
                        .cache
                        .remove(&(write.collection.clone(), write.doc_id.clone()));
                }
                debug!(count = batch.len(), "flushed write batch");
                batch.len()
            }
            Err(err) => {
                warn!(error = %err, count = batch.len(), "dropping write batch after flush failure");
                0
            }
        }
    }

    /// Read a document through the cache (60 s freshness). `None` when the
    /// document does not exist, the remote is unavailable, or the fetch
    /// fails.
    pub async fn read(&self, collection: &str, doc_id: &str) -> Option<Value> {
        if !self.remote.is_available() {
            return None;
        }

        let key = (collection.to_string(), doc_id.to_string());
        let now = self.clock.now();
        {
            let inner = self.lock();
            if let Some(entry) = inner.cache.get(&key) {
                if now - entry.fetched_at < Duration::seconds(READ_CACHE_TTL_SECS) {
                    return Some(entry.data.clone());
                }
            }
        }

        match self.remote.fetch(collection, doc_id).await {
            Ok(Some(data)) => {
                self.lock().cache.insert(
                    key,
                    CacheEntry {
                        data: data.clone(),
                        fetched_at: now,
                    },
                );
                Some(data)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, collection, doc_id, "remote read failed");
                None
            }
        }
    }

    /// One-shot login reconciliation: pull the remote profile document and
    /// overwrite the local copy with it (remote is authoritative for the
    /// profile on login, so cross-device changes win). Returns whether a
    /// remote profile was applied.
    ///
    /// Guarded by a per-client flag; repeated calls in the same session do
    /// nothing. A failed fetch still marks the reconciliation as attempted
    /// so it is not retried on every dashboard visit.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` only for local storage faults; remote failures
    /// are logged and absorbed.
    pub async fn reconcile_profile_on_login(&self, email: &str) -> Result<bool, SyncError> {
        {
            let mut inner = self.lock();
            if inner.profile_reconciled {
                return Ok(false);
            }
            if !self.remote.is_available() {
                inner.profile_reconciled = true;
                return Ok(false);
            }
        }

        let user = UserKey::from_email(email);
        let fetched = self.remote.fetch(collections::USERS, user.as_str()).await;
        self.lock().profile_reconciled = true;

        match fetched {
            Ok(Some(data)) => {
                let raw = serde_json::to_string(&data)?;
                self.store.save(&self.keys.profile_key(&user), &raw).await?;
                debug!(user = %user, "profile reconciled from remote");
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) => {
                warn!(error = %err, "profile reconciliation failed");
                Ok(false)
            }
        }
    }

    /// Pull every remote progress document for the user into the local
    /// store and repoint the current-attempt pointer at the most recently
    /// touched record. Returns how many documents were synced.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` only for local storage faults; remote failures
    /// are logged and absorbed.
    pub async fn reconcile_progress(&self, email: &str) -> Result<usize, SyncError> {
        if !self.remote.is_available() {
            return Ok(0);
        }

        let documents = match self.remote.list(collections::PROGRESS, email).await {
            Ok(documents) => documents,
            Err(err) => {
                warn!(error = %err, "progress reconciliation failed");
                return Ok(0);
            }
        };

        let user = UserKey::from_email(email);
        let mut synced = 0;
        let mut most_recent: Option<(DateTime<Utc>, String)> = None;

        for (doc_id, data) in documents {
            // Unparseable or foreign documents are skipped, not fatal.
            let Ok(document) = serde_json::from_value::<ProgressDocument>(data.clone()) else {
                continue;
            };
            if document.user_email.as_deref() != Some(email) {
                continue;
            }

            let raw = serde_json::to_string(&data)?;
            self.store.save(&doc_id, &raw).await?;
            synced += 1;

            let newer = most_recent
                .as_ref()
                .is_none_or(|(touched, _)| document.timestamp > *touched);
            if newer {
                most_recent = Some((document.timestamp, doc_id));
            }
        }

        if let Some((touched, doc_id)) = most_recent {
            let current_key = self.keys.current_key(&user);
            let repoint = match self.store.load(&current_key).await? {
                None => true,
                Some(pointed_key) => match self.store.load(&pointed_key).await? {
                    None => true,
                    Some(raw) => serde_json::from_str::<ProgressDocument>(&raw)
                        .map_or(true, |pointed| touched > pointed.timestamp),
                },
            };
            if repoint {
                self.store.save(&current_key, &doc_id).await?;
            }
        }

        if synced > 0 {
            debug!(count = synced, "synced progress documents from remote");
        }
        Ok(synced)
    }

    /// Delete remote documents immediately (no debounce). Used by the
    /// confirmed reset flow, which is the one path whose remote failure
    /// propagates to the caller.
    ///
    /// # Errors
    ///
    /// Returns the first `SyncError` encountered.
    pub async fn purge(&self, collection: &str, doc_ids: &[String]) -> Result<(), SyncError> {
        if !self.remote.is_available() {
            return Ok(());
        }

        {
            let mut inner = self.lock();
            for doc_id in doc_ids {
                let key = (collection.to_string(), doc_id.clone());
                inner.queue.remove(&key);
                inner.cache.remove(&key);
            }
        }

        for doc_id in doc_ids {
            self.remote.delete(collection, doc_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;
    use exam_core::time::{fixed_clock, fixed_now};
    use serde_json::json;
    use storage::store::MemoryStore;

    fn client(remote: MemoryRemote, store: MemoryStore) -> SyncClient {
        SyncClient::new(
            Arc::new(remote),
            Arc::new(store),
            KeySpace::default(),
            fixed_clock(),
        )
        .with_debounce(StdDuration::from_millis(25))
    }

    #[tokio::test]
    async fn debounce_collapses_writes_to_the_last_payload() {
        let remote = MemoryRemote::new();
        let client = client(remote.clone(), MemoryStore::new());

        for round in 0..3 {
            client.queue_write("progress", "key-1", json!({"questionIndex": round}));
        }
        tokio::time::sleep(StdDuration::from_millis(250)).await;

        let commits = remote.commits();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].len(), 1);
        assert_eq!(commits[0][0].data["questionIndex"], json!(2));
    }

    #[tokio::test]
    async fn flush_batches_distinct_keys_and_stamps_sync_time() {
        let remote = MemoryRemote::new();
        let client = client(remote.clone(), MemoryStore::new());

        client.queue_write("progress", "key-1", json!({"test": 1}));
        client.queue_write("users", "sam@example.com", json!({"name": "Sam"}));
        let written = client.flush().await;

        assert_eq!(written, 2);
        let doc = remote.document("progress", "key-1").unwrap();
        assert_eq!(doc["syncedAt"], json!(fixed_now().to_rfc3339()));
        // Queue is empty afterwards.
        assert_eq!(client.flush().await, 0);
    }

    #[tokio::test]
    async fn read_serves_fresh_hits_from_cache() {
        let remote = MemoryRemote::new();
        remote.seed("users", "sam@example.com", json!({"name": "Sam"}));
        let client = client(remote.clone(), MemoryStore::new());

        assert!(client.read("users", "sam@example.com").await.is_some());
        assert!(client.read("users", "sam@example.com").await.is_some());
        assert_eq!(remote.fetch_count(), 1);
    }

    #[tokio::test]
    async fn read_refetches_after_the_cache_expires() {
        let remote = MemoryRemote::new();
        remote.seed("users", "sam@example.com", json!({"name": "Sam"}));
        let client = client(remote.clone(), MemoryStore::new());

        assert!(client.read("users", "sam@example.com").await.is_some());

        let mut later = fixed_clock();
        later.advance(Duration::seconds(READ_CACHE_TTL_SECS + 1));
        let client_later = client.clone().with_clock(later);
        assert!(client_later.read("users", "sam@example.com").await.is_some());
        assert_eq!(remote.fetch_count(), 2);
    }

    #[tokio::test]
    async fn profile_reconciliation_runs_once_per_client() {
        let remote = MemoryRemote::new();
        remote.seed(
            "users",
            "sam@example.com",
            json!({"name": "Sam", "email": "sam@example.com"}),
        );
        let store = MemoryStore::new();
        let client = client(remote.clone(), store.clone());

        assert!(client
            .reconcile_profile_on_login("sam@example.com")
            .await
            .unwrap());
        assert!(!client
            .reconcile_profile_on_login("sam@example.com")
            .await
            .unwrap());
        assert_eq!(remote.fetch_count(), 1);

        let local = store
            .load("examprep-user-sam@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(local.contains("Sam"));
    }

    #[tokio::test]
    async fn purge_drops_pending_writes_for_deleted_documents() {
        let remote = MemoryRemote::new();
        remote.seed("progress", "key-1", json!({"test": 1, "userEmail": "a@b.c"}));
        let client = client(remote.clone(), MemoryStore::new());

        client.queue_write("progress", "key-1", json!({"test": 1}));
        client.purge("progress", &["key-1".to_string()]).await.unwrap();

        assert_eq!(client.flush().await, 0);
        assert!(remote.document("progress", "key-1").is_none());
    }

    #[tokio::test]
    async fn unavailable_remote_turns_operations_into_noops() {
        let client = SyncClient::new(
            Arc::new(crate::remote::NoopRemote),
            Arc::new(MemoryStore::new()),
            KeySpace::default(),
            fixed_clock(),
        );

        client.queue_write("progress", "key-1", json!({"test": 1}));
        assert_eq!(client.flush().await, 0);
        assert_eq!(client.read("progress", "key-1").await, None);
        assert_eq!(client.reconcile_progress("a@b.c").await.unwrap(), 0);
        client.purge("progress", &["key-1".to_string()]).await.unwrap();
    }
}
