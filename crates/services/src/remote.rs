//! Remote document-store capability.
//!
//! The sync client talks to the remote collection only through the
//! [`RemoteStore`] trait. When no remote backend is configured (or the
//! user is not authenticated) the [`NoopRemote`] stands in and every
//! operation degrades to a neutral value: local storage alone is always
//! sufficient for single-device operation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::sync::{Arc, Mutex};

use crate::error::SyncError;

/// One pending document write: latest payload for a `(collection, doc id)`
/// pair, merged (not replaced) into the remote document.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedWrite {
    pub collection: String,
    pub doc_id: String,
    pub data: Value,
}

/// Passive remote document collection, partitioned per user by the email
/// carried inside each document.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Whether the backend is configured and reachable in principle.
    /// `false` turns every sync operation into a no-op.
    fn is_available(&self) -> bool;

    /// Fetch a single document, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` on transport failure.
    async fn fetch(&self, collection: &str, doc_id: &str) -> Result<Option<Value>, SyncError>;

    /// List every document of `collection` belonging to `user_email`,
    /// as `(doc id, document)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` on transport failure.
    async fn list(&self, collection: &str, user_email: &str)
        -> Result<Vec<(String, Value)>, SyncError>;

    /// Send one batch of writes; each entry merges into its document.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` if the batch is rejected or unreachable.
    async fn commit(&self, batch: &[QueuedWrite]) -> Result<(), SyncError>;

    /// Delete a single document. Deleting an absent document is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` on transport failure.
    async fn delete(&self, collection: &str, doc_id: &str) -> Result<(), SyncError>;
}

/// Stand-in used when no remote backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRemote;

#[async_trait]
impl RemoteStore for NoopRemote {
    fn is_available(&self) -> bool {
        false
    }

    async fn fetch(&self, _collection: &str, _doc_id: &str) -> Result<Option<Value>, SyncError> {
        Ok(None)
    }

    async fn list(
        &self,
        _collection: &str,
        _user_email: &str,
    ) -> Result<Vec<(String, Value)>, SyncError> {
        Ok(Vec::new())
    }

    async fn commit(&self, _batch: &[QueuedWrite]) -> Result<(), SyncError> {
        Ok(())
    }

    async fn delete(&self, _collection: &str, _doc_id: &str) -> Result<(), SyncError> {
        Ok(())
    }
}

/// In-memory remote store for tests and prototyping.
///
/// Documents live in a mutex-guarded map; committed batches and fetch
/// counts are recorded so tests can assert on batching behavior.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Mutex<MemoryRemoteInner>>,
}

#[derive(Default)]
struct MemoryRemoteInner {
    documents: std::collections::BTreeMap<(String, String), Value>,
    commits: Vec<Vec<QueuedWrite>>,
    fetches: usize,
}

impl MemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document, as if another device had written it.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn seed(&self, collection: &str, doc_id: &str, data: Value) {
        let mut inner = self.inner.lock().expect("remote lock poisoned");
        inner
            .documents
            .insert((collection.to_string(), doc_id.to_string()), data);
    }

    /// Batches committed so far, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn commits(&self) -> Vec<Vec<QueuedWrite>> {
        self.inner.lock().expect("remote lock poisoned").commits.clone()
    }

    /// Number of `fetch` calls that reached the backend.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.inner.lock().expect("remote lock poisoned").fetches
    }

    /// Current value of a document, if present.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn document(&self, collection: &str, doc_id: &str) -> Option<Value> {
        self.inner
            .lock()
            .expect("remote lock poisoned")
            .documents
            .get(&(collection.to_string(), doc_id.to_string()))
            .cloned()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    fn is_available(&self) -> bool {
        true
    }

    async fn fetch(&self, collection: &str, doc_id: &str) -> Result<Option<Value>, SyncError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| SyncError::Storage(storage::store::StorageError::Connection(e.to_string())))?;
        inner.fetches += 1;
        Ok(inner
            .documents
            .get(&(collection.to_string(), doc_id.to_string()))
            .cloned())
    }

    async fn list(
        &self,
        collection: &str,
        user_email: &str,
    ) -> Result<Vec<(String, Value)>, SyncError> {
        let inner = self
            .inner
            .lock()
            .map_err(|e| SyncError::Storage(storage::store::StorageError::Connection(e.to_string())))?;
        Ok(inner
            .documents
            .iter()
            .filter(|((coll, _), doc)| {
                coll == collection
                    && doc.get("userEmail").and_then(Value::as_str) == Some(user_email)
            })
            .map(|((_, id), doc)| (id.clone(), doc.clone()))
            .collect())
    }

    async fn commit(&self, batch: &[QueuedWrite]) -> Result<(), SyncError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| SyncError::Storage(storage::store::StorageError::Connection(e.to_string())))?;
        for write in batch {
            inner.documents.insert(
                (write.collection.clone(), write.doc_id.clone()),
                write.data.clone(),
            );
        }
        inner.commits.push(batch.to_vec());
        Ok(())
    }

    async fn delete(&self, collection: &str, doc_id: &str) -> Result<(), SyncError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| SyncError::Storage(storage::store::StorageError::Connection(e.to_string())))?;
        inner
            .documents
            .remove(&(collection.to_string(), doc_id.to_string()));
        Ok(())
    }
}

/// Connection settings for the HTTP remote store.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub base_url: String,
    pub token: String,
}

impl RemoteConfig {
    /// Read the remote endpoint from the environment; `None` (remote
    /// disabled) when `EXAMPREP_SYNC_URL` or `EXAMPREP_SYNC_TOKEN` is
    /// missing or blank.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("EXAMPREP_SYNC_URL").ok()?;
        let token = env::var("EXAMPREP_SYNC_TOKEN").ok()?;
        if base_url.trim().is_empty() || token.trim().is_empty() {
            return None;
        }
        Some(Self { base_url, token })
    }
}

/// HTTP client for a REST-style document collection.
///
/// Document routes: `GET/DELETE {base}/{collection}/{doc_id}`,
/// `GET {base}/{collection}?user={email}`, `POST {base}/batch`.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: Client,
    config: RemoteConfig,
}

impl HttpRemoteStore {
    #[must_use]
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn doc_url(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "{}/{collection}/{doc_id}",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Deserialize)]
struct ListedDocument {
    id: String,
    data: Value,
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    fn is_available(&self) -> bool {
        true
    }

    async fn fetch(&self, collection: &str, doc_id: &str) -> Result<Option<Value>, SyncError> {
        let response = self
            .client
            .get(self.doc_url(collection, doc_id))
            .bearer_auth(&self.config.token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status()));
        }

        Ok(Some(response.json().await?))
    }

    async fn list(
        &self,
        collection: &str,
        user_email: &str,
    ) -> Result<Vec<(String, Value)>, SyncError> {
        let url = format!(
            "{}/{collection}",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(url)
            .query(&[("user", user_email)])
            .bearer_auth(&self.config.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status()));
        }

        let documents: Vec<ListedDocument> = response.json().await?;
        Ok(documents.into_iter().map(|doc| (doc.id, doc.data)).collect())
    }

    async fn commit(&self, batch: &[QueuedWrite]) -> Result<(), SyncError> {
        let url = format!("{}/batch", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.token)
            .json(batch)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status()));
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, doc_id: &str) -> Result<(), SyncError> {
        let response = self
            .client
            .delete(self.doc_url(collection, doc_id))
            .bearer_auth(&self.config.token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(SyncError::HttpStatus(response.status()));
        }
        Ok(())
    }
}

/// The configured remote store, or the no-op stand-in when the
/// environment does not name one.
#[must_use]
pub fn remote_from_env() -> Arc<dyn RemoteStore> {
    match RemoteConfig::from_env() {
        Some(config) => Arc::new(HttpRemoteStore::new(config)),
        None => Arc::new(NoopRemote),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn noop_remote_returns_neutral_values() {
        let remote = NoopRemote;
        assert!(!remote.is_available());
        assert_eq!(remote.fetch("users", "k").await.unwrap(), None);
        assert!(remote.list("progress", "a@b.c").await.unwrap().is_empty());
        remote.commit(&[]).await.unwrap();
        remote.delete("users", "k").await.unwrap();
    }

    #[tokio::test]
    async fn memory_remote_lists_only_matching_user() {
        let remote = MemoryRemote::new();
        remote.seed("progress", "key-1", json!({"userEmail": "a@b.c", "test": 1}));
        remote.seed("progress", "key-2", json!({"userEmail": "x@y.z", "test": 2}));

        let listed = remote.list("progress", "a@b.c").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "key-1");
    }
}
