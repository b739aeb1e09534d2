use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
///
/// These are the one class of failure the progress core does not absorb:
/// there is no sensible degraded behavior when the device store itself is
/// broken, so they propagate to the caller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),
}

/// Durable key-value contract backing the Local Progress Store.
///
/// Values are opaque strings (serialized JSON documents); parsing happens
/// above this layer so a corrupted value is the caller's problem to skip,
/// not the store's problem to reject.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Persist or overwrite the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be written.
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Fetch the value under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failure; a missing key is not an
    /// error.
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Delete the value under `key`. Removing an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete cannot be executed.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// All keys starting with `prefix`, in ascending lexical order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the scan cannot be executed.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// In-memory store for tests and prototyping.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_remove_round_trip() {
        let store = MemoryStore::new();
        store.save("a-1", "{\"x\":1}").await.unwrap();
        assert_eq!(store.load("a-1").await.unwrap().as_deref(), Some("{\"x\":1}"));

        store.save("a-1", "{\"x\":2}").await.unwrap();
        assert_eq!(store.load("a-1").await.unwrap().as_deref(), Some("{\"x\":2}"));

        store.remove("a-1").await.unwrap();
        assert_eq!(store.load("a-1").await.unwrap(), None);
        // Removing again stays a no-op.
        store.remove("a-1").await.unwrap();
    }

    #[tokio::test]
    async fn list_keys_filters_by_prefix_in_order() {
        let store = MemoryStore::new();
        store.save("p-user-b", "1").await.unwrap();
        store.save("p-user-a", "1").await.unwrap();
        store.save("q-user-a", "1").await.unwrap();

        let keys = store.list_keys("p-user-").await.unwrap();
        assert_eq!(keys, vec!["p-user-a".to_string(), "p-user-b".to_string()]);

        assert!(store.list_keys("zzz").await.unwrap().is_empty());
    }
}
