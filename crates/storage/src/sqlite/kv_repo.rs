use sqlx::Row;

use super::SqliteStore;
use crate::store::{ProgressStore, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl ProgressStore for SqliteStore {
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO kv_records (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now())
        .execute(self.pool())
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM kv_records WHERE key = ?1")
            .bind(key)
            .fetch_optional(self.pool())
            .await
            .map_err(conn)?;

        row.map(|row| row.try_get::<String, _>("value").map_err(conn))
            .transpose()
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM kv_records WHERE key = ?1")
            .bind(key)
            .execute(self.pool())
            .await
            .map_err(conn)?;

        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        // Record keys only contain `[a-z0-9@.-]` plus the namespace, so a
        // plain LIKE prefix match needs no wildcard escaping.
        let rows = sqlx::query("SELECT key FROM kv_records WHERE key LIKE ?1 || '%' ORDER BY key")
            .bind(prefix)
            .fetch_all(self.pool())
            .await
            .map_err(conn)?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("key").map_err(conn))
            .collect()
    }
}
