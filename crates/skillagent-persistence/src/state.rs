//! Versioned key-value state for profiles and sessions
//!
//! Every value carries a version that increases by one on each write.
//! `compare_and_swap` only writes when the caller's version matches the
//! stored one, so a stale read-modify-write surfaces as
//! [`StorageError::VersionConflict`] instead of overwriting silently.
//! Version 0 means "absent".

use crate::error::{Result, StorageError};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

/// A stored value and the version it was written at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub version: u64,
    pub value: Value,
}

/// Namespaced, versioned key-value store
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Versioned>>;

    /// Unconditional write; returns the new version
    async fn put(&self, namespace: &str, key: &str, value: Value) -> Result<u64>;

    /// Write only if the stored version equals `expected_version`
    async fn compare_and_swap(
        &self,
        namespace: &str,
        key: &str,
        expected_version: u64,
        value: Value,
    ) -> Result<u64>;

    /// Remove a key; absent keys are not an error
    async fn delete(&self, namespace: &str, key: &str) -> Result<()>;
}

fn conflict(namespace: &str, key: &str, expected: u64, actual: u64) -> StorageError {
    StorageError::VersionConflict {
        namespace: namespace.to_string(),
        key: key.to_string(),
        expected,
        actual,
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local state store
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    entries: RwLock<HashMap<(String, String), Versioned>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Versioned>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    async fn put(&self, namespace: &str, key: &str, value: Value) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let slot = entries
            .entry((namespace.to_string(), key.to_string()))
            .or_insert(Versioned { version: 0, value: Value::Null });
        slot.version += 1;
        slot.value = value;
        Ok(slot.version)
    }

    async fn compare_and_swap(
        &self,
        namespace: &str,
        key: &str,
        expected_version: u64,
        value: Value,
    ) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let id = (namespace.to_string(), key.to_string());
        let current = entries.get(&id).map_or(0, |v| v.version);

        if current != expected_version {
            return Err(conflict(namespace, key, expected_version, current));
        }

        let version = current + 1;
        entries.insert(id, Versioned { version, value });
        Ok(version)
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }
}

// ============================================================================
// SQLite
// ============================================================================

/// State store backed by a SQLite table
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Open (or create) a database file
    pub async fn new(database_path: &str) -> Result<Self> {
        let database_url = format!("sqlite:{}?mode=rwc", database_path);
        let pool = SqlitePool::connect(&database_url).await?;

        let store = Self { pool };
        store.run_migrations().await?;

        info!("State store initialized with database: {}", database_path);
        Ok(store)
    }

    /// Private in-memory database, mainly for tests
    pub async fn in_memory() -> Result<Self> {
        // Each connection would otherwise get its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS state (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                version INTEGER NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("State store migrations completed");
        Ok(())
    }

    async fn current_version(&self, namespace: &str, key: &str) -> Result<u64> {
        let row = sqlx::query("SELECT version FROM state WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map_or(0, |r| r.get::<i64, _>("version") as u64))
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Versioned>> {
        let row = sqlx::query("SELECT version, value FROM state WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("value");
                Ok(Some(Versioned {
                    version: row.get::<i64, _>("version") as u64,
                    value: serde_json::from_str(&raw)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, namespace: &str, key: &str, value: Value) -> Result<u64> {
        let row = sqlx::query(
            r#"
            INSERT INTO state (namespace, key, version, value, updated_at)
            VALUES (?, ?, 1, ?, ?)
            ON CONFLICT (namespace, key) DO UPDATE SET
                version = state.version + 1,
                value = excluded.value,
                updated_at = excluded.updated_at
            RETURNING version
            "#,
        )
        .bind(namespace)
        .bind(key)
        .bind(value.to_string())
        .bind(chrono::Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("version") as u64)
    }

    async fn compare_and_swap(
        &self,
        namespace: &str,
        key: &str,
        expected_version: u64,
        value: Value,
    ) -> Result<u64> {
        let now = chrono::Utc::now().to_rfc3339();

        let affected = if expected_version == 0 {
            sqlx::query(
                r#"
                INSERT INTO state (namespace, key, version, value, updated_at)
                VALUES (?, ?, 1, ?, ?)
                ON CONFLICT (namespace, key) DO NOTHING
                "#,
            )
            .bind(namespace)
            .bind(key)
            .bind(value.to_string())
            .bind(&now)
            .execute(&self.pool)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE state SET version = version + 1, value = ?, updated_at = ?
                WHERE namespace = ? AND key = ? AND version = ?
                "#,
            )
            .bind(value.to_string())
            .bind(&now)
            .bind(namespace)
            .bind(key)
            .bind(expected_version as i64)
            .execute(&self.pool)
            .await?
            .rows_affected()
        };

        if affected == 0 {
            let actual = self.current_version(namespace, key).await?;
            return Err(conflict(namespace, key, expected_version, actual));
        }

        Ok(expected_version + 1)
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM state WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn exercise(store: &dyn StateStore) {
        assert!(store.get("profiles", "u1").await.unwrap().is_none());

        let v1 = store
            .compare_and_swap("profiles", "u1", 0, json!({"n": 1}))
            .await
            .unwrap();
        assert_eq!(v1, 1);

        // A second creator loses
        let err = store
            .compare_and_swap("profiles", "u1", 0, json!({"n": 9}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::VersionConflict { expected: 0, actual: 1, .. }
        ));

        let v2 = store
            .compare_and_swap("profiles", "u1", 1, json!({"n": 2}))
            .await
            .unwrap();
        assert_eq!(v2, 2);

        // Stale writer
        assert!(store
            .compare_and_swap("profiles", "u1", 1, json!({"n": 3}))
            .await
            .is_err());

        let current = store.get("profiles", "u1").await.unwrap().unwrap();
        assert_eq!(current, Versioned { version: 2, value: json!({"n": 2}) });

        assert_eq!(store.put("profiles", "u1", json!({"n": 4})).await.unwrap(), 3);
        assert_eq!(store.put("sessions", "u1", json!([])).await.unwrap(), 1);
        assert_eq!(
            store.get("sessions", "u1").await.unwrap().unwrap().value,
            json!([])
        );

        store.delete("sessions", "u1").await.unwrap();
        assert!(store.get("sessions", "u1").await.unwrap().is_none());
        store.delete("sessions", "missing").await.unwrap();
        assert!(store.get("profiles", "u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        exercise(&InMemoryStateStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_in_memory_store() {
        exercise(&SqliteStateStore::in_memory().await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_sqlite_file_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.db");
        let path = path.to_string_lossy();

        {
            let store = SqliteStateStore::new(&path).await.unwrap();
            store.put("sessions", "s1", json!({"topic": "limits"})).await.unwrap();
        }

        let store = SqliteStateStore::new(&path).await.unwrap();
        let value = store.get("sessions", "s1").await.unwrap().unwrap();
        assert_eq!(value.version, 1);
        assert_eq!(value.value["topic"], "limits");
    }
}
