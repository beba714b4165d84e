use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::kv::KeyValueStore;
use super::types::StorageError;

// ============================================================================
// SqliteStore
// ============================================================================

/// [`KeyValueStore`] backed by a single SQLite table.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database and run migrations.
    ///
    /// Pass `":memory:"` for a private in-memory database.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // SEC-010: Pre-create the database file owner-only before the pool touches it
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::PermissionsExt;
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(path, perms) {
                    tracing::warn!(path = %path, error = %e, "SEC-010: Failed to set database file permissions");
                }
            } else if let Some(parent) = db_path.parent() {
                if parent.exists() {
                    use std::os::unix::fs::OpenOptionsExt;
                    // If creation fails, SQLite will report the error at connect_with.
                    let _file = std::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .mode(0o600)
                        .open(db_path)
                        .ok();
                }
            }
        }

        let options = SqliteConnectOptions::from_str(&url)?.pragma("busy_timeout", "5000");

        // An in-memory database exists per connection, so it must stay on one.
        let max_connections = if path == ":memory:" { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store
            .migrate()
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;
        Ok(store)
    }

    /// Create the key-value table. `IF NOT EXISTS` makes re-running a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_and_roundtrip() {
        let store = SqliteStore::open(":memory:").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "one").await.unwrap();
        store.set("k", "two").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));

        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_migrate_idempotent() {
        let store = SqliteStore::open(":memory:").await.unwrap();
        store.migrate().await.unwrap();
        store.set("a", "1").await.unwrap();
        store.migrate().await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_file_database_persists_across_opens() {
        let dir = std::env::temp_dir().join(format!("feedloom_kv_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("kv.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteStore::open(path).await.unwrap();
            store.set("persist", "yes").await.unwrap();
            store.pool.close().await;
        }
        let store = SqliteStore::open(path).await.unwrap();
        assert_eq!(store.get("persist").await.unwrap().as_deref(), Some("yes"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
