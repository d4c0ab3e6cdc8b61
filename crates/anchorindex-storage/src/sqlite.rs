//! SQLite key-value backend.
//!
//! Plain values live in `kv`, set members in `set_members`. `set_if_absent`
//! is a single `INSERT OR IGNORE`, so it stays atomic across processes
//! sharing the file.
//!
//! # Usage
//! ```rust,no_run
//! use anchorindex_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), anchorindex_core::IndexerError> {
//! let store = SqliteStore::open("./anchors.db").await?;
//! let ephemeral = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use anchorindex_core::{IndexerError, KeyValueStore};

pub struct SqliteStore {
    pool: SqlitePool,
    target: String,
}

/// Connection-class failures become [`IndexerError::StoreUnavailable`].
fn map_err(err: sqlx::Error) -> IndexerError {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            IndexerError::StoreUnavailable(err.to_string())
        }
        other => IndexerError::Storage(other.to_string()),
    }
}

impl SqliteStore {
    /// Open (or create) a database at `path`, a plain file path
    /// (`"./anchors.db"`) or a full URL (`"sqlite:./anchors.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        if path.ends_with(":memory:") {
            return Self::in_memory().await;
        }
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await.map_err(map_err)?;
        let store = Self { pool, target: url };
        store.init_schema().await?;
        Ok(store)
    }

    /// A private in-memory database. Data is lost when the store is dropped.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        // Every pooled connection would get its own memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(map_err)?;
        let store = Self {
            pool,
            target: "sqlite::memory:".into(),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(map_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS set_members (
                key    TEXT NOT NULL,
                member TEXT NOT NULL,
                PRIMARY KEY (key, member)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        debug!(store = %self.target, "sqlite schema ready");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, IndexerError> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), IndexerError> {
        sqlx::query("INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, IndexerError> {
        let result = sqlx::query("INSERT OR IGNORE INTO kv (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, IndexerError> {
        let result = sqlx::query("INSERT OR IGNORE INTO set_members (key, member) VALUES (?, ?)")
            .bind(key)
            .bind(member)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<bool, IndexerError> {
        let result = sqlx::query("DELETE FROM set_members WHERE key = ? AND member = ?")
            .bind(key)
            .bind(member)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, IndexerError> {
        let rows = sqlx::query("SELECT member FROM set_members WHERE key = ? ORDER BY member")
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("member")).collect())
    }

    fn target(&self) -> &str {
        &self.target
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use anchorindex_core::store::keys;

    #[tokio::test]
    async fn set_if_absent_keeps_first_value() {
        let store = SqliteStore::in_memory().await.unwrap();
        let key = keys::anchor("2c67");

        assert!(store.set_if_absent(&key, "tx-1").await.unwrap());
        assert!(!store.set_if_absent(&key, "tx-2").await.unwrap());
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("tx-1"));
    }

    #[tokio::test]
    async fn set_overwrites() {
        let store = SqliteStore::in_memory().await.unwrap();
        let key = keys::processing_height();
        assert!(store.get(&key).await.unwrap().is_none());

        store.set(&key, "10").await.unwrap();
        store.set(&key, "11").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("11"));
    }

    #[tokio::test]
    async fn set_members_sorted_and_unique() {
        let store = SqliteStore::in_memory().await.unwrap();
        let key = keys::verification_methods("3Did");

        assert!(store.add_to_set(&key, "3Key:259").await.unwrap());
        assert!(store.add_to_set(&key, "3Alt:257").await.unwrap());
        assert!(!store.add_to_set(&key, "3Key:259").await.unwrap());
        assert_eq!(store.members(&key).await.unwrap(), vec!["3Alt:257", "3Key:259"]);

        assert!(store.remove_from_set(&key, "3Alt:257").await.unwrap());
        assert!(!store.remove_from_set(&key, "3Alt:257").await.unwrap());
        assert_eq!(store.members(&key).await.unwrap(), vec!["3Key:259"]);
    }

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let path = std::env::temp_dir().join(format!(
            "anchorindex-sqlite-{}.db",
            std::process::id()
        ));
        let path = path.to_string_lossy().to_string();
        let _ = std::fs::remove_file(&path);

        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.set(&keys::processing_height(), "42").await.unwrap();
            store.pool.close().await;
        }
        let store = SqliteStore::open(&path).await.unwrap();
        assert_eq!(
            store.get(&keys::processing_height()).await.unwrap().as_deref(),
            Some("42")
        );
        assert!(store.target().starts_with("sqlite:"));

        store.pool.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
