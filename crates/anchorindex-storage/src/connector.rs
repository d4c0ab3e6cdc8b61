//! Lazy, cached store connections keyed by target string.
//!
//! Targets:
//! - `memory`: a process-local [`MemoryStore`]
//! - `sqlite:<url>` or a path ending in `.db` / `.sqlite`: a [`SqliteStore`]
//!   (feature `sqlite`)
//!
//! The first `connect` for a target opens it, retrying forever with a fixed
//! delay while the backend is unreachable; later calls share that instance.
//! Targets open independently: an unreachable one never holds up another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

use anchorindex_core::{IndexerError, KeyValueStore, MemoryStore};

#[cfg(feature = "sqlite")]
use crate::retrying::RetryingStore;
use crate::retrying::DEFAULT_RETRY_DELAY;

/// Backend selected by a target string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Memory,
    Sqlite(String),
}

impl StoreTarget {
    pub fn parse(target: &str) -> Result<Self, IndexerError> {
        let target = target.trim();
        if target == "memory" || target == "memory:" {
            return Ok(Self::Memory);
        }
        if target.starts_with("sqlite:") || target.ends_with(".db") || target.ends_with(".sqlite") {
            return Ok(Self::Sqlite(target.to_string()));
        }
        Err(IndexerError::Config(format!(
            "unsupported store target '{target}' (expected 'memory' or a sqlite path)"
        )))
    }
}

type StoreCell = Arc<OnceCell<Arc<dyn KeyValueStore>>>;

pub struct StoreConnector {
    /// Held only to look up or insert a cell, never while opening.
    stores: Mutex<HashMap<String, StoreCell>>,
    retry_delay: Duration,
}

impl Default for StoreConnector {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY)
    }
}

impl StoreConnector {
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            stores: Mutex::new(HashMap::new()),
            retry_delay,
        }
    }

    /// The store for `target`, opened on first use.
    ///
    /// Only an unsupported target fails; an unreachable backend is waited out.
    pub async fn connect(&self, target: &str) -> Result<Arc<dyn KeyValueStore>, IndexerError> {
        let parsed = StoreTarget::parse(target)?;
        let cell = self
            .stores
            .lock()
            .await
            .entry(target.to_string())
            .or_default()
            .clone();

        cell.get_or_try_init(|| self.open_with_retry(target, &parsed))
            .await
            .cloned()
    }

    /// Number of distinct targets connected so far.
    pub async fn connected(&self) -> usize {
        self.stores
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    async fn open_with_retry(
        &self,
        target: &str,
        parsed: &StoreTarget,
    ) -> Result<Arc<dyn KeyValueStore>, IndexerError> {
        let mut attempt = 0u64;
        loop {
            attempt += 1;
            match self.open(parsed).await {
                Ok(store) => {
                    info!(%target, backend = store.target(), "store connected");
                    return Ok(store);
                }
                Err(e) if e.is_store_unavailable() || matches!(e, IndexerError::Storage(_)) => {
                    warn!(
                        %target,
                        attempt,
                        delay_ms = self.retry_delay.as_millis() as u64,
                        error = %e,
                        "store connection failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn open(&self, target: &StoreTarget) -> Result<Arc<dyn KeyValueStore>, IndexerError> {
        match target {
            StoreTarget::Memory => Ok(Arc::new(MemoryStore::new())),
            #[cfg(feature = "sqlite")]
            StoreTarget::Sqlite(path) => {
                let store = crate::sqlite::SqliteStore::open(path).await?;
                Ok(Arc::new(RetryingStore::with_delay(store, self.retry_delay)))
            }
            #[cfg(not(feature = "sqlite"))]
            StoreTarget::Sqlite(path) => Err(IndexerError::Config(format!(
                "store '{path}' needs the `sqlite` feature"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parsing() {
        assert_eq!(StoreTarget::parse("memory").unwrap(), StoreTarget::Memory);
        assert_eq!(
            StoreTarget::parse("./anchors.db").unwrap(),
            StoreTarget::Sqlite("./anchors.db".into())
        );
        assert!(matches!(
            StoreTarget::parse("redis://localhost:6379"),
            Err(IndexerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn same_target_shares_one_store() {
        let connector = StoreConnector::new(Duration::from_millis(1));
        let a = connector.connect("memory").await.unwrap();
        let b = connector.connect("memory").await.unwrap();
        a.set("k", "v").await.unwrap();
        assert_eq!(b.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(connector.connected().await, 1);
    }

    #[tokio::test]
    async fn unsupported_target_fails_fast() {
        let connector = StoreConnector::default();
        assert!(connector.connect("redis://cache:6379").await.is_err());
        assert_eq!(connector.connected().await, 0);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn unreachable_target_does_not_block_others() {
        let connector = Arc::new(StoreConnector::new(Duration::from_millis(5)));
        let stuck = tokio::spawn({
            let connector = connector.clone();
            async move {
                connector
                    .connect("sqlite:/nonexistent-anchorindex-dir/sub/anchors.db")
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let memory = tokio::time::timeout(Duration::from_secs(2), connector.connect("memory"))
            .await
            .expect("memory target blocked by an unreachable one")
            .unwrap();
        memory.set("k", "v").await.unwrap();
        assert!(!stuck.is_finished());
        assert_eq!(connector.connected().await, 1);
        stuck.abort();
    }

    #[tokio::test]
    async fn concurrent_connects_share_one_store() {
        let connector = Arc::new(StoreConnector::new(Duration::from_millis(1)));
        let (a, b) = tokio::join!(connector.connect("memory"), connector.connect("memory"));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(connector.connected().await, 1);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn sqlite_target_is_wrapped_for_retries() {
        let connector = StoreConnector::new(Duration::from_millis(1));
        let store = connector.connect("sqlite::memory:").await.unwrap();
        assert!(store.set_if_absent("k", "1").await.unwrap());
        assert!(!store.set_if_absent("k", "2").await.unwrap());
        assert_eq!(store.target(), "sqlite::memory:");
    }
}
