//! A store wrapper that waits out connection failures.
//!
//! Block processing cannot proceed without the store, so an operation that
//! fails with [`IndexerError::StoreUnavailable`] is retried with a fixed
//! delay until it succeeds. Every other error is returned immediately.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use anchorindex_core::{IndexerError, KeyValueStore};

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct RetryingStore<S> {
    inner: S,
    delay: Duration,
}

impl<S: KeyValueStore> RetryingStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_delay(inner, DEFAULT_RETRY_DELAY)
    }

    pub fn with_delay(inner: S, delay: Duration) -> Self {
        Self { inner, delay }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn retry<'a, T, F, Fut>(&'a self, op: &str, f: F) -> Result<T, IndexerError>
    where
        F: Fn(&'a S) -> Fut,
        Fut: Future<Output = Result<T, IndexerError>>,
    {
        let mut attempt = 0u64;
        loop {
            attempt += 1;
            match f(&self.inner).await {
                Err(e) if e.is_store_unavailable() => {
                    warn!(
                        target_store = %self.inner.target(),
                        op,
                        attempt,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %e,
                        "store unavailable, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl<S: KeyValueStore> KeyValueStore for RetryingStore<S> {
    async fn get(&self, key: &str) -> Result<Option<String>, IndexerError> {
        self.retry("get", |s| s.get(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), IndexerError> {
        self.retry("set", |s| s.set(key, value)).await
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, IndexerError> {
        self.retry("set_if_absent", |s| s.set_if_absent(key, value)).await
    }

    async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, IndexerError> {
        self.retry("add_to_set", |s| s.add_to_set(key, member)).await
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<bool, IndexerError> {
        self.retry("remove_from_set", |s| s.remove_from_set(key, member))
            .await
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, IndexerError> {
        self.retry("members", |s| s.members(key)).await
    }

    fn target(&self) -> &str {
        self.inner.target()
    }
}
