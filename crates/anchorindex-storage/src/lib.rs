//! anchorindex-storage — key-value backends for AnchorIndex.
//!
//! Backends:
//! - `memory`: [`MemoryStore`](anchorindex_core::MemoryStore) from core (dev/testing, no persistence)
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)
//!
//! [`StoreConnector`] opens backends lazily by target string and caches them;
//! [`RetryingStore`] waits out connection failures on every operation.

pub mod connector;
pub mod retrying;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use connector::{StoreConnector, StoreTarget};
pub use retrying::RetryingStore;
