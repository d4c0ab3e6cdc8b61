//! anchorindex-core — foundation for the anchoring and block-indexing pipeline.
//!
//! # Architecture
//!
//! ```text
//! BlockMonitor (poll loop)
//!     ├── ChainClient        (tip, blocks, balances, submissions)
//!     ├── CheckpointManager  (processing height in the store)
//!     └── IndexBus           (block / transaction / sync fan-out)
//!             └── processors (anchors, keys, identity, generators, supply)
//!                     └── KeyValueStore (memory / SQLite)
//! ```

pub mod bus;
pub mod chain;
pub mod checkpoint;
pub mod codec;
pub mod config;
pub mod error;
pub mod monitor;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bus::{BlockHandler, FanOut, IndexBus, SyncHandler, TransactionHandler};
pub use chain::ChainClient;
pub use checkpoint::CheckpointManager;
pub use codec::{CodecError, Encoding};
pub use config::{MonitorConfig, StartingHeight};
pub use error::IndexerError;
pub use monitor::{BlockMonitor, MonitorHandle, MonitorState, PassReport};
pub use store::{KeyValueStore, MemoryStore};
pub use types::{
    ActivationStatus, BalanceDetails, Block, DataEntry, FeatureStatus, IndexContext,
    PublicKeyRecord, SyncTick, Transaction,
};
