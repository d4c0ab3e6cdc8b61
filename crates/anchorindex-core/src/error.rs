//! Error types for the anchorindex pipeline.

use thiserror::Error;

use crate::codec::CodecError;

/// Errors that can occur while indexing or serving indexed data.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// The chain node could not be reached or returned garbage.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The store rejected an operation.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The store connection is down (retried with a fixed delay).
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Handler error in '{handler}': {reason}")]
    Handler { handler: String, reason: String },

    /// The node does not (yet) know a block the tip height promised.
    #[error("Block {height} not found")]
    BlockNotFound { height: u64 },

    /// The node refused a submitted transaction.
    #[error("Transaction rejected: {0}")]
    Submission(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Indexer aborted: {reason}")]
    Aborted { reason: String },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl IndexerError {
    /// Returns `true` if the failure is infrastructural and the operation
    /// may succeed when retried later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Rpc(_) | Self::StoreUnavailable(_) | Self::BlockNotFound { .. }
        )
    }

    /// Returns `true` if the store connection itself failed.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Wrap an arbitrary failure as a handler error.
    pub fn handler(handler: impl Into<String>, reason: impl ToString) -> Self {
        Self::Handler {
            handler: handler.into(),
            reason: reason.to_string(),
        }
    }
}
