//! The chain client boundary: everything the pipeline needs from a node.
//!
//! Every method may fail with [`IndexerError::Rpc`]; callers treat that as
//! transient. The production implementation lives in `anchorindex-node`.

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::types::{ActivationStatus, BalanceDetails, Block, PublicKeyRecord};

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Height of the newest block.
    async fn tip_height(&self) -> Result<u64, IndexerError>;

    /// The block at `height`, or `None` if the node does not have it.
    async fn block_at(&self, height: u64) -> Result<Option<Block>, IndexerError>;

    async fn balance_details(&self, address: &str) -> Result<BalanceDetails, IndexerError>;

    async fn activation_status(&self) -> Result<ActivationStatus, IndexerError>;

    /// Submit a data transaction carrying one binary entry; returns its id.
    ///
    /// A rejection by the node is reported as [`IndexerError::Submission`].
    async fn submit_data_transaction(
        &self,
        sender: &str,
        key: &str,
        base64_value: &str,
    ) -> Result<String, IndexerError>;

    /// The node wallet's address, used as sender for anchor submissions.
    async fn wallet_address(&self) -> Result<String, IndexerError>;

    /// Public key of `address` from its transaction history, if it ever sent one.
    async fn public_key_of(&self, address: &str) -> Result<Option<PublicKeyRecord>, IndexerError>;
}
