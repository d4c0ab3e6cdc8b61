//! Public-key indexer: remembers the first key each address signed with.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use anchorindex_core::store::{keys, KeyValueStore};
use anchorindex_core::types::{IndexContext, PublicKeyRecord, Transaction};
use anchorindex_core::{ChainClient, IndexerError, TransactionHandler};

pub struct PublicKeyIndexer {
    store: Arc<dyn KeyValueStore>,
    chain: Arc<dyn ChainClient>,
}

impl PublicKeyIndexer {
    pub fn new(store: Arc<dyn KeyValueStore>, chain: Arc<dyn ChainClient>) -> Self {
        Self { store, chain }
    }

    /// The indexed key of `address`, if it has been seen on chain.
    pub async fn get(&self, address: &str) -> Result<Option<PublicKeyRecord>, IndexerError> {
        match self.store.get(&keys::public_key(address)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get), but asks the node for accounts not indexed
    /// yet and stores what it finds.
    pub async fn resolve(&self, address: &str) -> Result<Option<PublicKeyRecord>, IndexerError> {
        if let Some(record) = self.get(address).await? {
            return Ok(Some(record));
        }
        let Some(record) = self.chain.public_key_of(address).await? else {
            trace!(%address, "no public key known on chain");
            return Ok(None);
        };
        self.remember(address, &record).await?;
        Ok(Some(record))
    }

    async fn remember(&self, address: &str, record: &PublicKeyRecord) -> Result<bool, IndexerError> {
        let value = serde_json::to_string(record)?;
        self.store
            .set_if_absent(&keys::public_key(address), &value)
            .await
    }
}

#[async_trait]
impl TransactionHandler for PublicKeyIndexer {
    async fn handle_transaction(
        &self,
        tx: &Transaction,
        ctx: &IndexContext,
    ) -> Result<(), IndexerError> {
        if tx.sender.is_empty() || tx.sender_public_key.is_empty() {
            return Ok(());
        }
        let record = PublicKeyRecord {
            public_key: tx.sender_public_key.clone(),
            key_type: tx.sender_key_type.clone(),
        };
        if self.remember(&tx.sender, &record).await? {
            debug!(address = %tx.sender, key_type = %record.key_type, height = ctx.height, "public key indexed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "public-key"
    }
}
