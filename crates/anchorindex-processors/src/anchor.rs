//! Anchor indexer: maps anchored hashes (lowercase hex) to the id of the
//! first transaction that anchored them.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use anchorindex_core::codec::{self, Encoding};
use anchorindex_core::store::{keys, KeyValueStore};
use anchorindex_core::types::{IndexContext, Transaction, ANCHOR_TX};
use anchorindex_core::{IndexerError, TransactionHandler};

pub struct AnchorIndexer {
    store: Arc<dyn KeyValueStore>,
}

impl AnchorIndexer {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Id of the transaction that first anchored `hex_hash`.
    pub async fn transaction_for(&self, hex_hash: &str) -> Result<Option<String>, IndexerError> {
        self.store
            .get(&keys::anchor(&hex_hash.to_ascii_lowercase()))
            .await
    }

    /// Anchored hashes carried by `tx`, as lowercase hex.
    fn anchors_in(tx: &Transaction) -> Vec<String> {
        if let Some(entry) = tx.anchor_entry() {
            let Some(value) = entry.binary_value() else {
                warn!(tx = %tx.id, entry_type = %entry.entry_type, "anchor entry is not binary");
                return vec![];
            };
            return match codec::to_hex(value, Encoding::Base64) {
                Ok(hex) => vec![hex],
                Err(e) => {
                    warn!(tx = %tx.id, error = %e, "undecodable anchor entry skipped");
                    vec![]
                }
            };
        }

        if tx.tx_type == ANCHOR_TX {
            return tx
                .anchors
                .iter()
                .filter_map(|anchor| match codec::to_hex(anchor, Encoding::Base58) {
                    Ok(hex) => Some(hex),
                    Err(e) => {
                        warn!(tx = %tx.id, error = %e, "undecodable anchor skipped");
                        None
                    }
                })
                .collect();
        }

        vec![]
    }
}

#[async_trait]
impl TransactionHandler for AnchorIndexer {
    async fn handle_transaction(
        &self,
        tx: &Transaction,
        ctx: &IndexContext,
    ) -> Result<(), IndexerError> {
        for hex in Self::anchors_in(tx) {
            let written = self.store.set_if_absent(&keys::anchor(&hex), &tx.id).await?;
            debug!(hash = %hex, tx = %tx.id, height = ctx.height, written, "anchor indexed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "anchor"
    }
}
