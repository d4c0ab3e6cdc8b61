//! Circulating supply and the fee-burn counter.
//!
//! Once the fee-burn feature is active on chain, every non-genesis
//! transaction burns a fixed [`FEE_BURN_AMOUNT`]. The activation height is
//! looked up on chain until it is known, then served from the store.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use anchorindex_core::store::{keys, KeyValueStore};
use anchorindex_core::types::{Block, GENESIS_TX};
use anchorindex_core::{BlockHandler, ChainClient, IndexerError};

/// Base units per LTO.
pub const UNIT: u64 = 100_000_000;

/// Burned per qualifying transaction: 0.1 LTO.
pub const FEE_BURN_AMOUNT: u64 = UNIT / 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyConfig {
    /// Feature id whose activation starts the fee burn.
    pub fee_burn_feature_id: u16,
    /// Supply before any burn (base units).
    pub initial_supply: u64,
}

impl Default for SupplyConfig {
    fn default() -> Self {
        Self {
            fee_burn_feature_id: 15,
            initial_supply: 500_000_000 * UNIT,
        }
    }
}

impl SupplyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fee_burn_feature_id(mut self, id: u16) -> Self {
        self.fee_burn_feature_id = id;
        self
    }

    pub fn initial_supply(mut self, base_units: u64) -> Self {
        self.initial_supply = base_units;
        self
    }
}

/// Format base units as a decimal LTO amount with eight fraction digits.
pub fn format_units(amount: u64) -> String {
    format!("{}.{:08}", amount / UNIT, amount % UNIT)
}

pub struct SupplyTracker {
    config: SupplyConfig,
    store: Arc<dyn KeyValueStore>,
    chain: Arc<dyn ChainClient>,
    /// Serialises the counter's read-modify-write.
    counter_lock: Mutex<()>,
}

impl SupplyTracker {
    pub fn new(config: SupplyConfig, store: Arc<dyn KeyValueStore>, chain: Arc<dyn ChainClient>) -> Self {
        Self {
            config,
            store,
            chain,
            counter_lock: Mutex::new(()),
        }
    }

    /// Total burned so far (base units).
    pub async fn fee_burned(&self) -> Result<u64, IndexerError> {
        read_u64(self.store.as_ref(), &keys::fee_burn()).await.map(|v| v.unwrap_or(0))
    }

    /// Initial supply minus everything burned (base units).
    pub async fn circulating_supply(&self) -> Result<u64, IndexerError> {
        let burned = self.fee_burned().await?;
        Ok(self.config.initial_supply.saturating_sub(burned))
    }

    async fn activation_height(&self) -> Result<Option<u64>, IndexerError> {
        let key = keys::feature_activation(self.config.fee_burn_feature_id);
        if let Some(height) = read_u64(self.store.as_ref(), &key).await? {
            return Ok(Some(height));
        }
        let status = self.chain.activation_status().await?;
        let Some(height) = status.activation_height(self.config.fee_burn_feature_id) else {
            return Ok(None);
        };
        self.store.set(&key, &height.to_string()).await?;
        info!(
            feature = self.config.fee_burn_feature_id,
            height, "fee burn activation height cached"
        );
        Ok(Some(height))
    }

    /// Whether transactions at `height` burn fees.
    pub async fn is_fee_burn_active(&self, height: u64) -> Result<bool, IndexerError> {
        Ok(self
            .activation_height()
            .await?
            .is_some_and(|activation| height >= activation))
    }

    /// Count one qualifying transaction at `height`. Returns `true` if the
    /// counter moved.
    pub async fn increment_fee_burned(&self, height: u64) -> Result<bool, IndexerError> {
        self.increment_fee_burned_by(height, 1).await
    }

    /// Count `transactions` qualifying transactions at `height`.
    pub async fn increment_fee_burned_by(
        &self,
        height: u64,
        transactions: u64,
    ) -> Result<bool, IndexerError> {
        if transactions == 0 || !self.is_fee_burn_active(height).await? {
            return Ok(false);
        }
        let _guard = self.counter_lock.lock().await;
        let burned = self.fee_burned().await? + transactions * FEE_BURN_AMOUNT;
        self.store.set(&keys::fee_burn(), &burned.to_string()).await?;
        debug!(height, transactions, burned, "fee burn counted");
        Ok(true)
    }
}

async fn read_u64(store: &dyn KeyValueStore, key: &str) -> Result<Option<u64>, IndexerError> {
    match store.get(key).await? {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| IndexerError::Storage(format!("corrupt counter '{key}' = '{raw}'"))),
    }
}

#[async_trait]
impl BlockHandler for SupplyTracker {
    async fn handle_block(&self, block: &Block) -> Result<(), IndexerError> {
        // A block already counted must not burn twice when reprocessed.
        let height_key = keys::fee_burn_height();
        if let Some(last) = read_u64(self.store.as_ref(), &height_key).await? {
            if block.height <= last {
                return Ok(());
            }
        }
        let qualifying = block
            .transactions
            .iter()
            .filter(|tx| tx.tx_type != GENESIS_TX)
            .count() as u64;
        self.increment_fee_burned_by(block.height, qualifying).await?;
        self.store
            .set(&height_key, &block.height.to_string())
            .await
    }

    fn name(&self) -> &str {
        "supply"
    }
}
