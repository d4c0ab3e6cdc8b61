//! Index bus: typed publish/subscribe between block ingestion and the
//! derived-state processors.
//!
//! Three event kinds: *block-indexed*, *transaction-indexed* and
//! *sync-tick*. Delivery is in-process and awaited: each emit runs every
//! subscriber of that kind in subscription order and stops at the first
//! error, so a slow or failing processor holds back the checkpoint.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::IndexerError;
use crate::types::{Block, IndexContext, SyncTick, Transaction};

/// Subscriber to *block-indexed* events.
#[async_trait]
pub trait BlockHandler: Send + Sync {
    async fn handle_block(&self, block: &Block) -> Result<(), IndexerError>;

    fn name(&self) -> &str;
}

/// Subscriber to *transaction-indexed* events.
#[async_trait]
pub trait TransactionHandler: Send + Sync {
    async fn handle_transaction(
        &self,
        tx: &Transaction,
        ctx: &IndexContext,
    ) -> Result<(), IndexerError>;

    fn name(&self) -> &str;
}

/// Subscriber to *sync-tick* events (one per monitor pass).
#[async_trait]
pub trait SyncHandler: Send + Sync {
    async fn handle_sync(&self, tick: &SyncTick) -> Result<(), IndexerError>;

    fn name(&self) -> &str;
}

/// What happened while a block was fanned out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub transactions: usize,
    pub duplicates: usize,
}

/// The bus. Subscriptions are registered at startup, before the bus is shared.
#[derive(Default)]
pub struct IndexBus {
    block_handlers: Vec<Arc<dyn BlockHandler>>,
    transaction_handlers: Vec<Arc<dyn TransactionHandler>>,
    sync_handlers: Vec<Arc<dyn SyncHandler>>,
    /// Transaction ids already delivered while fanning out the current block.
    seen: Mutex<HashSet<String>>,
}

impl IndexBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_block(&mut self, handler: Arc<dyn BlockHandler>) {
        debug!(handler = handler.name(), "subscribed to block events");
        self.block_handlers.push(handler);
    }

    pub fn subscribe_transaction(&mut self, handler: Arc<dyn TransactionHandler>) {
        debug!(handler = handler.name(), "subscribed to transaction events");
        self.transaction_handlers.push(handler);
    }

    pub fn subscribe_sync(&mut self, handler: Arc<dyn SyncHandler>) {
        debug!(handler = handler.name(), "subscribed to sync events");
        self.sync_handlers.push(handler);
    }

    /// Number of subscribers across all event kinds.
    pub fn subscriber_count(&self) -> usize {
        self.block_handlers.len() + self.transaction_handlers.len() + self.sync_handlers.len()
    }

    /// Deliver a *block-indexed* event.
    pub async fn emit_block(&self, block: &Block) -> Result<(), IndexerError> {
        for handler in &self.block_handlers {
            handler
                .handle_block(block)
                .await
                .map_err(|e| wrap(handler.name(), e))?;
        }
        Ok(())
    }

    /// Deliver a *transaction-indexed* event unless the id was already
    /// delivered for the current block. Returns `true` if delivered.
    pub async fn emit_transaction(
        &self,
        tx: &Transaction,
        ctx: &IndexContext,
    ) -> Result<bool, IndexerError> {
        if !self.seen.lock().insert(tx.id.clone()) {
            trace!(tx = %tx.id, height = ctx.height, "duplicate transaction suppressed");
            return Ok(false);
        }
        for handler in &self.transaction_handlers {
            handler
                .handle_transaction(tx, ctx)
                .await
                .map_err(|e| wrap(handler.name(), e))?;
        }
        Ok(true)
    }

    /// Deliver a *sync-tick* event.
    pub async fn emit_sync(&self, tick: &SyncTick) -> Result<(), IndexerError> {
        for handler in &self.sync_handlers {
            handler
                .handle_sync(tick)
                .await
                .map_err(|e| wrap(handler.name(), e))?;
        }
        Ok(())
    }

    /// Fan a block out: reset the dedup cache, emit the block, then each
    /// transaction in block order.
    pub async fn index_block(&self, block: &Block) -> Result<FanOut, IndexerError> {
        self.seen.lock().clear();
        self.emit_block(block).await?;

        let ctx = IndexContext::for_block(block);
        let mut fan_out = FanOut::default();
        for tx in &block.transactions {
            if self.emit_transaction(tx, &ctx).await? {
                fan_out.transactions += 1;
            } else {
                fan_out.duplicates += 1;
            }
        }
        Ok(fan_out)
    }
}

fn wrap(handler: &str, err: IndexerError) -> IndexerError {
    match err {
        // Keep infrastructure errors recognisable to the monitor.
        e @ (IndexerError::Handler { .. }
        | IndexerError::Rpc(_)
        | IndexerError::StoreUnavailable(_)) => e,
        other => IndexerError::handler(handler, other),
    }
}
