//! Generator statistics over a trailing window of `delta` blocks.
//!
//! The engine keeps per-generator block count, reward and generating balance
//! for the most recent `delta` blocks. Every read-modify-write (bootstrap,
//! new block) runs under one async mutex, so a new block can never interleave
//! with a bootstrap that is still fetching history.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{future, stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use anchorindex_core::types::{Block, SyncTick};
use anchorindex_core::{BlockHandler, ChainClient, IndexerError, SyncHandler};

/// Concurrent block fetches during bootstrap.
const BOOTSTRAP_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Window size in blocks.
    pub delta: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self { delta: 1_000 }
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delta(mut self, delta: u64) -> Self {
        self.delta = delta;
        self
    }
}

/// Statistics of one generator within the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorStats {
    pub address: String,
    /// Blocks generated within the window.
    pub blocks: u64,
    /// Rewards earned within the window (base units).
    pub reward: u64,
    /// Current generating balance (base units).
    pub balance: u64,
    /// `balance / Σ balance`, 0 when the total is 0.
    pub share: f64,
}

#[derive(Debug, Default, Clone)]
struct Entry {
    blocks: u64,
    reward: u64,
    balance: u64,
    share: f64,
}

#[derive(Debug, Default)]
struct Window {
    generators: HashMap<String, Entry>,
    /// Newest block counted; `None` until bootstrapped.
    last_height: Option<u64>,
    last_generator: Option<String>,
}

impl Window {
    fn add(&mut self, block: &Block) {
        let entry = self.generators.entry(block.generator.clone()).or_default();
        entry.blocks += 1;
        entry.reward += block.generator_reward;
    }

    fn subtract(&mut self, block: &Block) {
        let Some(entry) = self.generators.get_mut(&block.generator) else {
            return;
        };
        entry.blocks = entry.blocks.saturating_sub(1);
        entry.reward = entry.reward.saturating_sub(block.generator_reward);
        if entry.blocks == 0 {
            self.generators.remove(&block.generator);
        }
    }

    fn recompute_shares(&mut self) {
        let total: u64 = self.generators.values().map(|e| e.balance).sum();
        for entry in self.generators.values_mut() {
            entry.share = if total == 0 {
                0.0
            } else {
                entry.balance as f64 / total as f64
            };
        }
    }
}

pub struct GeneratorStatsEngine {
    config: GeneratorConfig,
    chain: Arc<dyn ChainClient>,
    window: Mutex<Window>,
}

impl GeneratorStatsEngine {
    pub fn new(config: GeneratorConfig, chain: Arc<dyn ChainClient>) -> Self {
        Self {
            config,
            chain,
            window: Mutex::new(Window::default()),
        }
    }

    pub async fn is_bootstrapped(&self) -> bool {
        self.window.lock().await.last_height.is_some()
    }

    /// Current statistics, sorted by balance descending.
    pub async fn stats(&self) -> Vec<GeneratorStats> {
        let window = self.window.lock().await;
        let mut out: Vec<GeneratorStats> = window
            .generators
            .iter()
            .map(|(address, e)| GeneratorStats {
                address: address.clone(),
                blocks: e.blocks,
                reward: e.reward,
                balance: e.balance,
                share: e.share,
            })
            .collect();
        out.sort_by(|a, b| b.balance.cmp(&a.balance).then_with(|| a.address.cmp(&b.address)));
        out
    }

    /// Rebuild the window from the `delta` blocks ending at `tip_height`.
    pub async fn bootstrap(&self, tip_height: u64) -> Result<(), IndexerError> {
        let mut window = self.window.lock().await;
        self.rebuild(&mut window, tip_height).await
    }

    /// The window is replaced only once the whole rebuild succeeded.
    async fn rebuild(&self, window: &mut Window, tip_height: u64) -> Result<(), IndexerError> {
        let from = tip_height.saturating_sub(self.config.delta).saturating_add(1).max(1);
        let blocks: Vec<Block> = stream::iter(from..=tip_height)
            .map(|height| async move {
                self.chain
                    .block_at(height)
                    .await?
                    .ok_or(IndexerError::BlockNotFound { height })
            })
            .buffered(BOOTSTRAP_CONCURRENCY)
            .try_collect()
            .await?;

        let mut fresh = Window::default();
        for block in &blocks {
            fresh.add(block);
        }
        let addresses: Vec<String> = fresh.generators.keys().cloned().collect();
        self.refresh_balances(&mut fresh, &addresses).await?;
        fresh.recompute_shares();
        fresh.last_height = Some(tip_height);
        fresh.last_generator = blocks.last().map(|b| b.generator.clone());

        info!(
            from,
            to = tip_height,
            generators = fresh.generators.len(),
            "generator stats bootstrapped"
        );
        *window = fresh;
        Ok(())
    }

    /// Slide the window forward by one block.
    pub async fn on_new_block(&self, block: &Block) -> Result<(), IndexerError> {
        let mut window = self.window.lock().await;
        let Some(last) = window.last_height else {
            debug!(height = block.height, "generator stats not bootstrapped, block ignored");
            return Ok(());
        };
        if block.height <= last {
            return Ok(());
        }
        if block.height > last + 1 {
            debug!(last, height = block.height, "gap in generator window, rebuilding");
            return self.rebuild(&mut window, block.height).await;
        }

        let leaving = if block.height > self.config.delta {
            let height = block.height - self.config.delta;
            Some(
                self.chain
                    .block_at(height)
                    .await?
                    .ok_or(IndexerError::BlockNotFound { height })?,
            )
        } else {
            None
        };

        // Work on a copy so a failed balance lookup leaves the window intact.
        let mut next = Window {
            generators: window.generators.clone(),
            last_height: window.last_height,
            last_generator: window.last_generator.clone(),
        };
        if let Some(leaving) = &leaving {
            next.subtract(leaving);
        }
        next.add(block);

        let mut changed: HashSet<&str> = block.touched_addresses().into_iter().collect();
        if let Some(previous) = window.last_generator.as_deref() {
            changed.insert(previous);
        }
        let refresh: Vec<String> = changed
            .into_iter()
            .filter(|a| next.generators.contains_key(*a))
            .map(str::to_string)
            .collect();
        self.refresh_balances(&mut next, &refresh).await?;
        next.recompute_shares();
        next.last_height = Some(block.height);
        next.last_generator = Some(block.generator.clone());

        debug!(
            height = block.height,
            generator = %block.generator,
            refreshed = refresh.len(),
            "generator window advanced"
        );
        *window = next;
        Ok(())
    }

    async fn refresh_balances(
        &self,
        window: &mut Window,
        addresses: &[String],
    ) -> Result<(), IndexerError> {
        let balances = future::try_join_all(
            addresses
                .iter()
                .map(|address| self.chain.balance_details(address)),
        )
        .await?;
        for details in balances {
            if let Some(entry) = window.generators.get_mut(&details.address) {
                entry.balance = details.generating;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BlockHandler for GeneratorStatsEngine {
    async fn handle_block(&self, block: &Block) -> Result<(), IndexerError> {
        self.on_new_block(block).await
    }

    fn name(&self) -> &str {
        "generator-stats"
    }
}

#[async_trait]
impl SyncHandler for GeneratorStatsEngine {
    /// Bootstrap once, aligned with the monitor's checkpoint so the blocks of
    /// this pass continue the window.
    async fn handle_sync(&self, tick: &SyncTick) -> Result<(), IndexerError> {
        if self.is_bootstrapped().await {
            return Ok(());
        }
        self.bootstrap(tick.checkpoint).await
    }

    fn name(&self) -> &str {
        "generator-stats"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorindex_core::testing::{block, transaction, MockChain};
    use anchorindex_core::types::TRANSFER_TX;
    use std::time::Duration;

    fn chain_with(generators: &[&str]) -> Arc<MockChain> {
        let chain = MockChain::with_blocks(
            generators
                .iter()
                .enumerate()
                .map(|(i, g)| block(i as u64 + 1, g, vec![])),
        );
        Arc::new(chain)
    }

    fn find<'a>(stats: &'a [GeneratorStats], address: &str) -> &'a GeneratorStats {
        stats.iter().find(|s| s.address == address).unwrap()
    }

    #[tokio::test]
    async fn bootstrap_accumulates_window() {
        let chain = chain_with(&["A", "B", "A", "C", "A"]);
        chain.set_balance("A", 600);
        chain.set_balance("B", 300);
        chain.set_balance("C", 100);
        let engine = GeneratorStatsEngine::new(GeneratorConfig::new().delta(4), chain);

        engine.bootstrap(5).await.unwrap();
        let stats = engine.stats().await;

        // Window is blocks 2..=5.
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].address, "A");
        assert_eq!(find(&stats, "A").blocks, 2);
        assert_eq!(find(&stats, "A").reward, 200);
        assert_eq!(find(&stats, "B").blocks, 1);
        assert!((find(&stats, "A").share - 0.6).abs() < 1e-9);

        let total: f64 = stats.iter().map(|s| s.share).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn new_block_slides_window() {
        let chain = chain_with(&["A", "B", "C"]);
        for g in ["A", "B", "C", "D"] {
            chain.set_balance(g, 100);
        }
        let engine = GeneratorStatsEngine::new(GeneratorConfig::new().delta(3), chain.clone());
        engine.bootstrap(3).await.unwrap();

        let b4 = block(4, "D", vec![]);
        chain.push_block(b4.clone());
        engine.on_new_block(&b4).await.unwrap();

        let stats = engine.stats().await;
        // A (block 1) left the window.
        assert!(stats.iter().all(|s| s.address != "A"));
        assert_eq!(stats.len(), 3);
        for s in &stats {
            assert!((s.share - 1.0 / 3.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn reprocessed_block_is_ignored() {
        let chain = chain_with(&["A", "B"]);
        chain.set_balance("A", 10);
        let engine = GeneratorStatsEngine::new(GeneratorConfig::new().delta(10), chain.clone());
        engine.bootstrap(2).await.unwrap();

        let b2 = chain.block_at(2).await.unwrap().unwrap();
        engine.on_new_block(&b2).await.unwrap();
        assert_eq!(find(&engine.stats().await, "B").blocks, 1);
    }

    #[tokio::test]
    async fn only_touched_balances_are_refreshed() {
        let chain = chain_with(&["A", "B"]);
        chain.set_balance("A", 10);
        chain.set_balance("B", 10);
        let engine = GeneratorStatsEngine::new(GeneratorConfig::new().delta(10), chain.clone());
        engine.bootstrap(2).await.unwrap();
        let fetches = chain.balance_fetches();

        // Block 3 by A with a transfer from X to Y: only A and the previous
        // generator B are generators; X and Y are not in the map.
        let mut tx = transaction("t", TRANSFER_TX, "X");
        tx.recipient = Some("Y".into());
        let b3 = block(3, "A", vec![tx]);
        chain.push_block(b3.clone());
        chain.set_balance("A", 30);
        engine.on_new_block(&b3).await.unwrap();

        assert_eq!(chain.balance_fetches() - fetches, 2);
        let stats = engine.stats().await;
        assert_eq!(stats[0].address, "A");
        assert!((stats[0].share - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn zero_balances_give_zero_shares() {
        let chain = chain_with(&["A", "B"]);
        let engine = GeneratorStatsEngine::new(GeneratorConfig::default(), chain);
        engine.bootstrap(2).await.unwrap();
        assert!(engine.stats().await.iter().all(|s| s.share == 0.0));
    }

    #[tokio::test]
    async fn gap_triggers_rebuild() {
        let chain = chain_with(&["A", "B", "C", "D"]);
        let engine = GeneratorStatsEngine::new(GeneratorConfig::new().delta(10), chain.clone());
        engine.bootstrap(1).await.unwrap();

        let b4 = chain.block_at(4).await.unwrap().unwrap();
        engine.on_new_block(&b4).await.unwrap();
        assert_eq!(engine.stats().await.len(), 4);
    }

    #[tokio::test]
    async fn blocks_before_bootstrap_are_ignored() {
        let chain = chain_with(&["A"]);
        let engine = GeneratorStatsEngine::new(GeneratorConfig::default(), chain.clone());
        engine.on_new_block(&block(1, "A", vec![])).await.unwrap();
        assert!(engine.stats().await.is_empty());

        engine
            .handle_sync(&SyncTick {
                tip_height: 1,
                checkpoint: 0,
            })
            .await
            .unwrap();
        assert!(engine.is_bootstrapped().await);
        engine.on_new_block(&block(1, "A", vec![])).await.unwrap();
        assert_eq!(engine.stats().await[0].blocks, 1);
    }

    #[tokio::test]
    async fn new_block_waits_for_bootstrap() {
        let chain = chain_with(&["A", "B", "C"]);
        chain.set_balance_delay(Duration::from_millis(20));
        let engine = Arc::new(GeneratorStatsEngine::new(
            GeneratorConfig::new().delta(10),
            chain.clone(),
        ));

        let b3 = chain.block_at(3).await.unwrap().unwrap();
        let bootstrapping = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.bootstrap(2).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        engine.on_new_block(&b3).await.unwrap();
        bootstrapping.await.unwrap().unwrap();

        // Block 3 was applied after the bootstrap, not lost under it.
        assert_eq!(engine.stats().await.len(), 3);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_window() {
        let chain = chain_with(&["A", "B"]);
        let engine = GeneratorStatsEngine::new(GeneratorConfig::new().delta(10), chain.clone());
        engine.bootstrap(2).await.unwrap();

        chain.set_offline(true);
        assert!(engine.on_new_block(&block(3, "C", vec![])).await.is_err());
        chain.set_offline(false);
        assert_eq!(engine.stats().await.len(), 2);
        engine.on_new_block(&block(3, "C", vec![])).await.unwrap();
        assert_eq!(engine.stats().await.len(), 3);
    }
}
