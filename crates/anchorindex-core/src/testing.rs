//! Scripted in-memory chain for tests (feature `testing`).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::chain::ChainClient;
use crate::error::IndexerError;
use crate::types::{ActivationStatus, BalanceDetails, Block, PublicKeyRecord, Transaction};

/// Build a block with the given generator and transactions.
pub fn block(height: u64, generator: &str, transactions: Vec<Transaction>) -> Block {
    Block {
        height,
        timestamp: 1_700_000_000_000 + height as i64 * 60_000,
        generator: generator.to_string(),
        generator_reward: 100,
        burned_fees: 0,
        transaction_count: transactions.len() as u32,
        transactions,
    }
}

/// Build a bare transaction of `tx_type` sent by `sender`.
pub fn transaction(id: &str, tx_type: u8, sender: &str) -> Transaction {
    Transaction {
        id: id.to_string(),
        tx_type,
        sender: sender.to_string(),
        sender_public_key: format!("pk-{sender}"),
        sender_key_type: "ed25519".into(),
        recipient: None,
        association_type: None,
        hash: None,
        data: vec![],
        anchors: vec![],
        fee: 100_000_000,
    }
}

#[derive(Default)]
struct MockState {
    blocks: HashMap<u64, Block>,
    tip: Option<u64>,
    balances: HashMap<String, BalanceDetails>,
    activation: ActivationStatus,
    public_keys: HashMap<String, PublicKeyRecord>,
    submitted: Vec<(String, String, String)>,
    failing_heights: HashSet<u64>,
    offline: bool,
    reject_submissions: Option<String>,
}

/// In-memory [`ChainClient`] whose responses are scripted by the test.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<MockState>,
    block_fetches: AtomicU32,
    balance_fetches: AtomicU32,
    activation_fetches: AtomicU32,
    balance_delay: Mutex<Option<Duration>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain holding `blocks`; the tip is the highest height.
    pub fn with_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let chain = Self::new();
        for b in blocks {
            chain.push_block(b);
        }
        chain
    }

    pub fn push_block(&self, block: Block) {
        self.state.lock().blocks.insert(block.height, block);
    }

    /// Override the reported tip height.
    pub fn set_tip(&self, height: u64) {
        self.state.lock().tip = Some(height);
    }

    /// Set the balance reported for `address` (all balance kinds alike).
    pub fn set_balance(&self, address: &str, amount: u64) {
        self.state.lock().balances.insert(
            address.to_string(),
            BalanceDetails {
                address: address.to_string(),
                regular: amount,
                generating: amount,
                available: amount,
                effective: amount,
            },
        );
    }

    pub fn set_activation(&self, status: ActivationStatus) {
        self.state.lock().activation = status;
    }

    pub fn set_public_key(&self, address: &str, record: PublicKeyRecord) {
        self.state.lock().public_keys.insert(address.to_string(), record);
    }

    /// Make `block_at(height)` fail with an RPC error until cleared.
    pub fn fail_height(&self, height: u64) {
        self.state.lock().failing_heights.insert(height);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing_heights.clear();
        state.offline = false;
    }

    /// Make every call fail with an RPC error.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn reject_submissions(&self, reason: &str) {
        self.state.lock().reject_submissions = Some(reason.to_string());
    }

    /// Delay every balance lookup (to widen race windows in tests).
    pub fn set_balance_delay(&self, delay: Duration) {
        *self.balance_delay.lock() = Some(delay);
    }

    pub fn block_fetches(&self) -> u32 {
        self.block_fetches.load(Ordering::SeqCst)
    }

    pub fn balance_fetches(&self) -> u32 {
        self.balance_fetches.load(Ordering::SeqCst)
    }

    pub fn activation_fetches(&self) -> u32 {
        self.activation_fetches.load(Ordering::SeqCst)
    }

    /// `(sender, key, base64_value)` of every accepted submission.
    pub fn submitted(&self) -> Vec<(String, String, String)> {
        self.state.lock().submitted.clone()
    }

    fn check_online(&self) -> Result<(), IndexerError> {
        if self.state.lock().offline {
            return Err(IndexerError::Rpc("node unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn tip_height(&self) -> Result<u64, IndexerError> {
        self.check_online()?;
        let state = self.state.lock();
        Ok(state
            .tip
            .or_else(|| state.blocks.keys().max().copied())
            .unwrap_or(0))
    }

    async fn block_at(&self, height: u64) -> Result<Option<Block>, IndexerError> {
        self.check_online()?;
        self.block_fetches.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if state.failing_heights.contains(&height) {
            return Err(IndexerError::Rpc(format!("timeout fetching block {height}")));
        }
        Ok(state.blocks.get(&height).cloned())
    }

    async fn balance_details(&self, address: &str) -> Result<BalanceDetails, IndexerError> {
        self.check_online()?;
        self.balance_fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.balance_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .state
            .lock()
            .balances
            .get(address)
            .cloned()
            .unwrap_or_else(|| BalanceDetails {
                address: address.to_string(),
                ..Default::default()
            }))
    }

    async fn activation_status(&self) -> Result<ActivationStatus, IndexerError> {
        self.check_online()?;
        self.activation_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().activation.clone())
    }

    async fn submit_data_transaction(
        &self,
        sender: &str,
        key: &str,
        base64_value: &str,
    ) -> Result<String, IndexerError> {
        self.check_online()?;
        let mut state = self.state.lock();
        if let Some(reason) = &state.reject_submissions {
            return Err(IndexerError::Submission(reason.clone()));
        }
        state
            .submitted
            .push((sender.to_string(), key.to_string(), base64_value.to_string()));
        Ok(format!("mock-tx-{}", state.submitted.len()))
    }

    async fn wallet_address(&self) -> Result<String, IndexerError> {
        self.check_online()?;
        Ok("3MockWalletAddress".into())
    }

    async fn public_key_of(&self, address: &str) -> Result<Option<PublicKeyRecord>, IndexerError> {
        self.check_online()?;
        Ok(self.state.lock().public_keys.get(address).cloned())
    }
}
