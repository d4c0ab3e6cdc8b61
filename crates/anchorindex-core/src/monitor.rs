//! The block monitor: a scheduled catch-up loop over the chain.
//!
//! Each pass:
//! 1. reads the persisted checkpoint `h` (or the configured starting height)
//! 2. reads the chain tip `t`
//! 3. for every height in `h+1..=t`: fetch the block, fan it out over the
//!    [`IndexBus`], and only then persist `checkpoint = height`
//! 4. stops at the first failure without advancing; the next pass retries
//!
//! Passes never overlap. Between passes the monitor waits a fixed interval;
//! [`MonitorHandle::stop`] cancels that wait but lets an in-flight pass finish.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::IndexBus;
use crate::chain::ChainClient;
use crate::checkpoint::CheckpointManager;
use crate::config::MonitorConfig;
use crate::error::IndexerError;
use crate::store::KeyValueStore;
use crate::types::SyncTick;

/// Runtime state of the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// No pass scheduled yet.
    Idle,
    /// A catch-up pass is running.
    Polling,
    /// Timer armed for the next pass.
    Waiting,
    /// Stopped; terminal.
    Stopped,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Polling => write!(f, "polling"),
            Self::Waiting => write!(f, "waiting"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Summary of one catch-up pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    /// Checkpoint at the start of the pass.
    pub from: u64,
    /// Chain tip observed at the start of the pass.
    pub tip: u64,
    /// Number of blocks fully processed.
    pub processed: u64,
    /// Checkpoint at the end of the pass.
    pub checkpoint: u64,
}

pub struct BlockMonitor {
    config: MonitorConfig,
    chain: Arc<dyn ChainClient>,
    bus: Arc<IndexBus>,
    checkpoint: CheckpointManager,
    state: Mutex<MonitorState>,
    /// Serialises passes, including manual `run_pass` calls.
    pass_lock: tokio::sync::Mutex<()>,
}

impl BlockMonitor {
    pub fn new(
        config: MonitorConfig,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn KeyValueStore>,
        bus: Arc<IndexBus>,
    ) -> Self {
        let checkpoint = CheckpointManager::new(store, config.starting_height);
        Self {
            config,
            chain,
            bus,
            checkpoint,
            state: Mutex::new(MonitorState::Idle),
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state.lock()
    }

    fn set_state(&self, state: MonitorState) {
        let mut current = self.state.lock();
        if *current != MonitorState::Stopped {
            *current = state;
        }
    }

    /// Last fully processed height, if any.
    pub async fn checkpoint(&self) -> Result<Option<u64>, IndexerError> {
        self.checkpoint.load().await
    }

    /// Run one catch-up pass from the checkpoint to the current tip.
    pub async fn run_pass(&self) -> Result<PassReport, IndexerError> {
        let _guard = self.pass_lock.lock().await;

        let stored = self.checkpoint.load().await?;
        let tip = self.chain.tip_height().await?;
        let from = match stored {
            Some(h) => h,
            None => {
                let initial = self.checkpoint.initial_height(tip);
                // Pin the start so a later restart does not move it.
                self.checkpoint.save(initial).await?;
                info!(height = initial, "no checkpoint found, starting fresh");
                initial
            }
        };

        let tick = SyncTick {
            tip_height: tip,
            checkpoint: from,
        };
        if let Err(e) = self.bus.emit_sync(&tick).await {
            warn!(error = %e, tip, "sync handlers failed");
        }

        let mut report = PassReport {
            from,
            tip,
            processed: 0,
            checkpoint: from,
        };
        if tip <= from {
            debug!(checkpoint = from, tip, "already at chain tip");
            return Ok(report);
        }

        for height in (from + 1)..=tip {
            let block = self
                .chain
                .block_at(height)
                .await?
                .ok_or(IndexerError::BlockNotFound { height })?;

            let fan_out = self.bus.index_block(&block).await?;
            self.checkpoint.save(height).await?;

            report.processed += 1;
            report.checkpoint = height;
            debug!(
                height,
                transactions = fan_out.transactions,
                duplicates = fan_out.duplicates,
                "block indexed"
            );
        }

        info!(
            from,
            to = report.checkpoint,
            blocks = report.processed,
            "catch-up pass complete"
        );
        Ok(report)
    }

    /// Spawn the polling loop. The first pass starts immediately.
    pub fn start(self: Arc<Self>) -> Result<MonitorHandle, IndexerError> {
        {
            let mut state = self.state.lock();
            if *state != MonitorState::Idle {
                return Err(IndexerError::Aborted {
                    reason: format!("monitor cannot start from state '{state}'"),
                });
            }
            *state = MonitorState::Polling;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor = Arc::clone(&self);
        let task = tokio::spawn(async move { monitor.run_loop(shutdown_rx).await });

        info!(
            interval_ms = self.config.poll_interval_ms,
            start = %self.config.starting_height,
            "block monitor started"
        );
        Ok(MonitorHandle {
            shutdown: shutdown_tx,
            task,
            monitor: self,
        })
    }

    async fn run_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.poll_interval();
        loop {
            self.set_state(MonitorState::Polling);
            match self.run_pass().await {
                Ok(report) if report.processed > 0 => {
                    debug!(checkpoint = report.checkpoint, "pass finished");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        error = %e,
                        transient = e.is_transient(),
                        "pass aborted, retrying from checkpoint on next tick"
                    );
                }
            }

            if *shutdown.borrow() {
                break;
            }
            self.set_state(MonitorState::Waiting);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
        }
        *self.state.lock() = MonitorState::Stopped;
        info!("block monitor stopped");
    }
}

/// Handle returned by [`BlockMonitor::start`].
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    monitor: Arc<BlockMonitor>,
}

impl MonitorHandle {
    pub fn state(&self) -> MonitorState {
        self.monitor.state()
    }

    /// Cancel the scheduled pass and wait for any in-flight pass to finish.
    pub async fn stop(self) -> Result<(), IndexerError> {
        // The receiver only disappears once the loop has already exited.
        let _ = self.shutdown.send(true);
        self.task.await.map_err(|e| IndexerError::Aborted {
            reason: format!("monitor task failed: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BlockHandler;
    use crate::store::MemoryStore;
    use crate::testing::{block, MockChain};
    use crate::types::Block;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct BlockCounter {
        heights: Mutex<Vec<u64>>,
        fail_at: Mutex<Option<u64>>,
    }

    #[async_trait]
    impl BlockHandler for BlockCounter {
        async fn handle_block(&self, block: &Block) -> Result<(), IndexerError> {
            if *self.fail_at.lock() == Some(block.height) {
                return Err(IndexerError::Storage("write failed".into()));
            }
            self.heights.lock().push(block.height);
            Ok(())
        }
        fn name(&self) -> &str {
            "counter"
        }
    }

    fn setup(
        chain: Arc<MockChain>,
        config: MonitorConfig,
    ) -> (Arc<BlockMonitor>, Arc<BlockCounter>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let counter = Arc::new(BlockCounter::default());
        let mut bus = IndexBus::new();
        bus.subscribe_block(counter.clone());
        let monitor = Arc::new(BlockMonitor::new(config, chain, store.clone(), Arc::new(bus)));
        (monitor, counter, store)
    }

    fn five_blocks() -> Arc<MockChain> {
        Arc::new(MockChain::with_blocks((1..=5).map(|h| block(h, "G", vec![]))))
    }

    #[tokio::test]
    async fn full_pass_advances_checkpoint_to_tip() {
        let chain = five_blocks();
        let (monitor, counter, _) = setup(chain.clone(), MonitorConfig::default());

        let report = monitor.run_pass().await.unwrap();
        assert_eq!(report.from, 0);
        assert_eq!(report.processed, 5);
        assert_eq!(monitor.checkpoint().await.unwrap(), Some(5));
        assert_eq!(chain.block_fetches(), 5);
        assert_eq!(*counter.heights.lock(), vec![1, 2, 3, 4, 5]);

        // Nothing new: no fetches, no fan-out.
        let report = monitor.run_pass().await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(chain.block_fetches(), 5);
    }

    #[tokio::test]
    async fn failure_stops_pass_without_advancing() {
        let chain = five_blocks();
        chain.fail_height(3);
        let (monitor, counter, _) = setup(chain.clone(), MonitorConfig::default());

        assert!(monitor.run_pass().await.is_err());
        assert_eq!(monitor.checkpoint().await.unwrap(), Some(2));

        chain.clear_failures();
        let report = monitor.run_pass().await.unwrap();
        assert_eq!(report.from, 2);
        assert_eq!(report.checkpoint, 5);
        assert_eq!(*counter.heights.lock(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn handler_failure_reprocesses_block() {
        let chain = five_blocks();
        let (monitor, counter, _) = setup(chain, MonitorConfig::default());
        *counter.fail_at.lock() = Some(4);

        assert!(monitor.run_pass().await.is_err());
        assert_eq!(monitor.checkpoint().await.unwrap(), Some(3));

        *counter.fail_at.lock() = None;
        monitor.run_pass().await.unwrap();
        assert_eq!(monitor.checkpoint().await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn missing_block_is_not_skipped() {
        let chain = five_blocks();
        chain.set_tip(6);
        let (monitor, _, _) = setup(chain, MonitorConfig::default());

        let err = monitor.run_pass().await.unwrap_err();
        assert!(matches!(err, IndexerError::BlockNotFound { height: 6 }));
        assert_eq!(monitor.checkpoint().await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn resumes_from_persisted_checkpoint() {
        let chain = five_blocks();
        let (monitor, counter, store) = setup(chain.clone(), MonitorConfig::default());
        store
            .set(&crate::store::keys::processing_height(), "3")
            .await
            .unwrap();

        monitor.run_pass().await.unwrap();
        assert_eq!(*counter.heights.lock(), vec![4, 5]);
        assert_eq!(chain.block_fetches(), 2);
    }

    #[tokio::test]
    async fn starting_at_last_skips_history() {
        let chain = five_blocks();
        let config = MonitorConfig::new().starting_height(crate::config::StartingHeight::Last);
        let (monitor, counter, _) = setup(chain.clone(), config);

        let report = monitor.run_pass().await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(monitor.checkpoint().await.unwrap(), Some(5));

        chain.push_block(block(6, "G", vec![]));
        monitor.run_pass().await.unwrap();
        assert_eq!(*counter.heights.lock(), vec![6]);
    }

    #[tokio::test]
    async fn offline_chain_leaves_state_untouched() {
        let chain = five_blocks();
        chain.set_offline(true);
        let (monitor, _, store) = setup(chain, MonitorConfig::default());

        let err = monitor.run_pass().await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn loop_runs_and_stops() {
        let chain = five_blocks();
        let config = MonitorConfig::new().poll_interval_ms(20);
        let (monitor, counter, _) = setup(chain.clone(), config);
        assert_eq!(monitor.state(), MonitorState::Idle);

        let handle = monitor.clone().start().unwrap();
        assert!(monitor.clone().start().is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        chain.push_block(block(6, "G", vec![]));
        tokio::time::sleep(Duration::from_millis(100)).await;

        handle.stop().await.unwrap();
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert_eq!(*counter.heights.lock(), vec![1, 2, 3, 4, 5, 6]);

        let fetches = chain.block_fetches();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(chain.block_fetches(), fetches);
    }

    #[tokio::test]
    async fn passes_never_overlap() {
        struct Slow(AtomicU32, AtomicU32);

        #[async_trait]
        impl BlockHandler for Slow {
            async fn handle_block(&self, _block: &Block) -> Result<(), IndexerError> {
                let active = self.0.fetch_add(1, Ordering::SeqCst) + 1;
                self.1.fetch_max(active, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                self.0.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
            fn name(&self) -> &str {
                "slow"
            }
        }

        let chain = five_blocks();
        let slow = Arc::new(Slow(AtomicU32::new(0), AtomicU32::new(0)));
        let mut bus = IndexBus::new();
        bus.subscribe_block(slow.clone());
        let monitor = Arc::new(BlockMonitor::new(
            MonitorConfig::default(),
            chain.clone(),
            Arc::new(MemoryStore::new()),
            Arc::new(bus),
        ));

        let (a, b) = tokio::join!(monitor.run_pass(), monitor.run_pass());
        let processed = a.unwrap().processed + b.unwrap().processed;
        assert_eq!(processed, 5);
        assert_eq!(slow.1.load(Ordering::SeqCst), 1);
        assert_eq!(chain.block_fetches(), 5);
    }
}
