//! Checkpoint manager: persists the last fully processed block height.
//!
//! The checkpoint only moves after a block's whole fan-out succeeded, so on
//! restart processing resumes at `checkpoint + 1` and never skips work.

use std::sync::Arc;

use tracing::debug;

use crate::config::StartingHeight;
use crate::error::IndexerError;
use crate::store::{keys, KeyValueStore};

/// Reads and writes the processing height in the store.
pub struct CheckpointManager {
    store: Arc<dyn KeyValueStore>,
    key: String,
    starting_height: StartingHeight,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn KeyValueStore>, starting_height: StartingHeight) -> Self {
        Self {
            store,
            key: keys::processing_height(),
            starting_height,
        }
    }

    /// Load the saved checkpoint (returns `None` if none exists).
    pub async fn load(&self) -> Result<Option<u64>, IndexerError> {
        match self.store.get(&self.key).await? {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| {
                IndexerError::Storage(format!("corrupt checkpoint value '{raw}'"))
            }),
        }
    }

    /// The checkpoint to assume when none is stored, given the current tip.
    pub fn initial_height(&self, tip_height: u64) -> u64 {
        match self.starting_height {
            StartingHeight::Height(n) => n,
            StartingHeight::Last => tip_height,
        }
    }

    /// Persist `height` as fully processed.
    pub async fn save(&self, height: u64) -> Result<(), IndexerError> {
        self.store.set(&self.key, &height.to_string()).await?;
        debug!(height, "checkpoint saved");
        Ok(())
    }
}
