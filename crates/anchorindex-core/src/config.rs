//! Monitor configuration and runtime state types.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Where to start indexing when no checkpoint has been persisted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartingHeight {
    /// Treat this height as already processed; indexing begins at `n + 1`.
    Height(u64),
    /// Skip history: the chain tip at first start becomes the checkpoint.
    Last,
}

impl Default for StartingHeight {
    fn default() -> Self {
        Self::Height(0)
    }
}

impl FromStr for StartingHeight {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "last" => Ok(Self::Last),
            n => n
                .parse::<u64>()
                .map(Self::Height)
                .map_err(|_| IndexerError::Config(format!("invalid starting height '{s}'"))),
        }
    }
}

impl fmt::Display for StartingHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Height(n) => write!(f, "{n}"),
            Self::Last => write!(f, "last"),
        }
    }
}

/// Configuration for the block monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Delay between the end of one pass and the start of the next (milliseconds).
    pub poll_interval_ms: u64,
    /// Used only when the store holds no checkpoint.
    pub starting_height: StartingHeight,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            starting_height: StartingHeight::default(),
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the starting height used on first start.
    pub fn starting_height(mut self, height: StartingHeight) -> Self {
        self.starting_height = height;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_height_parse() {
        assert_eq!("last".parse::<StartingHeight>().unwrap(), StartingHeight::Last);
        assert_eq!(
            " 1200 ".parse::<StartingHeight>().unwrap(),
            StartingHeight::Height(1200)
        );
        assert!("yesterday".parse::<StartingHeight>().is_err());
        assert_eq!(StartingHeight::Last.to_string(), "last");
    }

    #[test]
    fn config_defaults_and_setters() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.poll_interval(), Duration::from_secs(10));
        assert_eq!(cfg.starting_height, StartingHeight::Height(0));

        let cfg = MonitorConfig::new()
            .poll_interval_ms(250)
            .starting_height(StartingHeight::Last);
        assert_eq!(cfg.poll_interval_ms, 250);
        assert_eq!(cfg.starting_height, StartingHeight::Last);
    }
}
