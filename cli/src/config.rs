//! Command-line and environment configuration.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

use anchorindex_core::{MonitorConfig, StartingHeight};
use anchorindex_node::NodeConfig;
use anchorindex_processors::{GeneratorConfig, SupplyConfig};

use crate::logging::LogConfig;

#[derive(Debug, Parser)]
#[command(
    name = "anchorindex",
    about = "LTO anchoring service and block indexer",
    long_about = "
AnchorIndex follows an LTO public node, indexes anchors, public keys,
associations, generator statistics and the fee burn, and serves an
HTTP API for anchoring and verifying hashes.

ENVIRONMENT VARIABLES:
  ANCHORINDEX_NODE_URL          Public node base URL
  ANCHORINDEX_NODE_API_KEY      API key for submitting transactions
  ANCHORINDEX_STORE             'memory' or a SQLite path
  ANCHORINDEX_STARTING_HEIGHT   Height to start from, or 'last'
  ANCHORINDEX_API_SECRET        Bearer secret required on POST /hash
",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the indexer and the HTTP API
    Run(RunArgs),
    /// Show the persisted checkpoint against the chain tip
    Status(StatusArgs),
    /// Show defaults and supported backends
    Info,
}

// ─── Shared argument groups ──────────────────────────────────────────────────

#[derive(Debug, Clone, Args)]
pub struct NodeArgs {
    /// Public node base URL
    #[arg(long, env = "ANCHORINDEX_NODE_URL", default_value = "http://localhost:6869")]
    pub node_url: String,

    /// API key sent with transaction submissions
    #[arg(long, env = "ANCHORINDEX_NODE_API_KEY")]
    pub node_api_key: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "ANCHORINDEX_NODE_TIMEOUT_MS", default_value_t = 30_000)]
    pub node_timeout_ms: u64,
}

impl NodeArgs {
    pub fn node_config(&self) -> NodeConfig {
        let config = NodeConfig::new(&self.node_url)
            .request_timeout(Duration::from_millis(self.node_timeout_ms));
        match &self.node_api_key {
            Some(key) => config.api_key(key),
            None => config,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// Store target: 'memory', 'sqlite:<path>' or a *.db / *.sqlite path
    #[arg(long, env = "ANCHORINDEX_STORE", default_value = "memory")]
    pub store: String,
}

#[derive(Debug, Clone, Args)]
pub struct LogArgs {
    /// Default log level
    #[arg(long, global = true, env = "ANCHORINDEX_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Per-component level, e.g. anchorindex_core=debug (repeatable)
    #[arg(long = "log-component", global = true, value_name = "COMPONENT=LEVEL")]
    pub log_components: Vec<String>,

    /// Emit JSON logs
    #[arg(long, global = true, env = "ANCHORINDEX_LOG_JSON")]
    pub log_json: bool,
}

impl LogArgs {
    pub fn log_config(&self) -> anyhow::Result<LogConfig> {
        let mut components = HashMap::new();
        for entry in &self.log_components {
            let (component, level) = entry
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("invalid --log-component '{entry}' (expected NAME=LEVEL)"))?;
            components.insert(component.to_string(), level.to_string());
        }
        Ok(LogConfig {
            level: self.log_level.clone(),
            components,
            json: self.log_json,
        })
    }
}

// ─── Processors ──────────────────────────────────────────────────────────────

/// Which processors subscribe to the bus. Disabled processors also switch
/// off their HTTP routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorToggles {
    pub anchors: bool,
    pub public_keys: bool,
    pub identity: bool,
    pub generators: bool,
    pub supply: bool,
}

impl Default for ProcessorToggles {
    fn default() -> Self {
        Self {
            anchors: true,
            public_keys: true,
            identity: true,
            generators: true,
            supply: true,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ProcessorArgs {
    /// Index anchors
    #[arg(long = "anchors", env = "ANCHORINDEX_ANCHORS", default_value_t = true, action = ArgAction::Set)]
    pub anchors: bool,

    /// Index sender public keys
    #[arg(long = "public-keys", env = "ANCHORINDEX_PUBLIC_KEYS", default_value_t = true, action = ArgAction::Set)]
    pub public_keys: bool,

    /// Index associations and verification methods, serve DIDs
    #[arg(long = "identity", env = "ANCHORINDEX_IDENTITY", default_value_t = true, action = ArgAction::Set)]
    pub identity: bool,

    /// Maintain generator statistics
    #[arg(long = "generators", env = "ANCHORINDEX_GENERATORS", default_value_t = true, action = ArgAction::Set)]
    pub generators: bool,

    /// Track the fee burn and circulating supply
    #[arg(long = "supply", env = "ANCHORINDEX_SUPPLY", default_value_t = true, action = ArgAction::Set)]
    pub supply: bool,
}

impl ProcessorArgs {
    pub fn toggles(&self) -> ProcessorToggles {
        ProcessorToggles {
            anchors: self.anchors,
            public_keys: self.public_keys,
            identity: self.identity,
            generators: self.generators,
            supply: self.supply,
        }
    }
}

// ─── Commands ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub node: NodeArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub processors: ProcessorArgs,

    /// First height to treat as processed, or 'last' to skip history
    #[arg(long, env = "ANCHORINDEX_STARTING_HEIGHT", default_value = "0")]
    pub starting_height: StartingHeight,

    /// Delay between monitor passes in milliseconds
    #[arg(long, env = "ANCHORINDEX_POLL_INTERVAL_MS", default_value_t = 10_000)]
    pub poll_interval_ms: u64,

    /// Generator statistics window in blocks
    #[arg(long, env = "ANCHORINDEX_GENERATOR_DELTA", default_value_t = 1_000)]
    pub generator_delta: u64,

    /// Feature id that activates the fee burn
    #[arg(long, env = "ANCHORINDEX_FEE_BURN_FEATURE", default_value_t = 15)]
    pub fee_burn_feature: u16,

    /// Bearer secret required on POST /hash
    #[arg(long, env = "ANCHORINDEX_API_SECRET")]
    pub api_secret: Option<String>,

    /// HTTP listen address
    #[arg(long, env = "ANCHORINDEX_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,
}

impl RunArgs {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::new()
            .poll_interval_ms(self.poll_interval_ms)
            .starting_height(self.starting_height)
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig::new().delta(self.generator_delta)
    }

    pub fn supply_config(&self) -> SupplyConfig {
        SupplyConfig::new().fee_burn_feature_id(self.fee_burn_feature)
    }
}

#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub node: NodeArgs,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(extra: &[&str]) -> RunArgs {
        let argv = ["anchorindex", "run"].iter().chain(extra).copied();
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Run(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn run_defaults() {
        let args = run_args(&["--node-url", "http://node:6869"]);
        assert_eq!(args.processors.toggles(), ProcessorToggles::default());
        assert_eq!(args.starting_height, StartingHeight::Height(0));
        assert_eq!(args.monitor_config().poll_interval(), Duration::from_secs(10));
        assert_eq!(args.node.node_config().url, "http://node:6869");
        assert!(args.api_secret.is_none());
    }

    #[test]
    fn run_overrides() {
        let args = run_args(&[
            "--starting-height",
            "last",
            "--poll-interval-ms",
            "500",
            "--generators",
            "false",
            "--supply",
            "false",
            "--generator-delta",
            "20",
        ]);
        assert_eq!(args.starting_height, StartingHeight::Last);
        assert_eq!(args.poll_interval_ms, 500);
        let toggles = args.processors.toggles();
        assert!(!toggles.generators && !toggles.supply);
        assert!(toggles.anchors && toggles.identity);
        assert_eq!(args.generator_config().delta, 20);
    }

    #[test]
    fn invalid_starting_height_is_rejected() {
        assert!(Cli::try_parse_from(["anchorindex", "run", "--starting-height", "soon"]).is_err());
    }

    #[test]
    fn log_components() {
        let cli = Cli::try_parse_from([
            "anchorindex",
            "info",
            "--log-component",
            "anchorindex_core=debug",
        ])
        .unwrap();
        let config = cli.log.log_config().unwrap();
        assert_eq!(config.components["anchorindex_core"], "debug");

        let bad = LogArgs {
            log_level: "info".into(),
            log_components: vec!["oops".into()],
            log_json: false,
        };
        assert!(bad.log_config().is_err());
    }
}
