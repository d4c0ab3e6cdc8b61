//! AnchorIndex CLI.
//!
//! # Commands
//! ```text
//! anchorindex run     --node-url <url> --store <target> [--starting-height <n|last>]
//! anchorindex status  --node-url <url> --store <target>
//! anchorindex info
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use anchorindex_core::{ChainClient, CheckpointManager, KeyValueStore, StartingHeight};
use anchorindex_node::NodeClient;
use anchorindex_storage::StoreConnector;

mod app;
mod config;
mod logging;

use config::{Cli, Commands, RunArgs, StatusArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&cli.log.log_config()?);

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Status(args) => cmd_status(args).await,
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let indexer = app::compose(&args).await.context("failed to start indexer")?;

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("cannot listen on {}", args.listen))?;
    info!(listen = %args.listen, node = %args.node.node_url, "anchorindex started");

    let monitor = indexer.monitor.clone().start()?;
    axum::serve(listener, anchorindex_api::router(indexer.state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    monitor.stop().await?;
    info!("anchorindex stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for shutdown signal");
    }
    info!("shutdown requested");
}

async fn cmd_status(args: StatusArgs) -> Result<()> {
    let store = StoreConnector::default().connect(&args.store.store).await?;
    let chain = NodeClient::new(args.node.node_config())?;

    let checkpoint = CheckpointManager::new(store.clone(), StartingHeight::default())
        .load()
        .await?;
    let tip = chain.tip_height().await.context("cannot reach node")?;

    println!("AnchorIndex status");
    println!("  Node:       {}", chain.url());
    println!("  Store:      {}", store.target());
    println!("  Tip:        {tip}");
    match checkpoint {
        Some(height) => {
            println!("  Checkpoint: {height}");
            println!("  Behind:     {} blocks", tip.saturating_sub(height));
        }
        None => println!("  Checkpoint: none (not started)"),
    }
    Ok(())
}

fn cmd_info() {
    println!("AnchorIndex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default poll interval: 10000 ms");
    println!("  Default starting height: 0 (or 'last' to skip history)");
    println!("  Default generator window: 1000 blocks");
    println!("  Fee burn feature: 15 (0.1 LTO per transaction)");
    println!("  Store backends: memory, SQLite");
    println!("  Hash encodings: hex, base58, base64");
    println!("  Processors: anchors, public-keys, identity, generators, supply");
}
