//! anchorindex-node — [`ChainClient`](anchorindex_core::ChainClient) for an
//! LTO public node's REST API.
//!
//! # Usage
//!
//! ```rust,no_run
//! use anchorindex_node::{NodeClient, NodeConfig};
//!
//! let client = NodeClient::new(NodeConfig::new("http://localhost:6869").api_key("secret"))?;
//! # Ok::<(), anchorindex_core::IndexerError>(())
//! ```

pub mod client;
pub mod retry;

pub use client::{NodeClient, NodeConfig, NodeError};
pub use retry::{RetryConfig, RetryPolicy};
