//! Chain client for an LTO public node's REST API, backed by `reqwest`.
//!
//! Reads are retried with exponential backoff on connection failures and
//! 5xx responses. Submissions are sent once: a rejection is reported with
//! the node's reason and never retried.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use anchorindex_core::types::{
    ActivationStatus, BalanceDetails, Block, PublicKeyRecord, BASE64_PREFIX, DATA_TX,
};
use anchorindex_core::{ChainClient, IndexerError};

use crate::retry::{RetryConfig, RetryPolicy};

/// Header carrying the node API key on privileged endpoints.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Transactions scanned when looking up an account's public key.
const KEY_LOOKUP_LIMIT: u32 = 100;

/// Configuration for [`NodeClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Base URL, e.g. `http://localhost:6869`.
    pub url: String,
    /// Required for submissions and wallet lookups.
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
    /// Fee attached to submitted data transactions (base units).
    pub data_fee: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6869".into(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            data_fee: 35_000_000,
        }
    }
}

impl NodeConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Failures talking to the node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl NodeError {
    /// Connection failures and server-side errors may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) => false,
        }
    }
}

impl From<NodeError> for IndexerError {
    fn from(err: NodeError) -> Self {
        IndexerError::Rpc(err.to_string())
    }
}

pub struct NodeClient {
    base: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    api_key: Option<String>,
    data_fee: u64,
}

impl NodeClient {
    pub fn new(config: NodeConfig) -> Result<Self, IndexerError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| IndexerError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base: config.url.trim_end_matches('/').to_string(),
            http,
            retry: RetryPolicy::new(config.retry),
            api_key: config.api_key,
            data_fee: config.data_fee,
        })
    }

    pub fn url(&self) -> &str {
        &self.base
    }

    async fn get_once(&self, path: &str) -> Result<Option<Value>, NodeError> {
        let mut req = self.http.get(format!("{}{}", self.base, path));
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }
        let resp = req.send().await.map_err(|e| NodeError::Http(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NodeError::Status {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<Value>()
            .await
            .map(Some)
            .map_err(|e| NodeError::Decode(e.to_string()))
    }

    /// GET `path` with retries. `None` on 404.
    async fn get(&self, path: &str) -> Result<Option<Value>, NodeError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.get_once(path).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            path,
                            "retrying node request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_required<T: DeserializeOwned>(&self, path: &str) -> Result<T, NodeError> {
        let value = self
            .get(path)
            .await?
            .ok_or_else(|| NodeError::Decode(format!("{path} not found")))?;
        decode(value)
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, NodeError> {
    serde_json::from_value(value).map_err(|e| NodeError::Decode(e.to_string()))
}

/// `/blocks/last` → height.
pub fn parse_tip(value: &Value) -> Result<u64, NodeError> {
    value
        .get("height")
        .and_then(Value::as_u64)
        .ok_or_else(|| NodeError::Decode("block without height".into()))
}

/// `/addresses` → the first wallet address.
pub fn parse_wallet(value: &Value) -> Result<String, NodeError> {
    value
        .as_array()
        .and_then(|list| list.first())
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| NodeError::Decode("node wallet has no address".into()))
}

/// `/transactions/address/:address/limit/:n` → the key `address` signed with.
///
/// The node wraps the list in an outer array.
pub fn parse_public_key(value: &Value, address: &str) -> Option<PublicKeyRecord> {
    let txs = value.as_array()?.first()?.as_array()?;
    txs.iter().find_map(|tx| {
        if tx.get("sender")?.as_str()? != address {
            return None;
        }
        Some(PublicKeyRecord {
            public_key: tx.get("senderPublicKey")?.as_str()?.to_string(),
            key_type: tx
                .get("senderKeyType")
                .and_then(Value::as_str)
                .unwrap_or("ed25519")
                .to_string(),
        })
    })
}

/// Body of a data transaction carrying one binary entry.
pub fn data_transaction_body(sender: &str, key: &str, base64_value: &str, fee: u64) -> Value {
    json!({
        "version": 3,
        "type": DATA_TX,
        "sender": sender,
        "fee": fee,
        "data": [{
            "key": key,
            "type": "binary",
            "value": format!("{BASE64_PREFIX}{base64_value}"),
        }],
    })
}

/// The human-readable reason in a node error body.
fn rejection_reason(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl ChainClient for NodeClient {
    async fn tip_height(&self) -> Result<u64, IndexerError> {
        let value = self
            .get("/blocks/last")
            .await?
            .ok_or_else(|| NodeError::Decode("no last block".into()))?;
        Ok(parse_tip(&value)?)
    }

    async fn block_at(&self, height: u64) -> Result<Option<Block>, IndexerError> {
        match self.get(&format!("/blocks/at/{height}")).await? {
            None => Ok(None),
            Some(value) => Ok(Some(decode(value)?)),
        }
    }

    async fn balance_details(&self, address: &str) -> Result<BalanceDetails, IndexerError> {
        Ok(self
            .get_required(&format!("/addresses/balance/details/{address}"))
            .await?)
    }

    async fn activation_status(&self) -> Result<ActivationStatus, IndexerError> {
        Ok(self.get_required("/activation/status").await?)
    }

    async fn submit_data_transaction(
        &self,
        sender: &str,
        key: &str,
        base64_value: &str,
    ) -> Result<String, IndexerError> {
        let body = data_transaction_body(sender, key, base64_value, self.data_fee);
        let mut req = self
            .http
            .post(format!("{}/addresses/data", self.base))
            .json(&body);
        if let Some(api_key) = &self.api_key {
            req = req.header(API_KEY_HEADER, api_key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| IndexerError::Submission(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(IndexerError::Submission(rejection_reason(&text)));
        }
        let id = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| IndexerError::Submission(format!("response without id: {text}")))?;
        debug!(tx = %id, %sender, "data transaction submitted");
        Ok(id)
    }

    async fn wallet_address(&self) -> Result<String, IndexerError> {
        let value = self
            .get("/addresses")
            .await?
            .ok_or_else(|| NodeError::Decode("no wallet".into()))?;
        Ok(parse_wallet(&value)?)
    }

    async fn public_key_of(&self, address: &str) -> Result<Option<PublicKeyRecord>, IndexerError> {
        let path = format!("/transactions/address/{address}/limit/{KEY_LOOKUP_LIMIT}");
        Ok(self
            .get(&path)
            .await?
            .and_then(|value| parse_public_key(&value, address)))
    }
}
