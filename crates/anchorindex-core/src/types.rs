//! Chain data model shared by the monitor, the bus and every processor.
//!
//! Field names follow the node's JSON (camelCase) so blocks can be
//! deserialized straight from `/blocks/at/:height`.

use serde::{Deserialize, Serialize};

// ─── Transaction type tags ────────────────────────────────────────────────────

pub const GENESIS_TX: u8 = 1;
pub const TRANSFER_TX: u8 = 4;
pub const DATA_TX: u8 = 12;
pub const ANCHOR_TX: u8 = 15;
pub const ASSOCIATION_TX: u8 = 16;
pub const REVOKE_ASSOCIATION_TX: u8 = 17;

/// Attachment key marking a data entry as an anchor.
pub const ANCHOR_KEY: &str = "\u{2693}";

/// Prefix of binary data-entry values.
pub const BASE64_PREFIX: &str = "base64:";

fn default_key_type() -> String {
    "ed25519".into()
}

// ─── Block ────────────────────────────────────────────────────────────────────

/// A block as returned by the node. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub height: u64,
    /// Milliseconds since epoch.
    #[serde(default)]
    pub timestamp: i64,
    pub generator: String,
    #[serde(default, alias = "fee")]
    pub generator_reward: u64,
    #[serde(default)]
    pub burned_fees: u64,
    #[serde(default)]
    pub transaction_count: u32,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Every address whose balance this block may have touched: the
    /// generator plus each transaction's sender and recipient.
    pub fn touched_addresses(&self) -> Vec<&str> {
        let mut out = vec![self.generator.as_str()];
        for tx in &self.transactions {
            if !tx.sender.is_empty() {
                out.push(tx.sender.as_str());
            }
            if let Some(recipient) = tx.recipient.as_deref() {
                out.push(recipient);
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

// ─── Transaction ──────────────────────────────────────────────────────────────

/// A single data entry (`{key, type, value}`) attached to a data transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEntry {
    pub key: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub value: serde_json::Value,
}

impl DataEntry {
    /// The base64 payload of a `binary` entry, without the `base64:` prefix.
    pub fn binary_value(&self) -> Option<&str> {
        if self.entry_type != "binary" {
            return None;
        }
        let raw = self.value.as_str()?;
        Some(raw.strip_prefix(BASE64_PREFIX).unwrap_or(raw))
    }
}

/// A decoded chain transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub tx_type: u8,
    /// Empty for genesis transactions.
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub sender_public_key: String,
    #[serde(default = "default_key_type")]
    pub sender_key_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association_type: Option<u32>,
    /// Optional association hash (base58).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<DataEntry>,
    /// Base58 anchors of an anchor transaction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anchors: Vec<String>,
    #[serde(default)]
    pub fee: u64,
}

impl Transaction {
    /// The first data entry keyed by [`ANCHOR_KEY`], if this is a data transaction.
    pub fn anchor_entry(&self) -> Option<&DataEntry> {
        if self.tx_type != DATA_TX {
            return None;
        }
        self.data.iter().find(|entry| entry.key == ANCHOR_KEY)
    }

    /// Returns `true` for association issue/revoke transactions with a recipient.
    pub fn is_association(&self) -> bool {
        matches!(self.tx_type, ASSOCIATION_TX | REVOKE_ASSOCIATION_TX) && self.recipient.is_some()
    }
}

// ─── Public keys ──────────────────────────────────────────────────────────────

/// An account's public key as first observed on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyRecord {
    pub public_key: String,
    pub key_type: String,
}

// ─── Node responses ───────────────────────────────────────────────────────────

/// `/addresses/balance/details/:address`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceDetails {
    pub address: String,
    #[serde(default)]
    pub regular: u64,
    #[serde(default)]
    pub generating: u64,
    #[serde(default)]
    pub available: u64,
    #[serde(default)]
    pub effective: u64,
}

/// One feature entry of `/activation/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStatus {
    pub id: u16,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub blockchain_status: String,
    #[serde(default)]
    pub activation_height: Option<u64>,
}

/// `/activation/status`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationStatus {
    #[serde(default)]
    pub height: u64,
    #[serde(default)]
    pub features: Vec<FeatureStatus>,
}

impl ActivationStatus {
    /// Activation height of `feature_id`, if the chain has activated it.
    pub fn activation_height(&self, feature_id: u16) -> Option<u64> {
        self.features
            .iter()
            .find(|f| f.id == feature_id)
            .and_then(|f| f.activation_height)
    }
}

// ─── IndexContext ─────────────────────────────────────────────────────────────

/// Context passed to transaction handlers: the block the transaction is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexContext {
    pub height: u64,
    pub timestamp: i64,
    pub generator: String,
}

impl IndexContext {
    pub fn for_block(block: &Block) -> Self {
        Self {
            height: block.height,
            timestamp: block.timestamp,
            generator: block.generator.clone(),
        }
    }
}

/// Payload of a *sync-tick* event, emitted once per monitor pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTick {
    /// Chain tip observed at the start of the pass.
    pub tip_height: u64,
    /// Last fully processed height at the start of the pass.
    pub checkpoint: u64,
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_from_node_json() {
        let json = serde_json::json!({
            "version": 3,
            "height": 1042,
            "timestamp": 1_700_000_000_000i64,
            "generator": "3JmCa4jLVv7Yn2XkCnBUGsa7WNFVEMxAfWe",
            "fee": 35_000_000,
            "burnedFees": 10_000_000,
            "transactionCount": 1,
            "transactions": [{
                "type": 12,
                "id": "8M6dgn85eh3bsHrVhWng8FNaHBcHEJD4MPZ5ZzCciyon",
                "sender": "3Jq8mnhRquuXCiFUwTLZFVSzmQt3Fu6F7HQ",
                "senderKeyType": "ed25519",
                "senderPublicKey": "AneNBwCMTG1YQ5ShPErzJZETTsHEWFnPWhdkKiHG6VTX",
                "fee": 35_000_000,
                "data": [{"key": "\u{2693}", "type": "binary", "value": "base64:EjQ="}]
            }]
        });
        let block: Block = serde_json::from_value(json).unwrap();
        assert_eq!(block.height, 1042);
        assert_eq!(block.generator_reward, 35_000_000);
        assert_eq!(block.burned_fees, 10_000_000);
        assert_eq!(block.transactions.len(), 1);

        let tx = &block.transactions[0];
        let entry = tx.anchor_entry().unwrap();
        assert_eq!(entry.binary_value(), Some("EjQ="));
        assert!(!tx.is_association());
    }

    #[test]
    fn genesis_transaction_defaults() {
        let tx: Transaction = serde_json::from_value(serde_json::json!({
            "type": 1,
            "id": "genesis-1",
            "recipient": "3N1",
        }))
        .unwrap();
        assert!(tx.sender.is_empty());
        assert_eq!(tx.sender_key_type, "ed25519");
        assert!(tx.anchor_entry().is_none());
    }

    #[test]
    fn anchor_entry_requires_data_tx_and_marker() {
        let mut tx: Transaction = serde_json::from_value(serde_json::json!({
            "type": 12,
            "id": "tx",
            "data": [{"key": "note", "type": "string", "value": "hi"}]
        }))
        .unwrap();
        assert!(tx.anchor_entry().is_none());

        tx.data.push(DataEntry {
            key: ANCHOR_KEY.into(),
            entry_type: "binary".into(),
            value: "base64:AA==".into(),
        });
        assert!(tx.anchor_entry().is_some());

        tx.tx_type = TRANSFER_TX;
        assert!(tx.anchor_entry().is_none());
    }

    #[test]
    fn touched_addresses_deduplicated() {
        let block: Block = serde_json::from_value(serde_json::json!({
            "height": 5,
            "generator": "G",
            "transactions": [
                {"type": 4, "id": "a", "sender": "A", "recipient": "G"},
                {"type": 4, "id": "b", "sender": "A", "recipient": "B"}
            ]
        }))
        .unwrap();
        assert_eq!(block.touched_addresses(), vec!["A", "B", "G"]);
    }

    #[test]
    fn activation_height_lookup() {
        let status: ActivationStatus = serde_json::from_value(serde_json::json!({
            "height": 900,
            "features": [
                {"id": 4, "description": "Smart accounts", "blockchainStatus": "ACTIVATED", "activationHeight": 10},
                {"id": 15, "description": "Burn fees", "blockchainStatus": "VOTING"}
            ]
        }))
        .unwrap();
        assert_eq!(status.activation_height(4), Some(10));
        assert_eq!(status.activation_height(15), None);
        assert_eq!(status.activation_height(99), None);
    }
}
