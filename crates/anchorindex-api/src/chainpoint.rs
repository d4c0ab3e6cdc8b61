//! Chainpoint v2 proofs for anchored hashes.

use serde::{Deserialize, Serialize};

pub const CHAINPOINT_CONTEXT: &str = "https://w3id.org/chainpoint/v2";
pub const CHAINPOINT_TYPE: &str = "ChainpointSHA256v2";
pub const ANCHOR_TYPE: &str = "LTODataTransaction";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainpointAnchor {
    #[serde(rename = "type")]
    pub anchor_type: String,
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chainpoint {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "type")]
    pub proof_type: String,
    pub target_hash: String,
    pub anchors: Vec<ChainpointAnchor>,
}

impl Chainpoint {
    /// Proof that `target_hash` was anchored by transaction `tx_id`.
    pub fn new(target_hash: impl Into<String>, tx_id: impl Into<String>) -> Self {
        Self {
            context: CHAINPOINT_CONTEXT.into(),
            proof_type: CHAINPOINT_TYPE.into(),
            target_hash: target_hash.into(),
            anchors: vec![ChainpointAnchor {
                anchor_type: ANCHOR_TYPE.into(),
                source_id: tx_id.into(),
            }],
        }
    }

    /// The anchoring transaction id.
    pub fn source_id(&self) -> Option<&str> {
        self.anchors.first().map(|a| a.source_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format() {
        let cp = Chainpoint::new("2c67", "tx-1");
        let json = serde_json::to_value(&cp).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "@context": "https://w3id.org/chainpoint/v2",
                "type": "ChainpointSHA256v2",
                "targetHash": "2c67",
                "anchors": [{"type": "LTODataTransaction", "sourceId": "tx-1"}]
            })
        );
        assert_eq!(cp.source_id(), Some("tx-1"));
    }
}
