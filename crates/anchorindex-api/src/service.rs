//! Anchoring service: submit, look up and verify hashes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use anchorindex_core::codec::{self, Encoding};
use anchorindex_core::types::ANCHOR_KEY;
use anchorindex_core::ChainClient;
use anchorindex_processors::AnchorIndexer;

use crate::chainpoint::Chainpoint;
use crate::error::ApiError;

/// Which byte lengths a hash may decode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashCheck {
    /// Any common digest size.
    Any,
    /// Exactly 32 bytes.
    Sha256,
}

/// Outcome of [`AnchorService::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub chainpoint: Chainpoint,
    /// `false` if the hash was already anchored and nothing was submitted.
    pub submitted: bool,
}

/// Hashes to verify: a list, or labels mapped to hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerifyRequest {
    List(Vec<String>),
    Labeled(BTreeMap<String, String>),
}

/// Anchoring transaction per hash (or per label), `None` if not anchored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// `true` only if every hash is anchored.
    pub verified: bool,
    pub anchors: BTreeMap<String, Option<String>>,
}

pub struct AnchorService {
    chain: Arc<dyn ChainClient>,
    anchors: Arc<AnchorIndexer>,
}

impl AnchorService {
    pub fn new(chain: Arc<dyn ChainClient>, anchors: Arc<AnchorIndexer>) -> Self {
        Self { chain, anchors }
    }

    fn decode(hash: &str, encoding: Encoding, check: HashCheck) -> Result<Vec<u8>, ApiError> {
        let allowed = match check {
            HashCheck::Any => codec::HASH_LENGTHS,
            HashCheck::Sha256 => codec::SHA256_LENGTHS,
        };
        codec::decode_hash(hash, encoding, allowed)
            .map_err(|e| ApiError::BadRequest(format!("invalid {encoding} hash: {e}")))
    }

    /// Anchor `hash` unless it already is. A submission is not confirmed:
    /// the proof becomes verifiable once the transaction is indexed.
    pub async fn submit(&self, hash: &str, encoding: Encoding) -> Result<Submission, ApiError> {
        let bytes = Self::decode(hash, encoding, HashCheck::Any)?;
        let hex = codec::encode(&bytes, Encoding::Hex);

        if let Some(tx_id) = self.anchors.transaction_for(&hex).await? {
            return Ok(Submission {
                chainpoint: Chainpoint::new(hash, tx_id),
                submitted: false,
            });
        }

        let sender = self.chain.wallet_address().await?;
        let value = codec::encode(&bytes, Encoding::Base64);
        let tx_id = self
            .chain
            .submit_data_transaction(&sender, ANCHOR_KEY, &value)
            .await?;
        info!(hash = %hex, tx = %tx_id, "anchor submitted");
        Ok(Submission {
            chainpoint: Chainpoint::new(hash, tx_id),
            submitted: true,
        })
    }

    pub async fn lookup(
        &self,
        hash: &str,
        encoding: Encoding,
        check: HashCheck,
    ) -> Result<Option<Chainpoint>, ApiError> {
        let bytes = Self::decode(hash, encoding, check)?;
        let hex = codec::encode(&bytes, Encoding::Hex);
        Ok(self
            .anchors
            .transaction_for(&hex)
            .await?
            .map(|tx_id| Chainpoint::new(hash, tx_id)))
    }

    pub async fn verify(
        &self,
        request: &VerifyRequest,
        encoding: Encoding,
    ) -> Result<VerifyResponse, ApiError> {
        let entries: Vec<(String, &String)> = match request {
            VerifyRequest::List(hashes) => hashes.iter().map(|h| (h.clone(), h)).collect(),
            VerifyRequest::Labeled(map) => map.iter().map(|(k, h)| (k.clone(), h)).collect(),
        };

        let mut anchors = BTreeMap::new();
        for (label, hash) in entries {
            let bytes = Self::decode(hash, encoding, HashCheck::Any)?;
            let tx_id = self
                .anchors
                .transaction_for(&codec::encode(&bytes, Encoding::Hex))
                .await?;
            anchors.insert(label, tx_id);
        }
        Ok(VerifyResponse {
            verified: anchors.values().all(Option::is_some),
            anchors,
        })
    }
}
