//! Association graph and DID verification methods.
//!
//! An association transaction (type 16) adds a directed edge
//! `sender → recipient`; a revoke (type 17) with the same type and hash
//! removes it. Edges are stored as set members on both endpoints so
//! reprocessing a block is a no-op.
//!
//! Association types `0x0100..=0x01FF` additionally attach the recipient's
//! key to the sender's DID as a verification method. The low byte selects
//! the relationships it is valid for.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use anchorindex_core::store::{keys, KeyValueStore};
use anchorindex_core::types::{
    IndexContext, PublicKeyRecord, Transaction, ASSOCIATION_TX, REVOKE_ASSOCIATION_TX,
};
use anchorindex_core::{IndexerError, TransactionHandler};

use crate::public_key::PublicKeyIndexer;

// ─── Association edges ────────────────────────────────────────────────────────

/// One end of an association edge, as seen from the other end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    /// The counterparty address.
    pub party: String,
    #[serde(rename = "type")]
    pub association_type: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Association {
    /// Set-member form: `<type>:<party>[:<hash>]`.
    fn member(&self) -> String {
        match &self.hash {
            Some(hash) => format!("{}:{}:{}", self.association_type, self.party, hash),
            None => format!("{}:{}", self.association_type, self.party),
        }
    }
}

impl FromStr for Association {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(ty), Some(party)) = (parts.next(), parts.next()) else {
            return Err(IndexerError::Storage(format!("corrupt association member '{s}'")));
        };
        let association_type = ty
            .parse()
            .map_err(|_| IndexerError::Storage(format!("corrupt association member '{s}'")))?;
        Ok(Self {
            party: party.to_string(),
            association_type,
            hash: parts.next().map(str::to_string),
        })
    }
}

/// Both directions of an address's association graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Associations {
    /// Edges this address issued.
    pub children: Vec<Association>,
    /// Edges issued to this address.
    pub parents: Vec<Association>,
}

pub struct AssociationIndexer {
    store: Arc<dyn KeyValueStore>,
    public_keys: Arc<PublicKeyIndexer>,
}

impl AssociationIndexer {
    pub fn new(store: Arc<dyn KeyValueStore>, public_keys: Arc<PublicKeyIndexer>) -> Self {
        Self { store, public_keys }
    }

    pub async fn associations_of(&self, address: &str) -> Result<Associations, IndexerError> {
        let children = self
            .store
            .members(&keys::association_children(address))
            .await?;
        let parents = self
            .store
            .members(&keys::association_parents(address))
            .await?;
        Ok(Associations {
            children: parse_all(&children)?,
            parents: parse_all(&parents)?,
        })
    }
}

fn parse_all(members: &[String]) -> Result<Vec<Association>, IndexerError> {
    members.iter().map(|m| m.parse()).collect()
}

#[async_trait]
impl TransactionHandler for AssociationIndexer {
    async fn handle_transaction(
        &self,
        tx: &Transaction,
        ctx: &IndexContext,
    ) -> Result<(), IndexerError> {
        if !tx.is_association() {
            return Ok(());
        }
        let (Some(recipient), Some(association_type)) = (tx.recipient.as_deref(), tx.association_type) else {
            warn!(tx = %tx.id, "association without type skipped");
            return Ok(());
        };

        let child = Association {
            party: recipient.to_string(),
            association_type,
            hash: tx.hash.clone(),
        };
        let parent = Association {
            party: tx.sender.clone(),
            association_type,
            hash: tx.hash.clone(),
        };
        let children_key = keys::association_children(&tx.sender);
        let parents_key = keys::association_parents(recipient);

        match tx.tx_type {
            ASSOCIATION_TX => {
                self.store.add_to_set(&children_key, &child.member()).await?;
                self.store.add_to_set(&parents_key, &parent.member()).await?;
                // Make the counterparty's key available to identity lookups.
                self.public_keys.resolve(recipient).await?;
                debug!(sender = %tx.sender, %recipient, association_type, height = ctx.height, "association issued");
            }
            REVOKE_ASSOCIATION_TX => {
                self.store.remove_from_set(&children_key, &child.member()).await?;
                self.store.remove_from_set(&parents_key, &parent.member()).await?;
                debug!(sender = %tx.sender, %recipient, association_type, height = ctx.height, "association revoked");
            }
            _ => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "association"
    }
}

// ─── Verification methods ─────────────────────────────────────────────────────

/// Association types reserved for DID verification methods.
pub const VERIFICATION_METHOD_TYPES: std::ops::RangeInclusive<u32> = 0x0100..=0x01FF;

/// Verification relationships, as the low bits of the association type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Relationships(pub(crate) u32);

impl Relationships {
    pub const AUTHENTICATION: Self = Self(0x01);
    pub const ASSERTION_METHOD: Self = Self(0x02);
    pub const KEY_AGREEMENT: Self = Self(0x04);
    pub const CAPABILITY_INVOCATION: Self = Self(0x08);
    pub const CAPABILITY_DELEGATION: Self = Self(0x10);

    const NAMED: [(Self, &'static str); 5] = [
        (Self::AUTHENTICATION, "authentication"),
        (Self::ASSERTION_METHOD, "assertionMethod"),
        (Self::KEY_AGREEMENT, "keyAgreement"),
        (Self::CAPABILITY_INVOCATION, "capabilityInvocation"),
        (Self::CAPABILITY_DELEGATION, "capabilityDelegation"),
    ];

    /// Relationships encoded in a verification-method association type.
    pub fn from_association_type(association_type: u32) -> Self {
        Self(association_type & 0xff)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// DID document property names of every set relationship.
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::ops::BitOr for Relationships {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for Relationships {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(","))
    }
}

impl Serialize for Relationships {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

/// A key attached to an account's DID by a verification-method association.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// The account whose DID the method belongs to.
    pub controller: String,
    /// The account whose key is attached.
    pub recipient: String,
    pub relationships: Relationships,
    /// `None` while the recipient has never revealed its key on chain.
    pub public_key: Option<PublicKeyRecord>,
}

pub struct VerificationMethodIndexer {
    store: Arc<dyn KeyValueStore>,
    public_keys: Arc<PublicKeyIndexer>,
}

impl VerificationMethodIndexer {
    pub fn new(store: Arc<dyn KeyValueStore>, public_keys: Arc<PublicKeyIndexer>) -> Self {
        Self { store, public_keys }
    }

    /// Verification methods currently attached to the DID of `address`.
    pub async fn methods_of(&self, address: &str) -> Result<Vec<VerificationMethod>, IndexerError> {
        let members = self.store.members(&keys::verification_methods(address)).await?;
        let mut methods = Vec::with_capacity(members.len());
        for member in members {
            let Some((recipient, association_type)) = member
                .rsplit_once(':')
                .and_then(|(r, t)| t.parse::<u32>().ok().map(|t| (r, t)))
            else {
                return Err(IndexerError::Storage(format!(
                    "corrupt verification method '{member}'"
                )));
            };
            methods.push(VerificationMethod {
                controller: address.to_string(),
                recipient: recipient.to_string(),
                relationships: Relationships::from_association_type(association_type),
                public_key: self.public_keys.resolve(recipient).await?,
            });
        }
        Ok(methods)
    }
}

#[async_trait]
impl TransactionHandler for VerificationMethodIndexer {
    async fn handle_transaction(
        &self,
        tx: &Transaction,
        ctx: &IndexContext,
    ) -> Result<(), IndexerError> {
        if !tx.is_association() {
            return Ok(());
        }
        let (Some(recipient), Some(association_type)) = (tx.recipient.as_deref(), tx.association_type) else {
            return Ok(());
        };
        if !VERIFICATION_METHOD_TYPES.contains(&association_type) {
            return Ok(());
        }

        let key = keys::verification_methods(&tx.sender);
        match tx.tx_type {
            ASSOCIATION_TX => {
                self.store
                    .add_to_set(&key, &format!("{recipient}:{association_type}"))
                    .await?;
                self.public_keys.resolve(recipient).await?;
                debug!(
                    controller = %tx.sender,
                    %recipient,
                    relationships = %Relationships::from_association_type(association_type),
                    height = ctx.height,
                    "verification method added"
                );
            }
            REVOKE_ASSOCIATION_TX => {
                let prefix = format!("{recipient}:");
                for member in self.store.members(&key).await? {
                    if member.starts_with(&prefix) {
                        self.store.remove_from_set(&key, &member).await?;
                    }
                }
                debug!(controller = %tx.sender, %recipient, height = ctx.height, "verification method removed");
            }
            _ => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "verification-method"
    }
}
