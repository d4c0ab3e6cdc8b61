//! `did:lto:<address>` resolution from indexed keys and verification methods.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use anchorindex_core::types::PublicKeyRecord;
use anchorindex_core::IndexerError;

use crate::identity::{Relationships, VerificationMethodIndexer};
use crate::public_key::PublicKeyIndexer;

pub const DID_PREFIX: &str = "did:lto:";

const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// Relationships of an account's own key.
const OWN_KEY_RELATIONSHIPS: Relationships = Relationships(0x01 | 0x02 | 0x08 | 0x10);

pub fn did_of(address: &str) -> String {
    format!("{DID_PREFIX}{address}")
}

/// Verification-method suite name for a chain key type.
pub fn method_type(key_type: &str) -> &'static str {
    match key_type {
        "secp256k1" => "EcdsaSecp256k1VerificationKey2019",
        "secp256r1" => "JsonWebKey2020",
        _ => "Ed25519VerificationKey2020",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DidVerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    pub public_key_base58: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    pub verification_method: Vec<DidVerificationMethod>,
    pub authentication: Vec<String>,
    pub assertion_method: Vec<String>,
    pub key_agreement: Vec<String>,
    pub capability_invocation: Vec<String>,
    pub capability_delegation: Vec<String>,
}

impl DidDocument {
    fn new(id: String) -> Self {
        Self {
            context: vec![DID_CONTEXT.to_string()],
            id,
            verification_method: vec![],
            authentication: vec![],
            assertion_method: vec![],
            key_agreement: vec![],
            capability_invocation: vec![],
            capability_delegation: vec![],
        }
    }

    fn attach(&mut self, address: &str, key: &PublicKeyRecord, relationships: Relationships) {
        let did = did_of(address);
        let id = format!("{did}#sign");
        if !self.verification_method.iter().any(|m| m.id == id) {
            self.verification_method.push(DidVerificationMethod {
                id: id.clone(),
                method_type: method_type(&key.key_type).to_string(),
                controller: did,
                public_key_base58: key.public_key.clone(),
            });
        }

        let lists = [
            (Relationships::AUTHENTICATION, &mut self.authentication),
            (Relationships::ASSERTION_METHOD, &mut self.assertion_method),
            (Relationships::KEY_AGREEMENT, &mut self.key_agreement),
            (Relationships::CAPABILITY_INVOCATION, &mut self.capability_invocation),
            (Relationships::CAPABILITY_DELEGATION, &mut self.capability_delegation),
        ];
        for (flag, list) in lists {
            if relationships.contains(flag) && !list.contains(&id) {
                list.push(id.clone());
            }
        }
    }
}

pub struct DidResolver {
    public_keys: Arc<PublicKeyIndexer>,
    methods: Arc<VerificationMethodIndexer>,
}

impl DidResolver {
    pub fn new(public_keys: Arc<PublicKeyIndexer>, methods: Arc<VerificationMethodIndexer>) -> Self {
        Self {
            public_keys,
            methods,
        }
    }

    /// Resolve `did:lto:<address>` or a bare address. `None` if the account
    /// has no known public key.
    pub async fn resolve(&self, did_or_address: &str) -> Result<Option<DidDocument>, IndexerError> {
        let address = did_or_address
            .strip_prefix(DID_PREFIX)
            .unwrap_or(did_or_address);
        let Some(own_key) = self.public_keys.resolve(address).await? else {
            debug!(%address, "DID not resolvable: unknown public key");
            return Ok(None);
        };

        let mut doc = DidDocument::new(did_of(address));
        doc.attach(address, &own_key, OWN_KEY_RELATIONSHIPS);

        for method in self.methods.methods_of(address).await? {
            match &method.public_key {
                Some(key) => doc.attach(&method.recipient, key, method.relationships),
                None => debug!(
                    controller = %address,
                    recipient = %method.recipient,
                    "verification method without known key omitted"
                ),
            }
        }
        Ok(Some(doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorindex_core::testing::{transaction, MockChain};
    use anchorindex_core::types::{IndexContext, ASSOCIATION_TX, TRANSFER_TX};
    use anchorindex_core::{KeyValueStore, MemoryStore, TransactionHandler};

    struct Fixture {
        keys: Arc<PublicKeyIndexer>,
        methods: Arc<VerificationMethodIndexer>,
        resolver: DidResolver,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let chain = Arc::new(MockChain::new());
        let keys = Arc::new(PublicKeyIndexer::new(store.clone(), chain));
        let methods = Arc::new(VerificationMethodIndexer::new(store, keys.clone()));
        Fixture {
            resolver: DidResolver::new(keys.clone(), methods.clone()),
            keys,
            methods,
        }
    }

    fn ctx() -> IndexContext {
        IndexContext {
            height: 1,
            timestamp: 0,
            generator: "G".into(),
        }
    }

    #[tokio::test]
    async fn unknown_account_is_unresolvable() {
        let f = fixture();
        assert!(f.resolver.resolve("did:lto:3Nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn own_key_document() {
        let f = fixture();
        f.keys
            .handle_transaction(&transaction("t", TRANSFER_TX, "3Alice"), &ctx())
            .await
            .unwrap();

        let doc = f.resolver.resolve("did:lto:3Alice").await.unwrap().unwrap();
        assert_eq!(doc.id, "did:lto:3Alice");
        assert_eq!(doc.verification_method.len(), 1);
        let method = &doc.verification_method[0];
        assert_eq!(method.id, "did:lto:3Alice#sign");
        assert_eq!(method.method_type, "Ed25519VerificationKey2020");
        assert_eq!(method.public_key_base58, "pk-3Alice");
        assert_eq!(doc.authentication, vec!["did:lto:3Alice#sign"]);
        assert!(doc.key_agreement.is_empty());

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["@context"][0], DID_CONTEXT);
        assert!(json["verificationMethod"].is_array());
    }

    #[tokio::test]
    async fn verification_methods_are_attached() {
        let f = fixture();
        for sender in ["3Alice", "3Bob"] {
            f.keys
                .handle_transaction(&transaction(sender, TRANSFER_TX, sender), &ctx())
                .await
                .unwrap();
        }
        let mut add = transaction("vm", ASSOCIATION_TX, "3Alice");
        add.recipient = Some("3Bob".into());
        add.association_type = Some(0x0104);
        f.methods.handle_transaction(&add, &ctx()).await.unwrap();

        let doc = f.resolver.resolve("3Alice").await.unwrap().unwrap();
        assert_eq!(doc.verification_method.len(), 2);
        assert_eq!(doc.key_agreement, vec!["did:lto:3Bob#sign"]);
        assert_eq!(doc.verification_method[1].controller, "did:lto:3Bob");
    }

    #[test]
    fn key_type_suites() {
        assert_eq!(method_type("ed25519"), "Ed25519VerificationKey2020");
        assert_eq!(method_type("secp256k1"), "EcdsaSecp256k1VerificationKey2019");
        assert_eq!(method_type("secp256r1"), "JsonWebKey2020");
    }
}
