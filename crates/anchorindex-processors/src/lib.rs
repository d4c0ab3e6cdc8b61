//! anchorindex-processors — derived-state consumers of the index bus.
//!
//! | processor | events | state |
//! |-----------|--------|-------|
//! | [`AnchorIndexer`] | transaction | `anchor:<hex>` → tx id |
//! | [`PublicKeyIndexer`] | transaction | `public-key:<address>` |
//! | [`AssociationIndexer`] | transaction | association edge sets |
//! | [`VerificationMethodIndexer`] | transaction | DID verification methods |
//! | [`GeneratorStatsEngine`] | block, sync | in-memory window |
//! | [`SupplyTracker`] | block | fee-burn counter |
//!
//! [`DidResolver`] is read-only and builds documents from the key and
//! verification-method indexes.

pub mod anchor;
pub mod did;
pub mod generators;
pub mod identity;
pub mod public_key;
pub mod supply;

pub use anchor::AnchorIndexer;
pub use did::{DidDocument, DidResolver};
pub use generators::{GeneratorConfig, GeneratorStats, GeneratorStatsEngine};
pub use identity::{
    Association, AssociationIndexer, Associations, Relationships, VerificationMethod,
    VerificationMethodIndexer,
};
pub use public_key::PublicKeyIndexer;
pub use supply::{SupplyConfig, SupplyTracker};
