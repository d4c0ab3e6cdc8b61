//! anchorindex-api — HTTP surface of AnchorIndex.
//!
//! | route | purpose |
//! |-------|---------|
//! | `POST /hash` | anchor a hash (202 submitted, 200 already anchored) |
//! | `GET /hash/:hash` | chainpoint for a hex SHA-256 hash |
//! | `GET /hash/:hash/encoding/:encoding` | chainpoint for a hash in any encoding |
//! | `POST /hash/verify?encoding=` | batch verification |
//! | `GET /supply/circulating[?output=raw]` | circulating supply |
//! | `GET /generators` | generator statistics |
//! | `GET /associations/:address` | association graph of an account |
//! | `GET /did/:address` | DID document |
//!
//! Build an [`AppState`] from the running processors and pass it to
//! [`router`].

pub mod chainpoint;
pub mod error;
pub mod routes;
pub mod service;

pub use chainpoint::Chainpoint;
pub use error::ApiError;
pub use routes::{router, AppState};
pub use service::{AnchorService, HashCheck, Submission, VerifyRequest, VerifyResponse};
