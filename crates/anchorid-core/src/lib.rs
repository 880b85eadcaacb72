//! Shared data model, error taxonomy, and external-collaborator interfaces
//! for the anchorid DID Layer-2 node.
//!
//! Every other crate in the workspace depends on this one; it has no
//! dependency on any other `anchorid-*` crate.

pub mod document;
pub mod error;
pub mod external;
pub mod files;
pub mod identifier;
pub mod operation;
pub mod timeout;
pub mod transaction;

pub use error::CoreError;

/// Derive a CAS URI from raw content. Real CAS backends address content by
/// a hash of their own choosing; the in-memory double uses this so its
/// `write` is deterministic and content-addressed like the real thing.
pub fn cas_uri_for(content: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(content);
    format!("cas://{}", hex::encode(digest))
}
