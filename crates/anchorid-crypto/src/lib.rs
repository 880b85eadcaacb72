//! Hashing, canonicalization, and ES256K signing primitives for the
//! anchorid DID Layer-2 node.

pub mod derive;
pub mod encoding;
pub mod error;
pub mod gzip;
pub mod jwk;
pub mod jws;
pub mod multihash;

pub use derive::derive_suffix;
pub use encoding::{base64url_decode, base64url_encode, canonicalize, canonicalized_multihash};
pub use error::CryptoError;
pub use jwk::{public_key_from_jwk, Secp256k1KeyPair};
pub use jws::{sign_compact, verify, verify_and_decode};
pub use multihash::{hash_to_multihash, verify_multihash};
