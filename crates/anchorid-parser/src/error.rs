//! Parse/validation error taxonomy, grouped by the stage that rejected the
//! operation (spec.md §4.4, §7). `anchorid-rpc`'s `RequestHandler` maps
//! every variant here to a `{code, message}` `BadRequest` payload.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    // ── Size ─────────────────────────────────────────────────────────────
    #[error("operation is {actual} bytes, exceeding the {max}-byte ceiling")]
    OperationTooLarge { actual: usize, max: usize },

    #[error("delta is {actual} bytes, exceeding the {max}-byte ceiling")]
    DeltaTooLarge { actual: usize, max: usize },

    // ── Schema ───────────────────────────────────────────────────────────
    #[error("malformed operation JSON: {0}")]
    MalformedJson(String),

    #[error("delta is required for {0} operations")]
    MissingDelta(&'static str),

    #[error("unrecognized patch action: {0}")]
    UnrecognizedPatch(String),

    #[error("service id must be at most 50 Base64URL characters: {0:?}")]
    InvalidServiceId(String),

    #[error("service type must be at most 30 characters: {0:?}")]
    InvalidServiceType(String),

    #[error("serviceEndpoint must be a URI string or a non-array object")]
    InvalidServiceEndpoint,

    #[error("duplicate public key id within a single patch: {0:?}")]
    DuplicatePublicKeyId(String),

    #[error("public key purpose {0:?} is not in the closed set or appears twice")]
    InvalidPurpose(String),

    #[error("public key entry is missing required field {0:?}")]
    MissingPublicKeyField(&'static str),

    #[error("service entry is missing required field {0:?}")]
    MissingServiceField(&'static str),

    // ── Multihash ────────────────────────────────────────────────────────
    #[error("{field} is not a well-formed multihash: {source}")]
    InvalidMultihash {
        field: &'static str,
        #[source]
        source: anchorid_core::error::CoreError,
    },

    #[error("commitment {field} uses an unsupported hash algorithm code {code}")]
    UnsupportedHashAlgorithm { field: &'static str, code: u64 },

    // ── JWS / keys ───────────────────────────────────────────────────────
    #[error("unsupported JWS alg: {0}, expected ES256K")]
    UnsupportedJwsAlg(String),

    #[error("signed_data payload does not match the expected schema: {0}")]
    InvalidSignedPayload(String),

    #[error("invalid secp256k1 JWK: {0}")]
    InvalidJwk(#[from] anchorid_crypto::CryptoError),

    #[error("signature verification failed")]
    SignatureInvalid,

    // ── Commitment / reveal (admission-time only; replay-time checks live in anchorid-resolver) ──
    #[error("reveal_value does not hash to the key it claims to reveal")]
    RevealKeyMismatch,
}
