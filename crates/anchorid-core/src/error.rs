use thiserror::Error;

/// Error taxonomy shared by the data model itself (identifier parsing,
/// canonicalization, multihash). Each downstream crate defines its own
/// richer error enum for its stage of the pipeline (parsing, storage,
/// resolution, ...) and converts from `CoreError` where it wraps one.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed DID: {0}")]
    MalformedDid(String),

    #[error("long-form suffix data does not hash to the short-form suffix")]
    LongFormHashMismatch,

    #[error("unsupported multihash algorithm code: {0}")]
    UnsupportedHashAlgorithm(u64),

    #[error("multihash is truncated or has an inconsistent length prefix")]
    TruncatedMultihash,

    #[error("invalid base64url encoding: {0}")]
    InvalidBase64(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("value exceeds size ceiling: {actual} bytes, max {max}")]
    SizeCeilingExceeded { actual: usize, max: usize },
}
