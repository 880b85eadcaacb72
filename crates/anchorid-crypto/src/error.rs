use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error(transparent)]
    Core(#[from] anchorid_core::error::CoreError),

    #[error("signing key rejected by secp256k1: {0}")]
    InvalidSecretKey(String),

    #[error("public key JWK is malformed: {0}")]
    InvalidJwk(String),

    #[error("signature is malformed: {0}")]
    InvalidSignature(String),

    #[error("gzip payload could not be decompressed: {0}")]
    Gzip(String),
}
