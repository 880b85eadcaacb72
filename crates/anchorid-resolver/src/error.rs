use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Store(#[from] anchorid_state::StateError),

    #[error(transparent)]
    Core(#[from] anchorid_core::error::CoreError),

    #[error(transparent)]
    Crypto(#[from] anchorid_crypto::CryptoError),

    #[error("long-form initial state payload is not valid JSON: {0}")]
    MalformedInitialState(String),
}
