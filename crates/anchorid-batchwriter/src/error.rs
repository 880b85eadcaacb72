use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchWriterError {
    /// spec.md §4.5: a writer may have at most one queued operation per DID
    /// at a time.
    #[error("a queued operation already targets DID suffix {0:?}")]
    QueueingMultipleOperationsPerDidNotAllowed(String),

    #[error(transparent)]
    Cas(#[from] anchorid_core::external::CasError),

    #[error(transparent)]
    AnchorChain(#[from] anchorid_core::external::AnchorChainError),

    #[error(transparent)]
    Protocol(#[from] anchorid_protocol::ProtocolError),

    #[error(transparent)]
    Crypto(#[from] anchorid_crypto::CryptoError),

    #[error(transparent)]
    Core(#[from] anchorid_core::error::CoreError),

    #[error("encoding a batch file: {0}")]
    Encoding(String),
}
