use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObserverError {
    #[error(transparent)]
    AnchorChain(#[from] anchorid_core::external::AnchorChainError),

    #[error(transparent)]
    Store(#[from] anchorid_state::StateError),

    #[error(transparent)]
    Protocol(#[from] anchorid_protocol::ProtocolError),

    #[error("chain reported a reorg with no valid transaction within the sampled history")]
    ReorgExhausted,
}
