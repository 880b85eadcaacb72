use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClockError {
    #[error(transparent)]
    Store(#[from] anchorid_state::StateError),
}
