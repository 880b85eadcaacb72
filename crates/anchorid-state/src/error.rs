use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("storage backend error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("stored database schema version {found} is newer than this binary supports ({supported}); refusing to start")]
    DatabaseDowngradeNotAllowed { found: u32, supported: u32 },
}

impl From<sled::Error> for StateError {
    fn from(e: sled::Error) -> Self {
        StateError::Storage(e.to_string())
    }
}

impl From<bincode::Error> for StateError {
    fn from(e: bincode::Error) -> Self {
        StateError::Serialization(e.to_string())
    }
}
