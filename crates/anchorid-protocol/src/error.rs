use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("no protocol version is active at ledger time {0}")]
    VersionNotFound(u64),

    #[error("protocol version config is empty — at least one version must be defined")]
    EmptyConfig,

    #[error("protocol version config is not ordered by startingLedgerTime: entry {index} ({entry_time}) is not strictly after the previous entry ({previous_time})")]
    UnorderedConfig {
        index: usize,
        entry_time: u64,
        previous_time: u64,
    },

    #[error("reading protocol version config: {0}")]
    Io(String),

    #[error("parsing protocol version config: {0}")]
    Parse(String),
}
