//! `ProtocolVersionManager`: pure, deterministic selection of the rule set
//! active at a given ledger time (spec.md §4.1).

pub mod error;
pub mod version;

pub use error::ProtocolError;
pub use version::{ProtocolVersionConfig, ProtocolVersionManager, VersionEntry, VersionParameters};
