//! The ledger-observed unit the Observer consumes: one transaction per
//! anchored batch, carrying the anchor string that chains down to a core
//! index file.

use serde::{Deserialize, Serialize};

/// One transaction read from the anchor chain.
///
/// `transaction_number` is assigned by `anchorid` itself (strictly
/// increasing across the whole observed history, not the ledger's own
/// native transaction index) so that reorg-induced renumbering never
/// happens; `transaction_time` is the ledger's block height or
/// equivalent monotonically increasing height unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_number: u64,
    pub transaction_time: u64,
    pub transaction_time_hash: String,
    pub anchor_string: String,
    pub writer: String,
    pub fee_paid: u64,
    pub normalized_fee: u64,
}

impl Transaction {
    /// `anchor_string` is `<coreIndexFileUri>.<operationCount>` (spec.md
    /// §3, "Anchor string" in the glossary); split it into
    /// `(coreIndexFileUri, operationCount)` without validating the URI
    /// shape (the parser does that).
    pub fn split_anchor_string(&self) -> Option<(&str, u64)> {
        let (uri, count) = self.anchor_string.rsplit_once('.')?;
        let count: u64 = count.parse().ok()?;
        Some((uri, count))
    }
}

/// Build the `"<coreIndexFileUri>.<operationCount>"` anchor string the
/// `BatchWriter` submits to the anchor chain.
pub fn build_anchor_string(core_index_file_uri: &str, operation_count: u64) -> String {
    format!("{core_index_file_uri}.{operation_count}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_string_round_trips() {
        let s = build_anchor_string("cas://abc123", 42);
        let tx = Transaction {
            transaction_number: 0,
            transaction_time: 0,
            transaction_time_hash: String::new(),
            anchor_string: s,
            writer: String::new(),
            fee_paid: 0,
            normalized_fee: 0,
        };
        assert_eq!(tx.split_anchor_string(), Some(("cas://abc123", 42)));
    }
}
