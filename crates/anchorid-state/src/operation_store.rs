//! Per-DID operation history, keyed so a single writer per
//! `(didUniqueSuffix, transactionNumber, operationIndex)` key (spec.md §5)
//! makes insertion naturally idempotent, and so range-deletes by
//! transaction-number cutoff (reorg rollback) don't require a full scan.

use anchorid_core::operation::AnchoredOperation;

use crate::error::StateError;

pub(crate) const DID_TREE: &str = "operations_by_did";
pub(crate) const CUTOFF_TREE: &str = "operations_by_cutoff";

pub struct OperationStore {
    by_did: sled::Tree,
    by_cutoff: sled::Tree,
}

fn did_key(op: &AnchoredOperation) -> Vec<u8> {
    let mut key = op.did_suffix.as_str().as_bytes().to_vec();
    key.push(0); // separator: DID suffixes are opaque strings, never NUL
    key.extend_from_slice(&op.position.transaction_time.to_be_bytes());
    key.extend_from_slice(&op.position.transaction_number.to_be_bytes());
    key.extend_from_slice(&op.position.operation_index.to_be_bytes());
    key
}

fn cutoff_key(op: &AnchoredOperation) -> Vec<u8> {
    let mut key = op.position.transaction_number.to_be_bytes().to_vec();
    key.extend_from_slice(&op.position.operation_index.to_be_bytes());
    key.extend_from_slice(op.did_suffix.as_str().as_bytes());
    key
}

impl OperationStore {
    pub(crate) fn open(db: &sled::Db) -> Result<Self, StateError> {
        Ok(Self {
            by_did: db.open_tree(DID_TREE)?,
            by_cutoff: db.open_tree(CUTOFF_TREE)?,
        })
    }

    /// Insert `op`, overwriting any prior record at the same
    /// `(didSuffix, transactionNumber, operationIndex)` key — an upsert, so
    /// re-observing the same anchored operation (e.g. after a retry) is a
    /// no-op rather than a duplicate.
    pub fn insert(&self, op: &AnchoredOperation) -> Result<(), StateError> {
        let did_key = did_key(op);
        let cutoff_key = cutoff_key(op);
        let bytes = bincode::serialize(op)?;
        self.by_did.insert(&did_key, bytes)?;
        self.by_cutoff.insert(&cutoff_key, did_key)?;
        Ok(())
    }

    /// All anchored operations for `did_suffix`, ordered ascending by
    /// `(transactionTime, transactionNumber, operationIndex)` — the order
    /// sled's own key ordering already gives us, since the key is built
    /// from those three fields big-endian in that order.
    pub fn operations_for(&self, did_suffix: &str) -> Result<Vec<AnchoredOperation>, StateError> {
        let mut prefix = did_suffix.as_bytes().to_vec();
        prefix.push(0);
        let mut out = Vec::new();
        for item in self.by_did.scan_prefix(&prefix) {
            let (_, bytes) = item?;
            out.push(bincode::deserialize(&bytes)?);
        }
        Ok(out)
    }

    /// Delete every operation anchored at a transaction number strictly
    /// greater than `cutoff` — the Observer's reorg rollback (spec.md §4.7).
    pub fn delete_above(&self, cutoff: u64) -> Result<usize, StateError> {
        let lower = (cutoff + 1).to_be_bytes().to_vec();
        let mut removed = 0;
        let mut by_did_keys = Vec::new();
        let mut cutoff_keys = Vec::new();
        for item in self.by_cutoff.range(lower..) {
            let (ck, did_key) = item?;
            cutoff_keys.push(ck.to_vec());
            by_did_keys.push(did_key.to_vec());
        }
        for (ck, dk) in cutoff_keys.into_iter().zip(by_did_keys.into_iter()) {
            self.by_cutoff.remove(ck)?;
            self.by_did.remove(dk)?;
            removed += 1;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.by_did.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_did.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorid_core::identifier::DidSuffix;
    use anchorid_core::operation::{AnchoringPosition, Operation, SuffixData, Delta};

    fn op_at(suffix: &str, time: u64, number: u64, index: u32) -> AnchoredOperation {
        AnchoredOperation {
            did_suffix: DidSuffix(suffix.to_string()),
            operation: Operation::Create {
                suffix_data: SuffixData {
                    delta_hash: "h".to_string(),
                    recovery_commitment: "r".to_string(),
                    type_: None,
                },
                delta: Delta {
                    patches: vec![],
                    update_commitment: "u".to_string(),
                },
            },
            position: AnchoringPosition {
                transaction_time: time,
                transaction_number: number,
                operation_index: index,
            },
        }
    }

    fn store() -> OperationStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        OperationStore::open(&db).unwrap()
    }

    #[test]
    fn insert_is_idempotent() {
        let store = store();
        let op = op_at("abc", 1, 1, 0);
        store.insert(&op).unwrap();
        store.insert(&op).unwrap();
        assert_eq!(store.operations_for("abc").unwrap().len(), 1);
    }

    #[test]
    fn orders_by_anchoring_position() {
        let store = store();
        store.insert(&op_at("abc", 2, 5, 1)).unwrap();
        store.insert(&op_at("abc", 1, 2, 0)).unwrap();
        store.insert(&op_at("abc", 2, 5, 0)).unwrap();
        let ops = store.operations_for("abc").unwrap();
        let positions: Vec<_> = ops
            .iter()
            .map(|o| (o.position.transaction_time, o.position.transaction_number, o.position.operation_index))
            .collect();
        assert_eq!(positions, vec![(1, 2, 0), (2, 5, 0), (2, 5, 1)]);
    }

    #[test]
    fn does_not_leak_across_dids() {
        let store = store();
        store.insert(&op_at("abc", 1, 1, 0)).unwrap();
        store.insert(&op_at("abcd", 1, 1, 0)).unwrap();
        assert_eq!(store.operations_for("abc").unwrap().len(), 1);
        assert_eq!(store.operations_for("abcd").unwrap().len(), 1);
    }

    #[test]
    fn delete_above_removes_only_later_transactions() {
        let store = store();
        store.insert(&op_at("abc", 1, 100, 0)).unwrap();
        store.insert(&op_at("abc", 1, 101, 0)).unwrap();
        store.insert(&op_at("abc", 1, 102, 0)).unwrap();
        let removed = store.delete_above(100).unwrap();
        assert_eq!(removed, 2);
        let ops = store.operations_for("abc").unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].position.transaction_number, 100);
    }
}
