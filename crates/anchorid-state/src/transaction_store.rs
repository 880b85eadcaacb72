//! The reorg-tolerant record of transactions the Observer has committed.
//! Strictly monotone insertion by `transactionNumber`; duplicates are
//! no-ops; reverse deletes by cutoff undo a reorg rollback.

use anchorid_core::transaction::Transaction;

use crate::error::StateError;

pub(crate) const TREE: &str = "transactions";

pub struct TransactionStore {
    tree: sled::Tree,
}

fn key(transaction_number: u64) -> [u8; 8] {
    transaction_number.to_be_bytes()
}

impl TransactionStore {
    pub(crate) fn open(db: &sled::Db) -> Result<Self, StateError> {
        Ok(Self {
            tree: db.open_tree(TREE)?,
        })
    }

    /// Append `tx`. A transaction already recorded at the same
    /// `transaction_number` is left untouched (idempotent re-commit).
    pub fn append(&self, tx: &Transaction) -> Result<(), StateError> {
        let k = key(tx.transaction_number);
        if self.tree.contains_key(k)? {
            return Ok(());
        }
        self.tree.insert(k, bincode::serialize(tx)?)?;
        Ok(())
    }

    pub fn get(&self, transaction_number: u64) -> Result<Option<Transaction>, StateError> {
        match self.tree.get(key(transaction_number))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The most recently committed transaction, i.e. the one with the
    /// highest `transaction_number`.
    pub fn last(&self) -> Result<Option<Transaction>, StateError> {
        match self.tree.iter().next_back() {
            Some(item) => {
                let (_, bytes) = item?;
                Ok(Some(bincode::deserialize(&bytes)?))
            }
            None => Ok(None),
        }
    }

    /// Every transaction in ascending `transaction_number` order, newest
    /// last. Used by the Observer's reorg-sampling walk.
    pub fn all_ascending(&self) -> Result<Vec<Transaction>, StateError> {
        let mut out = Vec::new();
        for item in self.tree.iter() {
            let (_, bytes) = item?;
            out.push(bincode::deserialize(&bytes)?);
        }
        Ok(out)
    }

    /// Delete every transaction with `transaction_number > cutoff`.
    pub fn delete_above(&self, cutoff: u64) -> Result<usize, StateError> {
        let lower = (cutoff + 1).to_be_bytes().to_vec();
        let keys: Vec<_> = self
            .tree
            .range(lower..)
            .map(|item| item.map(|(k, _)| k.to_vec()))
            .collect::<Result<_, sled::Error>>()?;
        for k in &keys {
            self.tree.remove(k)?;
        }
        Ok(keys.len())
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(number: u64, time: u64) -> Transaction {
        Transaction {
            transaction_number: number,
            transaction_time: time,
            transaction_time_hash: format!("hash-{time}"),
            anchor_string: "cas://x.1".to_string(),
            writer: "w".to_string(),
            fee_paid: 0,
            normalized_fee: 0,
        }
    }

    fn store() -> TransactionStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        TransactionStore::open(&db).unwrap()
    }

    #[test]
    fn append_is_idempotent() {
        let store = store();
        store.append(&tx(1, 1)).unwrap();
        store.append(&tx(1, 1)).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn last_returns_highest_transaction_number() {
        let store = store();
        store.append(&tx(1, 1)).unwrap();
        store.append(&tx(5, 3)).unwrap();
        store.append(&tx(3, 2)).unwrap();
        assert_eq!(store.last().unwrap().unwrap().transaction_number, 5);
    }

    #[test]
    fn delete_above_is_a_reverse_delete() {
        let store = store();
        store.append(&tx(100, 10)).unwrap();
        store.append(&tx(101, 10)).unwrap();
        store.append(&tx(102, 11)).unwrap();
        let removed = store.delete_above(100).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.last().unwrap().unwrap().transaction_number, 100);
    }
}
