//! Transactions whose file downloads could not be completed yet
//! (`CasNotReachable` or a transient proof-file parse failure), retried
//! with exponential backoff (spec.md §4.7). Upsert keyed on
//! `(transactionTime, transactionNumber)`; the `nextRetryTime` index is a
//! linear scan — this store is expected to stay small (only transactions
//! currently failing to resolve sit in it).

use serde::{Deserialize, Serialize};

use anchorid_core::transaction::Transaction;

use crate::error::StateError;

pub(crate) const TREE: &str = "unresolvable_transactions";

/// One entry in the unresolvable-transaction retry queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvableTransactionRecord {
    pub transaction: Transaction,
    /// Epoch milliseconds of the first time this transaction failed to
    /// resolve — the backoff base the Observer's exponential schedule
    /// counts from.
    pub first_fetch_time_ms: u64,
    pub attempts: u32,
    pub next_retry_time_ms: u64,
}

pub struct UnresolvableTransactionStore {
    tree: sled::Tree,
}

fn key(tx: &Transaction) -> Vec<u8> {
    let mut k = tx.transaction_time.to_be_bytes().to_vec();
    k.extend_from_slice(&tx.transaction_number.to_be_bytes());
    k
}

impl UnresolvableTransactionStore {
    pub(crate) fn open(db: &sled::Db) -> Result<Self, StateError> {
        Ok(Self {
            tree: db.open_tree(TREE)?,
        })
    }

    pub fn upsert(&self, record: &UnresolvableTransactionRecord) -> Result<(), StateError> {
        let k = key(&record.transaction);
        self.tree.insert(k, bincode::serialize(record)?)?;
        Ok(())
    }

    pub fn remove(&self, tx: &Transaction) -> Result<(), StateError> {
        self.tree.remove(key(tx))?;
        Ok(())
    }

    /// Every record whose `next_retry_time_ms <= now_ms` — the set the
    /// Observer merges back into its in-memory queue each tick.
    pub fn due(&self, now_ms: u64) -> Result<Vec<UnresolvableTransactionRecord>, StateError> {
        let mut out = Vec::new();
        for item in self.tree.iter() {
            let (_, bytes) = item?;
            let record: UnresolvableTransactionRecord = bincode::deserialize(&bytes)?;
            if record.next_retry_time_ms <= now_ms {
                out.push(record);
            }
        }
        Ok(out)
    }

    pub fn all(&self) -> Result<Vec<UnresolvableTransactionRecord>, StateError> {
        let mut out = Vec::new();
        for item in self.tree.iter() {
            let (_, bytes) = item?;
            out.push(bincode::deserialize(&bytes)?);
        }
        Ok(out)
    }

    /// Drop every record for a transaction number beyond `cutoff` — part of
    /// reorg rollback.
    pub fn delete_above(&self, cutoff: u64) -> Result<usize, StateError> {
        let mut removed = 0;
        for record in self.all()? {
            if record.transaction.transaction_number > cutoff {
                self.remove(&record.transaction)?;
                removed += 1;
            }
        }
        Ok(removed)
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

    fn store() -> UnresolvableTransactionStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        UnresolvableTransactionStore::open(&db).unwrap()
    }

    #[test]
    fn upsert_overwrites_same_transaction() {
        let store = store();
        let mut record = UnresolvableTransactionRecord {
            transaction: tx(1, 1),
            first_fetch_time_ms: 0,
            attempts: 1,
            next_retry_time_ms: 1000,
        };
        store.upsert(&record).unwrap();
        record.attempts = 2;
        record.next_retry_time_ms = 2000;
        store.upsert(&record).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.all().unwrap()[0].attempts, 2);
    }

    #[test]
    fn due_filters_by_next_retry_time() {
        let store = store();
        store
            .upsert(&UnresolvableTransactionRecord {
                transaction: tx(1, 1),
                first_fetch_time_ms: 0,
                attempts: 1,
                next_retry_time_ms: 500,
            })
            .unwrap();
        store
            .upsert(&UnresolvableTransactionRecord {
                transaction: tx(2, 1),
                first_fetch_time_ms: 0,
                attempts: 1,
                next_retry_time_ms: 5000,
            })
            .unwrap();
        let due = store.due(1000).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].transaction.transaction_number, 1);
    }
}
