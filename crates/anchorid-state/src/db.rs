//! The sled-backed database handle every store interface opens its trees
//! from. One `sled::Db` per node; each store gets its own named tree, the
//! same one-tree-per-concern layout `chronx-state` uses for accounts,
//! vertices, and time-locks.

use std::path::Path;

use crate::error::StateError;
use crate::operation_store::OperationStore;
use crate::service_state_store::ServiceStateStore;
use crate::transaction_store::TransactionStore;
use crate::unresolvable_store::UnresolvableTransactionStore;

/// Named trees:
///   operations_by_did      — didSuffix ++ time ++ number ++ index → bincode(AnchoredOperation)
///   operations_by_cutoff   — number ++ index ++ didSuffix         → operations_by_did key (for reorg deletes)
///   transactions           — be(transactionNumber)                → bincode(Transaction)
///   unresolvable           — be(time) ++ be(number)                → bincode(UnresolvableRecord)
///   service_state          — single "state" key                   → bincode(ServiceState)
#[derive(Clone)]
pub struct StateDb {
    db: sled::Db,
}

impl StateDb {
    /// Open or create the state database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// An ephemeral, in-memory database — used by tests and by nodes run
    /// with no `--data-dir` override in development mode.
    pub fn open_temporary() -> Result<Self, StateError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    pub fn operation_store(&self) -> Result<OperationStore, StateError> {
        OperationStore::open(&self.db)
    }

    pub fn transaction_store(&self) -> Result<TransactionStore, StateError> {
        TransactionStore::open(&self.db)
    }

    pub fn unresolvable_transaction_store(&self) -> Result<UnresolvableTransactionStore, StateError> {
        UnresolvableTransactionStore::open(&self.db)
    }

    pub fn service_state_store(&self) -> Result<ServiceStateStore, StateError> {
        ServiceStateStore::open(&self.db)
    }

    /// Drop and recreate every tree except `service_state` — the one-time
    /// database upgrade the core orchestrator runs when the stored schema
    /// version is older than the running code's (spec.md §4.10).
    pub fn clear_operational_trees(&self) -> Result<(), StateError> {
        for name in [
            crate::operation_store::DID_TREE,
            crate::operation_store::CUTOFF_TREE,
            crate::transaction_store::TREE,
            crate::unresolvable_store::TREE,
        ] {
            self.db.drop_tree(name)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<(), StateError> {
        self.db.flush()?;
        Ok(())
    }
}
