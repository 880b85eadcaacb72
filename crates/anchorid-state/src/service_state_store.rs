//! The one persisted document this node keeps outside the operation/
//! transaction histories: the cached ledger clock time and the database
//! schema version gating the one-time upgrade (spec.md §4.10, §6.4). Reads
//! and writes are full-document replacements, never partial updates.

use serde::{Deserialize, Serialize};

use crate::error::StateError;

const TREE: &str = "service_state";
const KEY: &str = "state";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    pub database_version: u32,
    pub approximate_time: u64,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            database_version: 0,
            approximate_time: 0,
        }
    }
}

pub struct ServiceStateStore {
    tree: sled::Tree,
}

impl ServiceStateStore {
    pub(crate) fn open(db: &sled::Db) -> Result<Self, StateError> {
        Ok(Self {
            tree: db.open_tree(TREE)?,
        })
    }

    pub fn get(&self) -> Result<ServiceState, StateError> {
        match self.tree.get(KEY)? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(ServiceState::default()),
        }
    }

    pub fn put(&self, state: &ServiceState) -> Result<(), StateError> {
        self.tree.insert(KEY, bincode::serialize(state)?)?;
        Ok(())
    }

    pub fn approximate_time(&self) -> Result<u64, StateError> {
        Ok(self.get()?.approximate_time)
    }

    pub fn set_approximate_time(&self, time: u64) -> Result<(), StateError> {
        let mut state = self.get()?;
        state.approximate_time = time;
        self.put(&state)
    }

    pub fn database_version(&self) -> Result<u32, StateError> {
        Ok(self.get()?.database_version)
    }

    pub fn set_database_version(&self, version: u32) -> Result<(), StateError> {
        let mut state = self.get()?;
        state.database_version = version;
        self.put(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ServiceStateStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        ServiceStateStore::open(&db).unwrap()
    }

    #[test]
    fn defaults_to_zero_when_unset() {
        let store = store();
        assert_eq!(store.get().unwrap(), ServiceState::default());
    }

    #[test]
    fn full_document_replacement_round_trips() {
        let store = store();
        store.set_approximate_time(42).unwrap();
        store.set_database_version(3).unwrap();
        let state = store.get().unwrap();
        assert_eq!(state.approximate_time, 42);
        assert_eq!(state.database_version, 3);
    }
}
