//! Durable state for the anchorid node: `OperationStore`, `TransactionStore`,
//! `UnresolvableTransactionStore`, and `ServiceStateStore` (spec.md §3, §5),
//! all backed by one sled database, one tree per concern.

pub mod db;
pub mod error;
pub mod operation_store;
pub mod service_state_store;
pub mod transaction_store;
pub mod unresolvable_store;

pub use db::StateDb;
pub use error::StateError;
pub use operation_store::OperationStore;
pub use service_state_store::{ServiceState, ServiceStateStore};
pub use transaction_store::TransactionStore;
pub use unresolvable_store::{UnresolvableTransactionRecord, UnresolvableTransactionStore};
