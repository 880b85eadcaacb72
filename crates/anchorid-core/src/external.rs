//! The two collaborator interfaces `anchorid` consumes but does not
//! implement in production form: the anchor chain and the content-addressable
//! store. Only in-memory test doubles ship here; a real adapter (a Bitcoin
//! RPC client, an IPFS client, ...) is explicitly out of scope.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::transaction::Transaction;

#[derive(Debug, Error)]
pub enum AnchorChainError {
    #[error("anchor string rejected by the chain: {0}")]
    Rejected(String),
    #[error("transport error reading the anchor chain: {0}")]
    Transport(String),
    /// `invalid_transaction_number_or_time_hash` (spec.md §6.1) — the
    /// Observer's cursor no longer matches the chain's view, a reorg.
    #[error("cursor (transaction_number={transaction_number:?}, time_hash={time_hash:?}) is no longer valid on the chain")]
    InvalidCursor {
        transaction_number: Option<u64>,
        time_hash: Option<String>,
    },
}

/// A writer's economic stake, bounding its per-batch operation allowance
/// (spec.md §6.1 `writerValueTimeLock`, §4.5's `writerMaxBatchSize`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueTimeLock {
    pub amount_locked: u64,
    pub identifier: String,
    pub lock_transaction_time: u64,
    pub normalized_fee: u64,
    pub owner: String,
    pub unlock_transaction_time: u64,
}

/// One page of `AnchorChainClient::transactions_since`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub more_transactions: bool,
}

#[derive(Debug, Error)]
pub enum CasError {
    #[error("no content found for URI {0}")]
    NotFound(String),
    #[error("content at {uri} exceeds the {max}-byte ceiling ({actual} bytes)")]
    TooLarge {
        uri: String,
        actual: usize,
        max: usize,
    },
    #[error("transport error reading the CAS: {0}")]
    Transport(String),
}

/// Read/write access to the external anchor chain. `anchorid` never holds
/// chain consensus itself; it only submits anchor strings and reads back
/// transactions in order.
#[async_trait]
pub trait AnchorChainClient: Send + Sync {
    /// Transactions strictly after `since`'s `(transaction_number,
    /// transaction_time_hash)` cursor, oldest first, up to `limit`. Returns
    /// `AnchorChainError::InvalidCursor` if the cursor no longer matches the
    /// chain's view (spec.md §4.7 step 2 — a potential reorg).
    async fn transactions_since(
        &self,
        since: Option<(u64, &str)>,
        limit: usize,
    ) -> Result<TransactionPage, AnchorChainError>;

    /// Submit an anchor string for inclusion in a future transaction, paying
    /// `fee` (spec.md §4.5 step 7: `fee ≥ max(normalizedFee, normalizedFee ×
    /// multiplier × n)`). Does not block for confirmation.
    async fn submit(&self, anchor_string: &str, fee: u64) -> Result<(), AnchorChainError>;

    /// The chain's current tip time and its hash, used by `LedgerClock`.
    async fn latest_time(&self) -> Result<(u64, String), AnchorChainError>;

    /// Of `candidates` (newest-first exponential-backoff samples from the
    /// TransactionStore), the most recent one the chain still considers
    /// valid — `None` if none are (spec.md §4.7 reorg handling step 1).
    async fn first_valid(
        &self,
        candidates: &[Transaction],
    ) -> Result<Option<Transaction>, AnchorChainError>;

    /// `writer`'s value-time-lock, if any (spec.md §4.5's
    /// `writerMaxBatchSize` derivation).
    async fn writer_value_time_lock(
        &self,
        writer: &str,
    ) -> Result<Option<ValueTimeLock>, AnchorChainError>;
}

/// Read/write access to the external content-addressable store.
#[async_trait]
pub trait CasClient: Send + Sync {
    /// Fetch the content behind `uri`, rejecting anything past `max_bytes`.
    async fn read(&self, uri: &str, max_bytes: usize) -> Result<Vec<u8>, CasError>;

    /// Store `content`, returning its CAS URI.
    async fn write(&self, content: &[u8]) -> Result<String, CasError>;
}

/// An in-process stand-in for a real anchor chain, used by the node's own
/// tests and as a starting point for a real adapter.
#[derive(Default)]
pub struct InMemoryAnchorChain {
    inner: Mutex<InMemoryAnchorChainState>,
}

#[derive(Default)]
struct InMemoryAnchorChainState {
    transactions: Vec<Transaction>,
    next_transaction_number: u64,
    current_time: u64,
    value_time_locks: BTreeMap<String, ValueTimeLock>,
}

impl InMemoryAnchorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transaction at `transaction_time`, assigning it the next
    /// strictly-increasing transaction number. Intended for tests that
    /// drive the chain directly rather than via `submit`.
    pub fn push_transaction(&self, transaction_time: u64, anchor_string: String, writer: String) {
        let mut state = self.inner.lock().expect("lock poisoned");
        let transaction_number = state.next_transaction_number;
        state.next_transaction_number += 1;
        state.current_time = state.current_time.max(transaction_time);
        state.transactions.push(Transaction {
            transaction_number,
            transaction_time,
            transaction_time_hash: format!("hash-{transaction_time}"),
            anchor_string,
            writer,
            fee_paid: 0,
            normalized_fee: 0,
        });
    }

    pub fn advance_time(&self, transaction_time: u64) {
        let mut state = self.inner.lock().expect("lock poisoned");
        state.current_time = state.current_time.max(transaction_time);
    }

    /// Configure `writer`'s value-time-lock, used by `BatchWriter` to derive
    /// its per-batch operation ceiling.
    pub fn set_value_time_lock(&self, writer: &str, lock: ValueTimeLock) {
        let mut state = self.inner.lock().expect("lock poisoned");
        state.value_time_locks.insert(writer.to_string(), lock);
    }

    /// Truncate the chain down to `keep_up_to_number` (inclusive), simulating
    /// a reorg that drops everything after it.
    pub fn truncate_after(&self, keep_up_to_number: u64) {
        let mut state = self.inner.lock().expect("lock poisoned");
        state
            .transactions
            .retain(|t| t.transaction_number <= keep_up_to_number);
    }
}

#[async_trait]
impl AnchorChainClient for InMemoryAnchorChain {
    async fn transactions_since(
        &self,
        since: Option<(u64, &str)>,
        limit: usize,
    ) -> Result<TransactionPage, AnchorChainError> {
        let state = self.inner.lock().expect("lock poisoned");
        let start = match since {
            None => 0,
            Some((number, hash)) => {
                // A cursor the chain no longer recognizes is exactly the
                // reorg trigger spec.md §4.7 step 2 describes.
                let known = state
                    .transactions
                    .iter()
                    .any(|t| t.transaction_number == number && t.transaction_time_hash == hash);
                if !known && number != 0 {
                    return Err(AnchorChainError::InvalidCursor {
                        transaction_number: Some(number),
                        time_hash: Some(hash.to_string()),
                    });
                }
                number + 1
            }
        };
        let mut transactions: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| t.transaction_number >= start)
            .cloned()
            .collect();
        let more_transactions = transactions.len() > limit;
        transactions.truncate(limit);
        Ok(TransactionPage {
            transactions,
            more_transactions,
        })
    }

    async fn submit(&self, anchor_string: &str, fee: u64) -> Result<(), AnchorChainError> {
        let mut state = self.inner.lock().expect("lock poisoned");
        let transaction_number = state.next_transaction_number;
        state.next_transaction_number += 1;
        let time = state.current_time + 1;
        state.current_time = time;
        state.transactions.push(Transaction {
            transaction_number,
            transaction_time: time,
            transaction_time_hash: format!("hash-{time}"),
            anchor_string: anchor_string.to_string(),
            writer: "local-writer".to_string(),
            fee_paid: fee,
            normalized_fee: fee,
        });
        Ok(())
    }

    async fn latest_time(&self) -> Result<(u64, String), AnchorChainError> {
        let state = self.inner.lock().expect("lock poisoned");
        Ok((state.current_time, format!("hash-{}", state.current_time)))
    }

    async fn first_valid(
        &self,
        candidates: &[Transaction],
    ) -> Result<Option<Transaction>, AnchorChainError> {
        let state = self.inner.lock().expect("lock poisoned");
        for candidate in candidates {
            if state.transactions.iter().any(|t| {
                t.transaction_number == candidate.transaction_number
                    && t.transaction_time_hash == candidate.transaction_time_hash
            }) {
                return Ok(Some(candidate.clone()));
            }
        }
        Ok(None)
    }

    async fn writer_value_time_lock(
        &self,
        writer: &str,
    ) -> Result<Option<ValueTimeLock>, AnchorChainError> {
        let state = self.inner.lock().expect("lock poisoned");
        Ok(state.value_time_locks.get(writer).cloned())
    }
}

/// An in-process content-addressable store keyed by the hash of its content.
#[derive(Default)]
pub struct InMemoryCas {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryCas {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CasClient for InMemoryCas {
    async fn read(&self, uri: &str, max_bytes: usize) -> Result<Vec<u8>, CasError> {
        let objects = self.objects.lock().expect("lock poisoned");
        let content = objects.get(uri).ok_or_else(|| CasError::NotFound(uri.to_string()))?;
        if content.len() > max_bytes {
            return Err(CasError::TooLarge {
                uri: uri.to_string(),
                actual: content.len(),
                max: max_bytes,
            });
        }
        Ok(content.clone())
    }

    async fn write(&self, content: &[u8]) -> Result<String, CasError> {
        let uri = crate::cas_uri_for(content);
        self.objects
            .lock()
            .expect("lock poisoned")
            .insert(uri.clone(), content.to_vec());
        Ok(uri)
    }
}
