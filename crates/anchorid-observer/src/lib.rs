//! The Observer (spec.md §4.7): pulls transactions from the anchor chain,
//! downloads and validates their file chains, and persists the resulting
//! operations so the Resolver can replay them.
//!
//! Deliberately close to stateless between ticks: rather than keep an
//! in-process queue that must be reconciled with storage on every restart,
//! each tick re-derives its work list from `transactions_since(cursor)` plus
//! whatever sits in the `UnresolvableTransactionStore`. A transaction that
//! fails to resolve stops the cursor from advancing past it — the ledger is
//! processed as a single ordered queue, not out of order — and is retried
//! with exponential backoff on later ticks.

pub mod download;
pub mod error;
pub mod processor;
pub mod reorg;
pub mod selector;

pub use download::{DownloadManager, DownloadOutcome, DEFAULT_DOWNLOAD_TIMEOUT};
pub use error::ObserverError;
pub use processor::ProcessOutcome;
pub use selector::BlockBudget;

use std::sync::Arc;
use std::time::Duration;

use anchorid_core::external::{AnchorChainClient, AnchorChainError};
use anchorid_core::transaction::Transaction;
use anchorid_protocol::ProtocolVersionManager;
use anchorid_state::unresolvable_store::UnresolvableTransactionRecord;
use anchorid_state::StateDb;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How many transactions one `transactions_since` call asks for.
pub const PAGE_SIZE: usize = 256;

/// Default period between ingestion ticks (spec.md §4.7 `observingInterval`).
pub const DEFAULT_OBSERVING_INTERVAL: Duration = Duration::from_secs(5);

/// `baseDelay` in spec.md §4.7 step 4's `nextRetryTime = firstFetchTime +
/// 2^attempts × baseDelay`.
const INITIAL_RETRY_DELAY_MS: u64 = 60_000;
const MAX_RETRY_DELAY_MS: u64 = 60 * 60 * 1000;

fn backoff_delay_ms(attempts: u32) -> u64 {
    INITIAL_RETRY_DELAY_MS
        .saturating_mul(1u64 << attempts.min(20))
        .min(MAX_RETRY_DELAY_MS)
}

pub struct Observer {
    chain: Arc<dyn AnchorChainClient>,
    db: StateDb,
    downloads: Arc<DownloadManager>,
    protocol: Arc<ProtocolVersionManager>,
}

impl Observer {
    pub fn new(
        chain: Arc<dyn AnchorChainClient>,
        db: StateDb,
        downloads: Arc<DownloadManager>,
        protocol: Arc<ProtocolVersionManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            chain,
            db,
            downloads,
            protocol,
        })
    }

    fn cursor(&self) -> Result<Option<(u64, String)>, ObserverError> {
        let last = self.db.transaction_store()?.last()?;
        Ok(last.map(|t| (t.transaction_number, t.transaction_time_hash)))
    }

    /// Run one ingestion cycle: fetch, select, process, commit a contiguous
    /// prefix. `now_ms`/`ledger_time` are injected so the tick stays a pure
    /// function of its inputs wherever possible.
    pub async fn tick(&self, ledger_time: u64, now_ms: u64) -> Result<usize, ObserverError> {
        let cursor = self.cursor()?;
        let page = match self
            .chain
            .transactions_since(cursor.as_ref().map(|(n, h)| (*n, h.as_str())), PAGE_SIZE)
            .await
        {
            Ok(page) => page,
            Err(AnchorChainError::InvalidCursor { .. }) => {
                warn!("chain rejected our cursor, running reorg recovery");
                reorg::recover(&self.chain, &self.db).await?;
                let cursor = self.cursor()?;
                self.chain
                    .transactions_since(cursor.as_ref().map(|(n, h)| (*n, h.as_str())), PAGE_SIZE)
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        if page.transactions.is_empty() {
            return Ok(0);
        }

        let version = self.protocol.version_at(ledger_time)?;
        let params = &version.parameters;

        let tx_store = self.db.transaction_store()?;
        let op_store = self.db.operation_store()?;
        let unresolvable = self.db.unresolvable_transaction_store()?;

        let selected = selector::select(&page.transactions, params, |block| {
            committed_budget(&tx_store, block).unwrap_or_default()
        });

        // Only the contiguous prefix of `selected` that is due for
        // (re)processing can ever be committed this tick — anything past a
        // not-yet-due transaction would leave a gap in the cursor. Collect
        // that prefix first, then dispatch its downloads concurrently
        // (spec.md §4.7 step 3: "concurrently dispatch each selected
        // transaction... capped by maxConcurrentDownloads" — the cap itself
        // lives in the shared `DownloadManager`'s semaphore, so every file
        // fetch across these concurrent `process_transaction` calls is
        // bounded by the same limit regardless of how many transactions are
        // in flight at once).
        let mut due: Vec<&Transaction> = Vec::with_capacity(selected.len());
        for tx in &selected {
            if let Some(record) = find_unresolvable(&unresolvable, tx)? {
                if record.next_retry_time_ms > now_ms {
                    debug!(
                        transaction_number = tx.transaction_number,
                        next_retry_time_ms = record.next_retry_time_ms,
                        "transaction not yet due for retry, stopping this tick"
                    );
                    break;
                }
            }
            due.push(tx);
        }

        let outcomes = futures::future::join_all(
            due.iter()
                .map(|tx| processor::process_transaction(tx, &self.downloads, params)),
        )
        .await;

        let mut committed = 0;
        for (tx, outcome) in due.into_iter().zip(outcomes) {
            match outcome {
                ProcessOutcome::SuccessProcessed(ops) => {
                    for op in &ops {
                        op_store.insert(op)?;
                    }
                    tx_store.append(tx)?;
                    unresolvable.remove(tx)?;
                    committed += 1;
                    info!(
                        transaction_number = tx.transaction_number,
                        operations = ops.len(),
                        "transaction processed"
                    );
                }
                ProcessOutcome::NeedsRetry => {
                    let record = match find_unresolvable(&unresolvable, tx)? {
                        Some(mut existing) => {
                            existing.attempts += 1;
                            existing.next_retry_time_ms = now_ms + backoff_delay_ms(existing.attempts);
                            existing
                        }
                        None => UnresolvableTransactionRecord {
                            transaction: tx.clone(),
                            first_fetch_time_ms: now_ms,
                            attempts: 1,
                            next_retry_time_ms: now_ms + backoff_delay_ms(1),
                        },
                    };
                    warn!(
                        transaction_number = tx.transaction_number,
                        attempts = record.attempts,
                        "CAS unreachable for transaction, scheduling retry"
                    );
                    unresolvable.upsert(&record)?;
                    break;
                }
            }
        }

        Ok(committed)
    }

    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        ledger_time: impl Fn() -> u64 + Send + Sync + 'static,
        now_ms: impl Fn() -> u64 + Send + Sync + 'static,
        mut stop: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.tick(ledger_time(), now_ms()).await {
                            warn!(error = %e, "observer tick failed");
                        }
                    }
                    _ = stop.changed() => {
                        if *stop.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

fn committed_budget(
    tx_store: &anchorid_state::transaction_store::TransactionStore,
    block: u64,
) -> Result<BlockBudget, ObserverError> {
    let all = tx_store.all_ascending()?;
    let mut budget = BlockBudget::default();
    for tx in all.iter().filter(|t| t.transaction_time == block) {
        budget.admitted_transactions += 1;
        if let Some((_, op_count)) = tx.split_anchor_string() {
            budget.admitted_operations += op_count as usize;
        }
    }
    Ok(budget)
}

fn find_unresolvable(
    store: &anchorid_state::unresolvable_store::UnresolvableTransactionStore,
    tx: &Transaction,
) -> Result<Option<UnresolvableTransactionRecord>, ObserverError> {
    Ok(store
        .all()?
        .into_iter()
        .find(|r| r.transaction.transaction_number == tx.transaction_number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorid_core::external::{CasClient, InMemoryAnchorChain, InMemoryCas};
    use anchorid_core::files::{ChunkFileReference, CoreOperationReferences, CreateReference, ProvisionalIndexFile};
    use anchorid_core::operation::{Delta, SuffixData};
    use anchorid_core::files::{encode_delta, CoreIndexFile};
    use anchorid_core::transaction::build_anchor_string;
    use anchorid_crypto::hash_to_multihash;

    async fn write_gzipped(cas: &InMemoryCas, value: &impl serde::Serialize) -> String {
        let json = serde_json::to_vec(value).unwrap();
        let compressed = anchorid_crypto::gzip::compress(&json);
        cas.write(&compressed).await.unwrap()
    }

    #[tokio::test]
    async fn tick_commits_a_resolvable_transaction_and_advances_the_cursor() {
        let cas = Arc::new(InMemoryCas::new());
        let chain = Arc::new(InMemoryAnchorChain::new());
        let db = StateDb::open_temporary().unwrap();
        let downloads = DownloadManager::new(cas.clone(), 4);
        let protocol = Arc::new(ProtocolVersionManager::default_table());

        let delta = Delta {
            patches: vec![],
            update_commitment: hash_to_multihash(b"update"),
        };
        let encoded_delta = encode_delta(&delta).unwrap();
        let suffix_data = SuffixData {
            delta_hash: hash_to_multihash(&serde_json::to_vec(&delta).unwrap()),
            recovery_commitment: hash_to_multihash(b"recovery"),
            type_: None,
        };
        let chunk_uri = write_gzipped(
            &cas,
            &anchorid_core::files::ChunkFile {
                deltas: vec![encoded_delta],
            },
        )
        .await;
        let provisional_index_uri = write_gzipped(
            &cas,
            &ProvisionalIndexFile {
                provisional_proof_file_uri: None,
                chunks: vec![ChunkFileReference {
                    chunk_file_uri: chunk_uri,
                }],
                operations: None,
            },
        )
        .await;
        let core_index_uri = write_gzipped(
            &cas,
            &CoreIndexFile {
                writer_lock_id: None,
                provisional_index_file_uri: Some(provisional_index_uri),
                core_proof_file_uri: None,
                operations: CoreOperationReferences {
                    create: vec![CreateReference { suffix_data }],
                    recover: vec![],
                    deactivate: vec![],
                },
            },
        )
        .await;

        chain.push_transaction(1, build_anchor_string(&core_index_uri, 1), "writer".to_string());

        let observer = Observer::new(chain, db, downloads, protocol);
        let committed = observer.tick(1, 0).await.unwrap();
        assert_eq!(committed, 1);
        assert_eq!(observer.db.transaction_store().unwrap().len(), 1);
        assert_eq!(observer.db.operation_store().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tick_on_an_empty_chain_commits_nothing() {
        let cas = Arc::new(InMemoryCas::new());
        let chain = Arc::new(InMemoryAnchorChain::new());
        let db = StateDb::open_temporary().unwrap();
        let downloads = DownloadManager::new(cas, 4);
        let protocol = Arc::new(ProtocolVersionManager::default_table());
        let observer = Observer::new(chain, db, downloads, protocol);
        assert_eq!(observer.tick(1, 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn a_missing_core_index_file_is_skipped_not_retried() {
        let cas = Arc::new(InMemoryCas::new());
        let chain = Arc::new(InMemoryAnchorChain::new());
        let db = StateDb::open_temporary().unwrap();
        let downloads = DownloadManager::new(cas, 4);
        let protocol = Arc::new(ProtocolVersionManager::default_table());

        chain.push_transaction(1, build_anchor_string("cas://missing", 1), "writer".to_string());

        let observer = Observer::new(chain, db, downloads, protocol);
        let committed = observer.tick(1, 0).await.unwrap();
        assert_eq!(committed, 1);
        assert_eq!(observer.db.operation_store().unwrap().len(), 0);
        assert!(observer
            .db
            .unresolvable_transaction_store()
            .unwrap()
            .is_empty());
    }

    struct AlwaysUnreachableCas;

    #[async_trait::async_trait]
    impl CasClient for AlwaysUnreachableCas {
        async fn read(
            &self,
            uri: &str,
            _max_bytes: usize,
        ) -> Result<Vec<u8>, anchorid_core::external::CasError> {
            Err(anchorid_core::external::CasError::Transport(format!(
                "simulated outage reading {uri}"
            )))
        }

        async fn write(&self, content: &[u8]) -> Result<String, anchorid_core::external::CasError> {
            Ok(anchorid_core::cas_uri_for(content))
        }
    }

    #[tokio::test]
    async fn an_unreachable_cas_stops_the_cursor_and_schedules_a_retry() {
        let cas: Arc<dyn CasClient> = Arc::new(AlwaysUnreachableCas);
        let chain = Arc::new(InMemoryAnchorChain::new());
        let db = StateDb::open_temporary().unwrap();
        let downloads = DownloadManager::new(cas, 4);
        let protocol = Arc::new(ProtocolVersionManager::default_table());

        chain.push_transaction(1, build_anchor_string("cas://unreachable", 1), "writer".to_string());

        let observer = Observer::new(chain, db, downloads, protocol);
        let committed = observer.tick(1, 0).await.unwrap();
        assert_eq!(committed, 0);
        assert!(observer.db.transaction_store().unwrap().is_empty());
        let pending = observer.db.unresolvable_transaction_store().unwrap().all().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);

        // Retrying before the backoff elapses is a no-op.
        assert_eq!(observer.tick(1, 1).await.unwrap(), 0);
    }
}
