//! `BatchWriter`: the admission queue and periodic publisher that turns
//! locally submitted operations into an anchored batch (spec.md §4.5).
//!
//! Submission and publication are split deliberately: `submit` only ever
//! touches the in-memory queue and can never fail because of anything the
//! anchor chain or CAS are doing; `publish_once` is the only place a CAS or
//! chain error can surface, and on failure it leaves the queue untouched so
//! the next tick retries the same batch.

pub mod error;

pub use error::BatchWriterError;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use anchorid_core::external::{AnchorChainClient, CasClient};
use anchorid_core::files::{
    encode_delta, ChunkFile, ChunkFileReference, CoreIndexFile, CoreOperationReferences,
    CreateReference, ProofFile, ProvisionalIndexFile, ProvisionalOperationReferences,
    RevealedOperationReference,
};
use anchorid_core::operation::Operation;
use anchorid_core::transaction::build_anchor_string;
use anchorid_crypto::derive_suffix;
use anchorid_protocol::ProtocolVersionManager;

/// Default periodic-publish cadence (spec.md §4.5).
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_secs(1);

struct QueuedOperation {
    did_suffix: String,
    operation: Operation,
}

fn did_suffix_of(op: &Operation) -> Result<String, BatchWriterError> {
    match op.explicit_did_suffix() {
        Some(suffix) => Ok(suffix.as_str().to_string()),
        None => match op {
            Operation::Create { suffix_data, .. } => {
                Ok(derive_suffix(suffix_data)?.as_str().to_string())
            }
            _ => unreachable!("explicit_did_suffix is None only for Create"),
        },
    }
}

pub struct BatchWriter {
    writer_id: String,
    anchor_chain: Arc<dyn AnchorChainClient>,
    cas: Arc<dyn CasClient>,
    protocol: Arc<ProtocolVersionManager>,
    queue: Mutex<VecDeque<QueuedOperation>>,
}

impl BatchWriter {
    pub fn new(
        writer_id: impl Into<String>,
        anchor_chain: Arc<dyn AnchorChainClient>,
        cas: Arc<dyn CasClient>,
        protocol: Arc<ProtocolVersionManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            writer_id: writer_id.into(),
            anchor_chain,
            cas,
            protocol,
            queue: Mutex::new(VecDeque::new()),
        })
    }

    /// Admit `operation` to the queue. Rejects a second queued operation for
    /// a DID already represented in the queue (spec.md §4.5) — the caller is
    /// expected to have already run it through `anchorid-parser`'s
    /// validation and signature checks.
    pub async fn submit(&self, operation: Operation) -> Result<(), BatchWriterError> {
        let did_suffix = did_suffix_of(&operation)?;
        let mut queue = self.queue.lock().await;
        if queue.iter().any(|q| q.did_suffix == did_suffix) {
            return Err(BatchWriterError::QueueingMultipleOperationsPerDidNotAllowed(
                did_suffix,
            ));
        }
        queue.push_back(QueuedOperation {
            did_suffix,
            operation,
        });
        Ok(())
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// `writerMaxBatchSize` (spec.md §4.5): bounded by the protocol's
    /// per-batch ceiling, further bounded by the writer's value-time-lock
    /// (if any) divided by the per-version lock-amount multiplier.
    async fn writer_max_batch_size(&self, ledger_time: u64) -> Result<usize, BatchWriterError> {
        let version = self.protocol.version_at(ledger_time)?;
        let protocol_max = version.parameters.max_operations_per_batch;
        match self.anchor_chain.writer_value_time_lock(&self.writer_id).await? {
            Some(lock) if version.parameters.value_time_lock_amount_multiplier > 0 => {
                let allowance =
                    lock.amount_locked / version.parameters.value_time_lock_amount_multiplier;
                Ok(protocol_max.min(allowance as usize))
            }
            _ => Ok(protocol_max),
        }
    }

    /// The fee to submit alongside a batch of `n` operations (spec.md §4.5
    /// step 7): `max(normalizedFee, normalizedFee × multiplier × n)`, where
    /// `normalizedFee` is the writer's own value-time-lock fee (zero absent
    /// a lock) and `multiplier` is this version's
    /// `normalized_fee_to_per_operation_fee_multiplier`.
    async fn required_fee(&self, ledger_time: u64, n: usize) -> Result<u64, BatchWriterError> {
        let version = self.protocol.version_at(ledger_time)?;
        let normalized_fee = match self.anchor_chain.writer_value_time_lock(&self.writer_id).await? {
            Some(lock) => lock.normalized_fee,
            None => 0,
        };
        let multiplier = version.parameters.normalized_fee_to_per_operation_fee_multiplier;
        let per_operation = normalized_fee
            .saturating_mul(multiplier)
            .saturating_mul(n as u64);
        Ok(normalized_fee.max(per_operation))
    }

    /// Run one publish attempt. A no-op if the queue is empty. Returns the
    /// number of operations published.
    pub async fn publish_once(&self, ledger_time: u64) -> Result<usize, BatchWriterError> {
        let max_batch_size = self.writer_max_batch_size(ledger_time).await?;

        let batch: Vec<(String, Operation)> = {
            let queue = self.queue.lock().await;
            queue
                .iter()
                .take(max_batch_size)
                .map(|q| (q.did_suffix.clone(), q.operation.clone()))
                .collect()
        };
        if batch.is_empty() {
            return Ok(0);
        }

        let anchor_string = self.build_and_write_batch(&batch).await?;
        let fee = self.required_fee(ledger_time, batch.len()).await?;
        self.anchor_chain.submit(&anchor_string, fee).await?;

        let mut queue = self.queue.lock().await;
        for _ in 0..batch.len() {
            queue.pop_front();
        }
        info!(count = batch.len(), anchor_string, "published batch");
        Ok(batch.len())
    }

    async fn build_and_write_batch(
        &self,
        batch: &[(String, Operation)],
    ) -> Result<String, BatchWriterError> {
        let mut creates = Vec::new();
        let mut recovers = Vec::new();
        let mut deactivates = Vec::new();
        let mut updates = Vec::new();

        for (did_suffix, op) in batch {
            match op {
                Operation::Create { .. } => creates.push(op.clone()),
                Operation::Recover { .. } => recovers.push((did_suffix.clone(), op.clone())),
                Operation::Deactivate { .. } => deactivates.push((did_suffix.clone(), op.clone())),
                Operation::Update { .. } => updates.push((did_suffix.clone(), op.clone())),
            }
        }

        // Chunk file: every delta, creates ++ recovers ++ updates.
        let mut deltas = Vec::new();
        let mut create_refs = Vec::new();
        for op in &creates {
            let Operation::Create { suffix_data, delta } = op else {
                unreachable!()
            };
            create_refs.push(CreateReference {
                suffix_data: suffix_data.clone(),
            });
            deltas.push(encode_delta(delta)?);
        }
        for (_, op) in &recovers {
            let Operation::Recover { delta, .. } = op else {
                unreachable!()
            };
            deltas.push(encode_delta(delta)?);
        }
        for (_, op) in &updates {
            let Operation::Update { delta, .. } = op else {
                unreachable!()
            };
            deltas.push(encode_delta(delta)?);
        }
        let chunk_file = ChunkFile { deltas };
        let chunk_uri = self.write_gzipped_json(&chunk_file).await?;

        // Core proof file: recovers ++ deactivates, in core-index order.
        let mut core_proofs = Vec::new();
        let mut recover_refs = Vec::new();
        for (suffix, op) in &recovers {
            let Operation::Recover {
                reveal_value,
                signed_data,
                ..
            } = op
            else {
                unreachable!()
            };
            recover_refs.push(RevealedOperationReference {
                did_suffix: suffix.clone(),
                reveal_value: reveal_value.clone(),
            });
            core_proofs.push(signed_data.clone());
        }
        let mut deactivate_refs = Vec::new();
        for (suffix, op) in &deactivates {
            let Operation::Deactivate {
                reveal_value,
                signed_data,
                ..
            } = op
            else {
                unreachable!()
            };
            deactivate_refs.push(RevealedOperationReference {
                did_suffix: suffix.clone(),
                reveal_value: reveal_value.clone(),
            });
            core_proofs.push(signed_data.clone());
        }
        let core_proof_file_uri = if core_proofs.is_empty() {
            None
        } else {
            Some(
                self.write_gzipped_json(&ProofFile {
                    proofs: core_proofs,
                })
                .await?,
            )
        };

        // Provisional index + proof: present unless the batch is only
        // deactivates (spec.md §4.3).
        let mut update_refs = Vec::new();
        let mut provisional_proofs = Vec::new();
        for (suffix, op) in &updates {
            let Operation::Update {
                reveal_value,
                signed_data,
                ..
            } = op
            else {
                unreachable!()
            };
            update_refs.push(RevealedOperationReference {
                did_suffix: suffix.clone(),
                reveal_value: reveal_value.clone(),
            });
            provisional_proofs.push(signed_data.clone());
        }

        let provisional_index_file_uri = if creates.is_empty() && recovers.is_empty() {
            None
        } else {
            let provisional_proof_file_uri = if provisional_proofs.is_empty() {
                None
            } else {
                Some(
                    self.write_gzipped_json(&ProofFile {
                        proofs: provisional_proofs,
                    })
                    .await?,
                )
            };
            let operations = if update_refs.is_empty() {
                None
            } else {
                Some(ProvisionalOperationReferences { update: update_refs })
            };
            let provisional_index_file = ProvisionalIndexFile {
                provisional_proof_file_uri,
                chunks: vec![ChunkFileReference {
                    chunk_file_uri: chunk_uri,
                }],
                operations,
            };
            Some(self.write_gzipped_json(&provisional_index_file).await?)
        };

        let core_index_file = CoreIndexFile {
            writer_lock_id: None,
            provisional_index_file_uri,
            core_proof_file_uri,
            operations: CoreOperationReferences {
                create: create_refs,
                recover: recover_refs,
                deactivate: deactivate_refs,
            },
        };
        let core_index_uri = self.write_gzipped_json(&core_index_file).await?;

        Ok(build_anchor_string(&core_index_uri, batch.len() as u64))
    }

    async fn write_gzipped_json(
        &self,
        value: &impl serde::Serialize,
    ) -> Result<String, BatchWriterError> {
        let json = serde_json::to_vec(value)
            .map_err(|e| BatchWriterError::Encoding(e.to_string()))?;
        let compressed = anchorid_crypto::gzip::compress(&json);
        Ok(self.cas.write(&compressed).await?)
    }

    /// Spawn the periodic publish loop, reading `ledger_time` fresh each
    /// tick from the caller-supplied closure (typically `LedgerClock::get_time`).
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        ledger_time: impl Fn() -> u64 + Send + Sync + 'static,
        mut stop: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.publish_once(ledger_time()).await {
                            warn!(error = %e, "batch publish failed, retrying next tick");
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

#[cfg(test)]
mod tests {
    use super::*;
    use anchorid_core::external::{InMemoryAnchorChain, InMemoryCas};
    use anchorid_core::operation::{Delta, SuffixData};
    use anchorid_crypto::hash_to_multihash;

    fn create_op(tag: &str) -> Operation {
        let delta = Delta {
            patches: vec![],
            update_commitment: hash_to_multihash(format!("update-{tag}").as_bytes()),
        };
        let delta_hash = hash_to_multihash(&serde_json::to_vec(&delta).unwrap());
        Operation::Create {
            suffix_data: SuffixData {
                delta_hash,
                recovery_commitment: hash_to_multihash(format!("recovery-{tag}").as_bytes()),
                type_: None,
            },
            delta,
        }
    }

    fn writer() -> (Arc<BatchWriter>, Arc<InMemoryAnchorChain>, Arc<InMemoryCas>) {
        let chain = Arc::new(InMemoryAnchorChain::new());
        let cas = Arc::new(InMemoryCas::new());
        let protocol = Arc::new(ProtocolVersionManager::default_table());
        let writer = BatchWriter::new("writer-1", chain.clone(), cas.clone(), protocol);
        (writer, chain, cas)
    }

    #[tokio::test]
    async fn rejects_a_second_operation_for_the_same_did() {
        let (writer, _chain, _cas) = writer();
        let op = create_op("a");
        let suffix = did_suffix_of(&op).unwrap();
        writer.submit(op).await.unwrap();

        let second = create_op("a");
        assert_eq!(did_suffix_of(&second).unwrap(), suffix);
        let err = writer.submit(second).await.unwrap_err();
        assert!(matches!(
            err,
            BatchWriterError::QueueingMultipleOperationsPerDidNotAllowed(_)
        ));
    }

    #[tokio::test]
    async fn publish_once_drains_the_queue_and_submits_an_anchor_string() {
        let (writer, chain, _cas) = writer();
        writer.submit(create_op("a")).await.unwrap();
        writer.submit(create_op("b")).await.unwrap();
        assert_eq!(writer.queue_len().await, 2);

        let published = writer.publish_once(0).await.unwrap();
        assert_eq!(published, 2);
        assert_eq!(writer.queue_len().await, 0);

        let latest = chain.latest_time().await.unwrap();
        assert!(latest.0 > 0);
    }

    #[tokio::test]
    async fn publish_once_pays_a_fee_derived_from_the_value_time_lock() {
        let (writer, chain, _cas) = writer();
        chain.set_value_time_lock(
            "writer-1",
            anchorid_core::external::ValueTimeLock {
                amount_locked: 100,
                identifier: "lock-1".to_string(),
                lock_transaction_time: 0,
                normalized_fee: 10,
                owner: "writer-1".to_string(),
                unlock_transaction_time: 1000,
            },
        );
        writer.submit(create_op("a")).await.unwrap();
        writer.submit(create_op("b")).await.unwrap();
        let published_count = writer.publish_once(0).await.unwrap();
        assert_eq!(published_count, 2);

        let page = chain.transactions_since(None, 10).await.unwrap();
        let published = page.transactions.last().unwrap();
        // multiplier is 1 in the default table and n=2, so the per-operation
        // term (normalizedFee × multiplier × n = 20) dominates the floor
        // (normalizedFee = 10).
        assert_eq!(published.normalized_fee, 20);
        assert_eq!(published.fee_paid, 20);
    }

    #[tokio::test]
    async fn publish_once_is_a_no_op_on_an_empty_queue() {
        let (writer, _chain, _cas) = writer();
        assert_eq!(writer.publish_once(0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn value_time_lock_caps_the_batch_size() {
        let (writer, chain, _cas) = writer();
        chain.set_value_time_lock(
            "writer-1",
            anchorid_core::external::ValueTimeLock {
                amount_locked: 1,
                identifier: "lock-1".to_string(),
                lock_transaction_time: 0,
                normalized_fee: 0,
                owner: "writer-1".to_string(),
                unlock_transaction_time: 1000,
            },
        );
        writer.submit(create_op("a")).await.unwrap();
        writer.submit(create_op("b")).await.unwrap();

        let published = writer.publish_once(0).await.unwrap();
        assert_eq!(published, 1);
        assert_eq!(writer.queue_len().await, 1);
    }
}
