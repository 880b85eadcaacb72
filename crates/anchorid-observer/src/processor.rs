//! `TransactionProcessor`: downloads and validates one transaction's full
//! file chain (core index → core proof / provisional index → provisional
//! proof → chunk) and reassembles it into anchored operations
//! (spec.md §4.7).
//!
//! A malformed or internally inconsistent file anywhere in the chain is a
//! protocol violation, not a retry condition: the transaction is skipped
//! with an empty contribution rather than blocking the cursor forever.
//! Only `CasNotReachable` — a download that might succeed later — asks the
//! caller to retry.

use anchorid_core::files::{ChunkFile, CoreIndexFile, ProofFile, ProvisionalIndexFile};
use anchorid_core::identifier::DidSuffix;
use anchorid_core::operation::{AnchoredOperation, AnchoringPosition, Operation};
use anchorid_core::transaction::Transaction;
use anchorid_crypto::derive_suffix;
use anchorid_protocol::VersionParameters;
use tracing::debug;

use crate::download::{DownloadManager, DownloadOutcome};

#[derive(Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Done — zero or more operations were extracted, for any reason short
    /// of a transient CAS outage.
    SuccessProcessed(Vec<AnchoredOperation>),
    /// A download hit `CasNotReachable`; try this transaction again later.
    NeedsRetry,
}

async fn fetch_and_decompress(
    downloads: &DownloadManager,
    uri: &str,
    max_size: usize,
    decompression_cap: usize,
) -> Result<Option<Vec<u8>>, ()> {
    match downloads.download(uri, max_size).await {
        DownloadOutcome::Success(bytes) => {
            match anchorid_crypto::gzip::decompress(&bytes, decompression_cap) {
                Ok(decompressed) => Ok(Some(decompressed)),
                Err(e) => {
                    debug!(error = %e, uri, "file failed to decompress, treating as absent");
                    Ok(None)
                }
            }
        }
        DownloadOutcome::NotFound | DownloadOutcome::MaxSizeExceeded | DownloadOutcome::InvalidHash => {
            Ok(None)
        }
        DownloadOutcome::CasNotReachable => Err(()),
    }
}

/// Process one transaction's file chain into anchored operations.
pub async fn process_transaction(
    tx: &Transaction,
    downloads: &DownloadManager,
    params: &VersionParameters,
) -> ProcessOutcome {
    let Some((core_index_uri, _declared_count)) = tx.split_anchor_string() else {
        debug!(anchor_string = %tx.anchor_string, "malformed anchor string, skipping");
        return ProcessOutcome::SuccessProcessed(Vec::new());
    };

    let core_index_bytes = match fetch_and_decompress(
        downloads,
        core_index_uri,
        params.max_core_index_file_size,
        params.decompression_cap(params.max_core_index_file_size),
    )
    .await
    {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return ProcessOutcome::SuccessProcessed(Vec::new()),
        Err(()) => return ProcessOutcome::NeedsRetry,
    };

    let core_index: CoreIndexFile = match serde_json::from_slice(&core_index_bytes) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "core index file failed to parse, skipping");
            return ProcessOutcome::SuccessProcessed(Vec::new());
        }
    };

    if let Some(lock_id) = &core_index.writer_lock_id {
        if lock_id.len() > params.max_writer_lock_id_bytes {
            debug!("writer_lock_id exceeds ceiling, skipping transaction");
            return ProcessOutcome::SuccessProcessed(Vec::new());
        }
    }

    // Reject duplicate DID suffixes within one core index file.
    let mut seen = std::collections::HashSet::new();
    let mut create_suffixes = Vec::with_capacity(core_index.operations.create.len());
    for create in &core_index.operations.create {
        let suffix = match derive_suffix(&create.suffix_data) {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "create reference does not derive a valid suffix, skipping");
                return ProcessOutcome::SuccessProcessed(Vec::new());
            }
        };
        if !seen.insert(suffix.as_str().to_string()) {
            debug!("duplicate DID suffix within one core index file, skipping");
            return ProcessOutcome::SuccessProcessed(Vec::new());
        }
        create_suffixes.push(suffix);
    }
    for recover in &core_index.operations.recover {
        if !seen.insert(recover.did_suffix.clone()) {
            return ProcessOutcome::SuccessProcessed(Vec::new());
        }
    }
    for deactivate in &core_index.operations.deactivate {
        if !seen.insert(deactivate.did_suffix.clone()) {
            return ProcessOutcome::SuccessProcessed(Vec::new());
        }
    }

    let has_creates_or_recovers =
        !core_index.operations.create.is_empty() || !core_index.operations.recover.is_empty();
    if has_creates_or_recovers && core_index.provisional_index_file_uri.is_none() {
        debug!("provisional index URI missing despite creates/recovers, skipping");
        return ProcessOutcome::SuccessProcessed(Vec::new());
    }
    if !has_creates_or_recovers && core_index.provisional_index_file_uri.is_some() {
        debug!("provisional index URI present for an only-deactivate batch, skipping");
        return ProcessOutcome::SuccessProcessed(Vec::new());
    }

    let recover_deactivate_count =
        core_index.operations.recover.len() + core_index.operations.deactivate.len();
    let core_proofs = if recover_deactivate_count > 0 {
        let Some(uri) = &core_index.core_proof_file_uri else {
            debug!("core proof URI missing despite recover/deactivate references, skipping");
            return ProcessOutcome::SuccessProcessed(Vec::new());
        };
        let bytes = match fetch_and_decompress(
            downloads,
            uri,
            params.max_proof_file_size,
            params.decompression_cap(params.max_proof_file_size),
        )
        .await
        {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return ProcessOutcome::SuccessProcessed(Vec::new()),
            Err(()) => return ProcessOutcome::NeedsRetry,
        };
        let proof_file: ProofFile = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(_) => return ProcessOutcome::SuccessProcessed(Vec::new()),
        };
        if proof_file.proofs.len() != recover_deactivate_count {
            debug!("core proof count does not match core index references, skipping");
            return ProcessOutcome::SuccessProcessed(Vec::new());
        }
        proof_file.proofs
    } else {
        Vec::new()
    };

    // Provisional index file (only consulted when present).
    let mut update_refs = Vec::new();
    let mut provisional_proofs = Vec::new();
    let mut chunk_file_uri = None;
    if let Some(uri) = &core_index.provisional_index_file_uri {
        let bytes = match fetch_and_decompress(
            downloads,
            uri,
            params.max_provisional_index_file_size,
            params.decompression_cap(params.max_provisional_index_file_size),
        )
        .await
        {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return ProcessOutcome::SuccessProcessed(Vec::new()),
            Err(()) => return ProcessOutcome::NeedsRetry,
        };
        let provisional_index: ProvisionalIndexFile = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(_) => return ProcessOutcome::SuccessProcessed(Vec::new()),
        };
        if let Some(ops) = &provisional_index.operations {
            update_refs = ops.update.clone();
        }
        if let Some(first_chunk) = provisional_index.chunks.first() {
            chunk_file_uri = Some(first_chunk.chunk_file_uri.clone());
        }

        if !update_refs.is_empty() {
            let Some(proof_uri) = &provisional_index.provisional_proof_file_uri else {
                debug!("provisional proof URI missing despite update references, skipping");
                return ProcessOutcome::SuccessProcessed(Vec::new());
            };
            let bytes = match fetch_and_decompress(
                downloads,
                proof_uri,
                params.max_proof_file_size,
                params.decompression_cap(params.max_proof_file_size),
            )
            .await
            {
                Ok(Some(bytes)) => bytes,
                Ok(None) => return ProcessOutcome::SuccessProcessed(Vec::new()),
                Err(()) => return ProcessOutcome::NeedsRetry,
            };
            let proof_file: ProofFile = match serde_json::from_slice(&bytes) {
                Ok(v) => v,
                Err(_) => return ProcessOutcome::SuccessProcessed(Vec::new()),
            };
            if proof_file.proofs.len() != update_refs.len() {
                return ProcessOutcome::SuccessProcessed(Vec::new());
            }
            provisional_proofs = proof_file.proofs;
        }
    }

    let total_deltas_expected =
        core_index.operations.create.len() + core_index.operations.recover.len() + update_refs.len();

    let chunk_file = if total_deltas_expected > 0 {
        let Some(uri) = chunk_file_uri else {
            debug!("deltas expected but no chunk file referenced, skipping");
            return ProcessOutcome::SuccessProcessed(Vec::new());
        };
        let bytes = match fetch_and_decompress(
            downloads,
            &uri,
            params.max_chunk_file_size,
            params.decompression_cap(params.max_chunk_file_size),
        )
        .await
        {
            Ok(Some(bytes)) => bytes,
            // A downloadable provisional index but a missing/unreadable
            // chunk file: resolved Open Question (spec.md §9) — treat as
            // SuccessProcessed with an empty contribution rather than retry.
            Ok(None) => return ProcessOutcome::SuccessProcessed(Vec::new()),
            Err(()) => return ProcessOutcome::NeedsRetry,
        };
        match serde_json::from_slice::<ChunkFile>(&bytes) {
            Ok(v) => v,
            Err(_) => return ProcessOutcome::SuccessProcessed(Vec::new()),
        }
    } else {
        ChunkFile { deltas: Vec::new() }
    };

    if chunk_file.deltas.len() != total_deltas_expected {
        debug!("chunk file delta count does not match index references, skipping");
        return ProcessOutcome::SuccessProcessed(Vec::new());
    }

    let mut deltas = chunk_file.deltas.iter();
    let mut operations = Vec::new();
    let mut operation_index: u32 = 0;

    for (create_ref, suffix) in core_index.operations.create.iter().zip(create_suffixes.iter()) {
        let Some(encoded_delta) = deltas.next() else {
            break;
        };
        let delta = match anchorid_core::files::decode_delta(encoded_delta) {
            Ok(d) => d,
            Err(_) => continue,
        };
        operations.push(anchored(
            suffix.clone(),
            Operation::Create {
                suffix_data: create_ref.suffix_data.clone(),
                delta,
            },
            tx,
            operation_index,
        ));
        operation_index += 1;
    }

    for (recover_ref, signed_data) in core_index
        .operations
        .recover
        .iter()
        .zip(core_proofs.iter())
    {
        let Some(encoded_delta) = deltas.next() else {
            break;
        };
        let delta = match anchorid_core::files::decode_delta(encoded_delta) {
            Ok(d) => d,
            Err(_) => continue,
        };
        operations.push(anchored(
            DidSuffix(recover_ref.did_suffix.clone()),
            Operation::Recover {
                did_suffix: DidSuffix(recover_ref.did_suffix.clone()),
                reveal_value: recover_ref.reveal_value.clone(),
                signed_data: signed_data.clone(),
                delta,
            },
            tx,
            operation_index,
        ));
        operation_index += 1;
    }

    for (deactivate_ref, signed_data) in core_index
        .operations
        .deactivate
        .iter()
        .zip(core_proofs.iter().skip(core_index.operations.recover.len()))
    {
        operations.push(anchored(
            DidSuffix(deactivate_ref.did_suffix.clone()),
            Operation::Deactivate {
                did_suffix: DidSuffix(deactivate_ref.did_suffix.clone()),
                reveal_value: deactivate_ref.reveal_value.clone(),
                signed_data: signed_data.clone(),
            },
            tx,
            operation_index,
        ));
        operation_index += 1;
    }

    for (update_ref, signed_data) in update_refs.iter().zip(provisional_proofs.iter()) {
        let Some(encoded_delta) = deltas.next() else {
            break;
        };
        let delta = match anchorid_core::files::decode_delta(encoded_delta) {
            Ok(d) => d,
            Err(_) => continue,
        };
        operations.push(anchored(
            DidSuffix(update_ref.did_suffix.clone()),
            Operation::Update {
                did_suffix: DidSuffix(update_ref.did_suffix.clone()),
                reveal_value: update_ref.reveal_value.clone(),
                signed_data: signed_data.clone(),
                delta,
            },
            tx,
            operation_index,
        ));
        operation_index += 1;
    }

    ProcessOutcome::SuccessProcessed(operations)
}

fn anchored(
    did_suffix: DidSuffix,
    operation: Operation,
    tx: &Transaction,
    operation_index: u32,
) -> AnchoredOperation {
    AnchoredOperation {
        did_suffix,
        operation,
        position: AnchoringPosition {
            transaction_time: tx.transaction_time,
            transaction_number: tx.transaction_number,
            operation_index,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorid_core::external::{CasClient, InMemoryCas};
    use anchorid_core::files::{
        ChunkFileReference, CoreOperationReferences, CreateReference, RevealedOperationReference,
    };
    use anchorid_core::operation::{Delta, SuffixData};
    use anchorid_core::transaction::build_anchor_string;
    use anchorid_crypto::hash_to_multihash;
    use std::sync::Arc;

    fn params() -> VersionParameters {
        anchorid_protocol::ProtocolVersionManager::default_table()
            .version_at(0)
            .unwrap()
            .parameters
            .clone()
    }

    async fn write_gzipped(cas: &InMemoryCas, value: &impl serde::Serialize) -> String {
        let json = serde_json::to_vec(value).unwrap();
        let compressed = anchorid_crypto::gzip::compress(&json);
        cas.write(&compressed).await.unwrap()
    }

    fn tx_for(core_index_uri: &str, op_count: u64) -> Transaction {
        Transaction {
            transaction_number: 1,
            transaction_time: 1,
            transaction_time_hash: "hash-1".to_string(),
            anchor_string: build_anchor_string(core_index_uri, op_count),
            writer: "writer".to_string(),
            fee_paid: 0,
            normalized_fee: 0,
        }
    }

    #[tokio::test]
    async fn processes_a_single_create_batch() {
        let cas = InMemoryCas::new();
        let delta = Delta {
            patches: vec![],
            update_commitment: hash_to_multihash(b"update"),
        };
        let delta_hash = hash_to_multihash(&serde_json::to_vec(&delta).unwrap());
        let suffix_data = SuffixData {
            delta_hash,
            recovery_commitment: hash_to_multihash(b"recovery"),
            type_: None,
        };
        let encoded_delta = anchorid_core::files::encode_delta(&delta).unwrap();
        let chunk = ChunkFile {
            deltas: vec![encoded_delta],
        };
        let chunk_uri = write_gzipped(&cas, &chunk).await;
        let provisional_index = ProvisionalIndexFile {
            provisional_proof_file_uri: None,
            chunks: vec![ChunkFileReference {
                chunk_file_uri: chunk_uri,
            }],
            operations: None,
        };
        let provisional_index_uri = write_gzipped(&cas, &provisional_index).await;
        let core_index = CoreIndexFile {
            writer_lock_id: None,
            provisional_index_file_uri: Some(provisional_index_uri),
            core_proof_file_uri: None,
            operations: CoreOperationReferences {
                create: vec![CreateReference { suffix_data }],
                recover: vec![],
                deactivate: vec![],
            },
        };
        let core_index_uri = write_gzipped(&cas, &core_index).await;

        let tx = tx_for(&core_index_uri, 1);
        let downloads = DownloadManager::new(Arc::new(cas), 4);
        match process_transaction(&tx, &downloads, &params()).await {
            ProcessOutcome::SuccessProcessed(ops) => {
                assert_eq!(ops.len(), 1);
                assert!(matches!(ops[0].operation, Operation::Create { .. }));
            }
            ProcessOutcome::NeedsRetry => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn missing_core_index_file_is_skipped_not_retried() {
        let cas = InMemoryCas::new();
        let tx = tx_for("cas://missing", 1);
        let downloads = DownloadManager::new(Arc::new(cas), 4);
        match process_transaction(&tx, &downloads, &params()).await {
            ProcessOutcome::SuccessProcessed(ops) => assert!(ops.is_empty()),
            ProcessOutcome::NeedsRetry => panic!("missing core index should not retry"),
        }
    }

    #[tokio::test]
    async fn malformed_anchor_string_is_skipped() {
        let cas = InMemoryCas::new();
        let tx = Transaction {
            transaction_number: 1,
            transaction_time: 1,
            transaction_time_hash: "hash-1".to_string(),
            anchor_string: "not-a-valid-anchor-string".to_string(),
            writer: "writer".to_string(),
            fee_paid: 0,
            normalized_fee: 0,
        };
        let downloads = DownloadManager::new(Arc::new(cas), 4);
        match process_transaction(&tx, &downloads, &params()).await {
            ProcessOutcome::SuccessProcessed(ops) => assert!(ops.is_empty()),
            ProcessOutcome::NeedsRetry => panic!("malformed anchor string should not retry"),
        }
    }

    #[tokio::test]
    async fn processes_a_deactivate_batch_with_no_chunk_file() {
        let cas = InMemoryCas::new();
        let signed_data = anchorid_core::operation::CompactJws {
            protected: "p".to_string(),
            payload: "p".to_string(),
            signature: "s".to_string(),
        };
        let core_proof = ProofFile {
            proofs: vec![signed_data],
        };
        let core_proof_uri = write_gzipped(&cas, &core_proof).await;
        let core_index = CoreIndexFile {
            writer_lock_id: None,
            provisional_index_file_uri: None,
            core_proof_file_uri: Some(core_proof_uri),
            operations: CoreOperationReferences {
                create: vec![],
                recover: vec![],
                deactivate: vec![RevealedOperationReference {
                    did_suffix: "suffix".to_string(),
                    reveal_value: hash_to_multihash(b"reveal"),
                }],
            },
        };
        let core_index_uri = write_gzipped(&cas, &core_index).await;
        let tx = tx_for(&core_index_uri, 1);
        let downloads = DownloadManager::new(Arc::new(cas), 4);
        match process_transaction(&tx, &downloads, &params()).await {
            ProcessOutcome::SuccessProcessed(ops) => {
                assert_eq!(ops.len(), 1);
                assert!(matches!(ops[0].operation, Operation::Deactivate { .. }));
            }
            ProcessOutcome::NeedsRetry => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn rejects_a_batch_with_duplicate_suffixes() {
        let cas = InMemoryCas::new();
        let core_index = CoreIndexFile {
            writer_lock_id: None,
            provisional_index_file_uri: None,
            core_proof_file_uri: None,
            operations: CoreOperationReferences {
                create: vec![],
                recover: vec![RevealedOperationReference {
                    did_suffix: "dup".to_string(),
                    reveal_value: "r".to_string(),
                }],
                deactivate: vec![RevealedOperationReference {
                    did_suffix: "dup".to_string(),
                    reveal_value: "r".to_string(),
                }],
            },
        };
        let core_index_uri = write_gzipped(&cas, &core_index).await;
        let tx = tx_for(&core_index_uri, 1);
        let downloads = DownloadManager::new(Arc::new(cas), 4);
        match process_transaction(&tx, &downloads, &params()).await {
            ProcessOutcome::SuccessProcessed(ops) => assert!(ops.is_empty()),
            ProcessOutcome::NeedsRetry => panic!("should not retry on a protocol violation"),
        }
    }
}
