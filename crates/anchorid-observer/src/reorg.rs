//! Reorg recovery (spec.md §4.8): when the anchor chain reports the
//! Observer's cursor is no longer valid, walk backwards through the locally
//! stored transaction history with exponential backoff, asking the chain to
//! confirm the first one it still recognizes, then roll every store back to
//! that point.

use std::sync::Arc;

use anchorid_core::external::AnchorChainClient;
use anchorid_core::transaction::Transaction;
use anchorid_state::StateDb;
use tracing::{info, warn};

use crate::error::ObserverError;

/// Sample offsets (counted back from the tip of local history) to probe,
/// doubling each round so a deep reorg doesn't cost one round trip per
/// transaction. Matches the doubling pattern the teacher's own chain-sync
/// backoff uses.
fn sample_offsets(history_len: usize) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut step = 1usize;
    while step < history_len {
        offsets.push(step);
        step = step.saturating_mul(2);
    }
    offsets.push(history_len.saturating_sub(1).max(0));
    offsets
}

/// Find the most recent locally stored transaction the chain still
/// recognizes, then delete everything derived after it from `db`. Returns
/// the `transaction_number` the cursor should resume from (the confirmed
/// transaction's own number, so the next fetch asks for what comes after it),
/// or `None` if even the earliest stored transaction is gone (the cursor
/// should restart from genesis).
pub async fn recover(
    chain: &Arc<dyn AnchorChainClient>,
    db: &StateDb,
) -> Result<Option<u64>, ObserverError> {
    let history = db.transaction_store()?.all_ascending()?;
    if history.is_empty() {
        return Ok(None);
    }

    let offsets = sample_offsets(history.len());
    let mut candidates: Vec<Transaction> = Vec::with_capacity(offsets.len());
    for offset in offsets {
        let index = history.len() - 1 - offset.min(history.len() - 1);
        candidates.push(history[index].clone());
    }
    candidates.dedup_by_key(|t| t.transaction_number);

    let confirmed = chain.first_valid(&candidates).await?;

    match confirmed {
        Some(tx) => {
            info!(
                transaction_number = tx.transaction_number,
                "reorg recovery found a confirmed transaction, rolling back local state"
            );
            let cutoff = tx.transaction_number;
            let removed_ops = db.operation_store()?.delete_above(cutoff)?;
            let removed_txs = db.transaction_store()?.delete_above(cutoff)?;
            let removed_unresolvable = db.unresolvable_transaction_store()?.delete_above(cutoff)?;
            info!(
                removed_ops,
                removed_txs, removed_unresolvable, "reorg rollback complete"
            );
            Ok(Some(cutoff))
        }
        None => {
            warn!("no locally stored transaction was confirmed by the chain, rolling back to genesis");
            db.operation_store()?.delete_above(0)?;
            db.transaction_store()?.delete_above(0)?;
            db.unresolvable_transaction_store()?.delete_above(0)?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorid_core::external::InMemoryAnchorChain;
    use anchorid_core::transaction::build_anchor_string;

    fn tx(number: u64) -> Transaction {
        Transaction {
            transaction_number: number,
            transaction_time: number,
            transaction_time_hash: format!("hash-{number}"),
            anchor_string: build_anchor_string("cas://x", 1),
            writer: "writer".to_string(),
            fee_paid: 0,
            normalized_fee: 0,
        }
    }

    #[tokio::test]
    async fn rolls_back_to_the_last_transaction_the_chain_still_recognizes() {
        let db = StateDb::open_temporary().unwrap();
        for n in 0..10 {
            db.transaction_store().unwrap().append(&tx(n)).unwrap();
        }
        let chain = InMemoryAnchorChain::new();
        // Simulate the chain having reorged away everything after number 4.
        for n in 0..=4 {
            chain.push_transaction(n, build_anchor_string("cas://x", 1), "writer".to_string());
        }
        let chain: Arc<dyn AnchorChainClient> = Arc::new(chain);

        let cursor = recover(&chain, &db).await.unwrap();
        assert_eq!(cursor, Some(4));
        assert_eq!(db.transaction_store().unwrap().all_ascending().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn restarts_from_genesis_when_nothing_is_confirmed() {
        let db = StateDb::open_temporary().unwrap();
        for n in 0..5 {
            db.transaction_store().unwrap().append(&tx(n)).unwrap();
        }
        let chain: Arc<dyn AnchorChainClient> = Arc::new(InMemoryAnchorChain::new());

        let cursor = recover(&chain, &db).await.unwrap();
        assert_eq!(cursor, None);
        assert!(db.transaction_store().unwrap().all_ascending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_history_is_a_no_op() {
        let db = StateDb::open_temporary().unwrap();
        let chain: Arc<dyn AnchorChainClient> = Arc::new(InMemoryAnchorChain::new());
        assert_eq!(recover(&chain, &db).await.unwrap(), None);
    }
}
