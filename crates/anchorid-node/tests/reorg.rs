//! Integration test for the Observer's reorg recovery path (spec.md §4.7),
//! driven against transactions published directly onto the in-memory chain
//! (skipping the batch writer, since only the transaction history matters
//! here, not the file contents). Replaces what would, against a real
//! networked ledger, require a second node process — there is no P2P layer
//! in this design, so there's nothing a second process would add.

use std::sync::Arc;

use anchorid_core::external::{AnchorChainClient, CasClient, InMemoryAnchorChain, InMemoryCas};
use anchorid_observer::{DownloadManager, Observer};
use anchorid_protocol::ProtocolVersionManager;
use anchorid_state::StateDb;

#[tokio::test]
async fn reorg_truncation_is_recovered_and_the_cursor_resumes() {
    let concrete_chain = Arc::new(InMemoryAnchorChain::new());
    concrete_chain.push_transaction(1, "missing-anchor.1".to_string(), "writer-a".to_string());
    concrete_chain.push_transaction(2, "also-missing.1".to_string(), "writer-a".to_string());

    let chain: Arc<dyn AnchorChainClient> = concrete_chain.clone();
    let cas: Arc<dyn CasClient> = Arc::new(InMemoryCas::new());
    let protocol = Arc::new(ProtocolVersionManager::default_table());
    let db = StateDb::open_temporary().unwrap();
    let downloads = DownloadManager::new(cas, 4);
    let observer = Observer::new(chain.clone(), db.clone(), downloads, protocol);

    // Both anchor strings point at CAS content that was never written, so
    // each is skipped rather than retried — a missing core index file isn't
    // a transient failure, per the resolved retry-vs-skip Open Question —
    // but the cursor still advances past both.
    let committed = observer.tick(10, 0).await.unwrap();
    assert_eq!(committed, 2);
    assert_eq!(
        db.transaction_store()
            .unwrap()
            .last()
            .unwrap()
            .unwrap()
            .transaction_number,
        2
    );

    // Simulate a reorg: the chain drops everything after transaction 0,
    // which this node never even knew about.
    concrete_chain.truncate_after(0);

    // The stored cursor (transaction 2) is no longer recognized by the
    // chain, so the next tick's `transactions_since` call fails with
    // `InvalidCursor`, triggering reorg recovery before continuing.
    let committed_after_reorg = observer.tick(10, 0).await.unwrap();
    assert_eq!(committed_after_reorg, 0);
    assert!(db.transaction_store().unwrap().last().unwrap().is_none());
}
