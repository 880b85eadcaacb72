//! `LedgerClock`: a cached, never-blocking view of the anchor chain's
//! current time (spec.md §4.2). Every other component that needs "now" in
//! ledger-time terms — the protocol version manager, the batch writer's fee
//! checks — reads through this rather than calling the chain directly.

pub mod error;

pub use error::ClockError;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use anchorid_core::external::AnchorChainClient;
use anchorid_state::ServiceStateStore;

/// Default refresh cadence (spec.md §4.2).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

pub struct LedgerClock {
    chain: Arc<dyn AnchorChainClient>,
    state: ServiceStateStore,
    cached: AtomicU64,
}

impl LedgerClock {
    /// Load the cached time from persistence (so a restart doesn't briefly
    /// report ledger time 0) and wrap in an `Arc` for sharing with the
    /// background refresh task.
    pub fn new(
        chain: Arc<dyn AnchorChainClient>,
        state: ServiceStateStore,
    ) -> Result<Arc<Self>, ClockError> {
        let initial = state.approximate_time()?;
        Ok(Arc::new(Self {
            chain,
            state,
            cached: AtomicU64::new(initial),
        }))
    }

    /// The last-refreshed ledger time. Never blocks, never fails — a stale
    /// cache is always preferred to an unavailable clock.
    pub fn get_time(&self) -> u64 {
        self.cached.load(Ordering::Relaxed)
    }

    async fn refresh_once(&self) {
        match self.chain.latest_time().await {
            Ok((time, _hash)) => {
                self.cached.store(time, Ordering::Relaxed);
                if let Err(e) = self.state.set_approximate_time(time) {
                    warn!(error = %e, "ledger clock failed to persist refreshed time");
                }
            }
            Err(e) => {
                warn!(error = %e, "ledger clock refresh failed, keeping previous cached value");
            }
        }
    }

    /// Spawn the periodic refresh loop. Send `true` on `stop` to end it.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        mut stop: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.refresh_once().await;
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
