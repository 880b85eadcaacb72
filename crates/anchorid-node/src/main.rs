//! anchorid-node — the DID Layer-2 anchoring node binary.
//!
//! Startup sequence (spec.md §4.10):
//!   1. Open (or initialise) the state database
//!   2. Run the one-time database upgrade gate
//!   3. Construct the protocol version manager
//!   4. Start the ledger clock, download manager, observer, batch writer
//!   5. Start the JSON-RPC server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;
use tracing::info;

use anchorid_batchwriter::BatchWriter;
use anchorid_clock::LedgerClock;
use anchorid_core::external::{AnchorChainClient, CasClient, InMemoryAnchorChain, InMemoryCas};
use anchorid_observer::{DownloadManager, Observer};
use anchorid_protocol::ProtocolVersionManager;
use anchorid_rpc::{RequestHandler, RpcServer, RpcServerState};
use anchorid_state::StateDb;

/// Bumped whenever a stored schema becomes incompatible with the running
/// code; `main` clears the operational trees when the persisted version is
/// older than this (spec.md §4.10, §6.4).
const CURRENT_DB_VERSION: u32 = 1;

#[derive(Parser, Debug)]
#[command(
    name = "anchorid-node",
    version,
    about = "DID Layer-2 anchoring node"
)]
struct Args {
    /// Directory for the persistent state database. Omit for an ephemeral,
    /// in-memory database (development/testing only).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// JSON-RPC listen address.
    #[arg(long, default_value = "127.0.0.1:8765")]
    rpc_addr: SocketAddr,

    /// Path to a `--protocol-versions` JSON table. Falls back to the
    /// baked-in default table if omitted.
    #[arg(long)]
    protocol_versions: Option<PathBuf>,

    /// This node's writer identity, used when publishing batches.
    #[arg(long, default_value = "anchorid-node")]
    writer_id: String,

    /// Ingestion tick cadence in seconds. 0 disables the observer.
    #[arg(long, default_value_t = 5)]
    observing_interval_secs: u64,

    /// Batch publish cadence in seconds. 0 disables the batch writer.
    #[arg(long, default_value_t = 1)]
    batching_interval_secs: u64,

    /// Maximum concurrent CAS downloads.
    #[arg(long, default_value_t = 16)]
    max_concurrent_downloads: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,anchorid=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("anchorid node starting");

    // ── State database ────────────────────────────────────────────────────
    let db = match &args.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating data dir {}", dir.display()))?;
            StateDb::open(dir).context("opening state database")?
        }
        None => {
            info!("no --data-dir given, using an ephemeral in-memory database");
            StateDb::open_temporary().context("opening temporary state database")?
        }
    };

    // ── One-time database upgrade gate (spec.md §4.10, §6.4) ─────────────────
    let service_state = db.service_state_store().context("opening service state store")?;
    let stored_version = service_state.database_version().context("reading database version")?;
    if stored_version > CURRENT_DB_VERSION {
        return Err(anchorid_state::StateError::DatabaseDowngradeNotAllowed {
            found: stored_version,
            supported: CURRENT_DB_VERSION,
        })
        .context("database schema is newer than this binary supports");
    } else if stored_version < CURRENT_DB_VERSION {
        info!(
            stored_version,
            current_version = CURRENT_DB_VERSION,
            "database schema out of date, clearing operational trees"
        );
        db.clear_operational_trees().context("clearing operational trees")?;
        service_state
            .set_database_version(CURRENT_DB_VERSION)
            .context("persisting upgraded database version")?;
    }
    info!("state database ready");

    // ── Protocol version manager ─────────────────────────────────────────────
    let protocol = Arc::new(match &args.protocol_versions {
        Some(path) => ProtocolVersionManager::from_file(path).context("loading protocol versions")?,
        None => ProtocolVersionManager::default_table(),
    });
    info!(versions = protocol.versions().len(), "protocol version table loaded");

    // ── External collaborators ───────────────────────────────────────────────
    // No production Bitcoin/IPFS adapter is in scope here; the in-memory
    // test doubles stand in as the pluggable `AnchorChainClient`/`CasClient`
    // implementation until a real one is written against the same traits.
    let chain: Arc<dyn AnchorChainClient> = Arc::new(InMemoryAnchorChain::new());
    let cas: Arc<dyn CasClient> = Arc::new(InMemoryCas::new());

    // ── Ledger clock ──────────────────────────────────────────────────────────
    let clock = LedgerClock::new(chain.clone(), db.service_state_store()?)
        .context("constructing ledger clock")?;
    let (clock_stop_tx, clock_stop_rx) = tokio::sync::watch::channel(false);
    let _clock_handle = clock.clone().spawn(anchorid_clock::DEFAULT_REFRESH_INTERVAL, clock_stop_rx);
    info!("ledger clock started");

    // ── Download manager ──────────────────────────────────────────────────────
    let downloads = DownloadManager::new(cas.clone(), args.max_concurrent_downloads);
    info!(
        max_concurrent_downloads = args.max_concurrent_downloads,
        "download manager ready"
    );

    // ── Observer ──────────────────────────────────────────────────────────────
    let (observer_stop_tx, observer_stop_rx) = tokio::sync::watch::channel(false);
    let _observer_handle = if args.observing_interval_secs > 0 {
        let observer = Observer::new(chain.clone(), db.clone(), downloads.clone(), protocol.clone());
        let clock_for_observer = clock.clone();
        let handle = observer.spawn(
            std::time::Duration::from_secs(args.observing_interval_secs),
            move || clock_for_observer.get_time(),
            now_ms,
            observer_stop_rx,
        );
        info!(
            interval_secs = args.observing_interval_secs,
            "observer started"
        );
        Some(handle)
    } else {
        info!("observer disabled (--observing-interval-secs=0)");
        None
    };

    // ── Batch writer ──────────────────────────────────────────────────────────
    let batch_writer = BatchWriter::new(args.writer_id.clone(), chain.clone(), cas.clone(), protocol.clone());
    let (writer_stop_tx, writer_stop_rx) = tokio::sync::watch::channel(false);
    let _writer_handle = if args.batching_interval_secs > 0 {
        let clock_for_writer = clock.clone();
        let handle = batch_writer.clone().spawn(
            std::time::Duration::from_secs(args.batching_interval_secs),
            move || clock_for_writer.get_time(),
            writer_stop_rx,
        );
        info!(
            interval_secs = args.batching_interval_secs,
            "batch writer started"
        );
        Some(handle)
    } else {
        info!("batch writer disabled (--batching-interval-secs=0)");
        None
    };

    // ── RPC server ────────────────────────────────────────────────────────────
    let handler = Arc::new(RequestHandler::new(db, clock, protocol, batch_writer));
    let rpc_state = Arc::new(RpcServerState { handler });
    let rpc_handle = RpcServer::new(rpc_state)
        .start(args.rpc_addr)
        .await
        .context("starting RPC server")?;
    info!(addr = %args.rpc_addr, "rpc server started");

    info!("node ready");
    rpc_handle.stopped().await;

    let _ = clock_stop_tx.send(true);
    let _ = observer_stop_tx.send(true);
    let _ = writer_stop_tx.send(true);

    Ok(())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
