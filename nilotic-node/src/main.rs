//! Nilotic blockchain node daemon.
//!
//! Startup order: ledger (snapshot or genesis) → producer → PoRC →
//! HTTP adapter. SIGINT/SIGTERM trigger a clean shutdown in the
//! reverse order, ending with a final snapshot.

mod api;
mod node;

use clap::Parser;
use nilotic_core::audit_log;
use nilotic_core::{Ledger, MiningConfig, Producer};
use nilotic_crypto::Ed25519Verifier;
use nilotic_porc::{PorcEngine, PorcStore};
use node::Node;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Nilotic Blockchain Node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on for API requests
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Enable verbose debug logging
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Path of the ledger snapshot file
    #[arg(long, default_value = "blockchain_data.json")]
    data_file: PathBuf,

    /// Path of the PoRC database
    #[arg(long, default_value = "porc.db")]
    porc_db: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    info!("******************************************************");
    info!("*          Nilotic Blockchain Node v{}           *", node::NODE_VERSION);
    info!("******************************************************");

    // Ledger: restore the snapshot when one exists, otherwise genesis.
    let ledger = Arc::new(Ledger::new());
    if args.data_file.exists() {
        match ledger.restore_from(&args.data_file) {
            Ok(()) => info!("Loaded existing ledger snapshot from {:?}", args.data_file),
            Err(err) => warn!("Failed to load snapshot ({}), starting with a new chain", err),
        }
    } else {
        info!("No existing ledger snapshot found, starting with a new chain");
    }

    let verifier = Arc::new(Ed25519Verifier);
    let producer = Arc::new(Producer::new(
        Arc::clone(&ledger),
        MiningConfig::default(),
        verifier.clone(),
    ));

    // PoRC: a broken database is fatal at startup only.
    let store = PorcStore::open(&args.porc_db)
        .map_err(|err| format!("cannot initialise PoRC database: {err}"))?;
    let porc = Arc::new(PorcEngine::new(Arc::clone(&ledger), verifier, store));
    porc.hydrate()
        .map_err(|err| format!("cannot hydrate PoRC state: {err}"))?;
    Arc::clone(&porc).start();

    let node = Arc::new(Node::new(
        Arc::clone(&ledger),
        Arc::clone(&producer),
        Arc::clone(&porc),
    ));
    let bridge = node.start_event_bridge();
    let maintenance = node.start_maintenance(args.data_file.clone());

    let app = api::router(Arc::clone(&node));
    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    audit_log::log_node_startup(args.port);
    info!("Server is ready to accept connections on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Ordered shutdown: HTTP is already down; stop PoRC, stop the
    // producer, snapshot, join the helper threads.
    info!("Shutting down Nilotic blockchain node...");
    node.request_shutdown();
    porc.stop();
    producer.request_stop();
    if let Err(err) = ledger.snapshot_to(&args.data_file) {
        error!("Failed to save final ledger snapshot: {}", err);
    } else {
        info!("Final ledger snapshot saved");
    }
    let _ = bridge.join();
    let _ = maintenance.join();
    audit_log::log_node_shutdown();
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}
