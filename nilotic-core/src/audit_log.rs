//! Audit logging for the Nilotic node core.
//!
//! Fast-confirmed transfers are not Merkle-anchored, so the events
//! emitted here are their only durable trail besides the balance
//! snapshots.

use crate::error::CoreError;
use nilotic_shared_types::{Block, Transaction};
use tracing::{event, Level};

/// Logs when the node starts up.
pub fn log_node_startup(port: u16) {
    event!(Level::INFO, "Node started, listening on port {}", port);
}

/// Logs when the node shuts down gracefully.
pub fn log_node_shutdown() {
    event!(Level::INFO, "Node is shutting down");
}

/// Logs when a block is appended to the chain.
pub fn log_block_added(block: &Block) {
    event!(
        Level::INFO,
        "Block added: height={}, hash={}, txs={}",
        block.index,
        block.hash,
        block.transactions.len()
    );
}

/// Logs when a block fails validation.
pub fn log_block_rejected(block: &Block, error: &CoreError) {
    event!(
        Level::WARN,
        "Block rejected at height={}, hash={}: {}",
        block.index,
        block.hash,
        error
    );
}

/// Logs when a transaction enters the pending pool.
pub fn log_transaction_admitted(tx: &Transaction) {
    event!(Level::INFO, "Transaction admitted to mempool: hash={}", tx.hash);
}

/// Logs when a transaction is rejected at admission.
pub fn log_transaction_rejected(tx: &Transaction, error: &CoreError) {
    event!(Level::WARN, "Transaction rejected: hash={}: {}", tx.hash, error);
}

/// Logs an instant confirmation. This record plus the balance snapshot
/// is the transfer's durable trail.
pub fn log_fast_confirmed(tx: &Transaction) {
    event!(
        Level::INFO,
        "Fast-confirmed transfer: hash={}, {} -> {} amount={}",
        tx.hash,
        tx.sender,
        tx.recipient,
        tx.amount
    );
}

/// Logs a balance-to-stake move.
pub fn log_stake_recorded(address: &str, amount: f64) {
    event!(Level::INFO, "Stake recorded: address={}, amount={}", address, amount);
}

/// Logs a successful ledger snapshot.
pub fn log_snapshot_saved(path: &str) {
    event!(Level::INFO, "Ledger snapshot saved to {}", path);
}

/// Logs a failed ledger snapshot. The run loop continues.
pub fn log_snapshot_failed(path: &str, error: &CoreError) {
    event!(Level::ERROR, "Ledger snapshot to {} failed: {}", path, error);
}

/// Logs an integrity failure discovered by chain validation.
pub fn log_chain_integrity_failure(detail: &str) {
    event!(Level::ERROR, "CRITICAL: chain integrity failure: {}", detail);
}

/// Logs the single recovery action: dropping the last block.
pub fn log_chain_recovery(dropped_height: u64) {
    event!(Level::WARN, "Chain recovery: dropped block at height {}", dropped_height);
}

/// Logs a difficulty retarget.
pub fn log_difficulty_adjusted(old: u64, new: u64) {
    event!(Level::INFO, "Difficulty adjusted: {} -> {}", old, new);
}
