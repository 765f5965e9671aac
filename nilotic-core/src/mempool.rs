//! The transaction memory pool.
//!
//! Stores accepted but not-yet-included transactions in admission
//! (FIFO) order. Admission checks live on the [`crate::Ledger`] because
//! the balance check needs the chain lock; the pool itself only
//! enforces duplicate suppression and provides the fee-priority
//! selection contract used by the producer.

use crate::constants::{BASE_FEE, FEE_RATE};
use log::debug;
use nilotic_shared_types::Transaction;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct Mempool {
    pool: Vec<Transaction>,
    hashes: HashSet<String>,
}

impl Mempool {
    pub fn new() -> Self {
        Mempool::default()
    }

    /// Appends a transaction; returns false when its content hash is
    /// already present.
    pub fn insert(&mut self, tx: Transaction) -> bool {
        if self.hashes.contains(&tx.hash) {
            debug!("mempool: duplicate transaction {}", tx.hash);
            return false;
        }
        self.hashes.insert(tx.hash.clone());
        self.pool.push(tx);
        true
    }

    /// Removes a transaction by content hash.
    pub fn remove_by_hash(&mut self, hash: &str) -> Option<Transaction> {
        let pos = self.pool.iter().position(|tx| tx.hash == hash)?;
        self.hashes.remove(hash);
        Some(self.pool.remove(pos))
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Zero-based position of a pending transaction in admission order.
    pub fn position(&self, hash: &str) -> Option<usize> {
        self.pool.iter().position(|tx| tx.hash == hash)
    }

    /// A copy of the pool in admission order.
    pub fn pending(&self) -> Vec<Transaction> {
        self.pool.clone()
    }

    pub fn clear(&mut self) {
        self.pool.clear();
        self.hashes.clear();
    }

    /// Selection contract: candidates sorted by (effective fee desc,
    /// timestamp asc), truncated to `max_txs` entries and `max_bytes`
    /// of serialized payload.
    pub fn select_for_block(&self, max_txs: usize, max_bytes: u64) -> Vec<Transaction> {
        let mut candidates: Vec<&Transaction> = self.pool.iter().collect();
        candidates.sort_by(|a, b| {
            let fee_a = a.effective_fee(BASE_FEE, FEE_RATE);
            let fee_b = b.effective_fee(BASE_FEE, FEE_RATE);
            fee_b
                .partial_cmp(&fee_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.timestamp.cmp(&b.timestamp))
        });

        let mut selected = Vec::new();
        let mut total_bytes: u64 = 0;
        for tx in candidates {
            if selected.len() >= max_txs {
                break;
            }
            let tx_bytes = bincode::serialized_size(tx).unwrap_or(0);
            if total_bytes + tx_bytes > max_bytes {
                break;
            }
            total_bytes += tx_bytes;
            selected.push(tx.clone());
        }
        selected
    }
}
