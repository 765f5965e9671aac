//! Instant confirmation for small transfers.
//!
//! A qualifying transfer is applied to the balances directly under the
//! chain lock and never enters a block; the audit log event plus the
//! surrounding balance snapshots are its durable record. Consequently
//! fast-confirmed transfers are invisible to chain-only replay and are
//! covered only by ledger-state replay.

use crate::audit_log;
use crate::constants::INSTANT_LIMIT;
use crate::error::CoreError;
use crate::ledger::{Ledger, LedgerEvent};
use nilotic_shared_types::Transaction;

/// Instant-confirmation policy: small, online, non-coinbase transfers.
/// The balance condition is checked again at application time under the
/// chain lock.
pub fn qualifies(tx: &Transaction) -> bool {
    tx.amount <= INSTANT_LIMIT && !tx.is_coinbase() && !tx.is_offline
}

impl Ledger {
    /// Applies a qualifying transfer atomically under the chain lock
    /// and emits a `FastConfirmed` event. The transaction is never
    /// written into a block.
    pub fn fast_confirm(&self, tx: &Transaction) -> Result<(), CoreError> {
        if !qualifies(tx) {
            return Err(CoreError::InvalidTransaction(format!(
                "transaction {} does not qualify for instant confirmation",
                tx.hash
            )));
        }

        {
            let mut state = self.chain.lock().unwrap();
            let crate::ledger::ChainState {
                balances, contracts, ..
            } = &mut *state;
            crate::ledger::apply_transaction(balances, contracts, tx)?;
        }

        audit_log::log_fast_confirmed(tx);
        self.emit(LedgerEvent::FastConfirmed {
            tx_hash: tx.hash.clone(),
        });
        Ok(())
    }
}
