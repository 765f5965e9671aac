//! Core engines of the Nilotic blockchain node.
//!
//! This crate ties the append-only ledger, the fee-priority mempool,
//! the proof-of-work/proof-of-stake producer and the instant-
//! confirmation fast path into one consistent, thread-safe node core.
//!
//! # Modules
//!
//! - `ledger`: chain store, balance application, validation and the
//!   ledger event fan-out.
//! - `mempool`: pending pool with duplicate suppression and the
//!   fee-priority selection contract.
//! - `producer`: block assembly, the PoW nonce search, the PoS
//!   validation path and difficulty retargeting.
//! - `fastpath`: instant confirmation for small transfers.
//! - `snapshot`: JSON snapshot I/O for the ledger state.
//! - `odero`: offline-token (Odero SLW) support.
//! - `vm`: the stack-machine interpreter for deployed contract
//!   payloads.

pub mod audit_log;
pub mod constants;
pub mod error;
pub mod fastpath;
pub mod ledger;
pub mod mempool;
pub mod odero;
pub mod producer;
pub mod snapshot;
pub mod vm;

pub use error::CoreError;
pub use ledger::{Ledger, LedgerEvent, TransactionStatus};
pub use mempool::Mempool;
pub use producer::{MiningConfig, MiningStats, Producer};
