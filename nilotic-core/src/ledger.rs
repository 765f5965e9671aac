//! The append-only ledger: chain store, balances, stakes, contracts.
//!
//! The ledger owns two locks, one for the chain-plus-balances and one
//! for the mempool, always acquired in the fixed order {chain,
//! mempool}. Read accessors copy state out under a brief lock; no
//! references to guarded state escape. Subsystems hold the ledger
//! through an `Arc` capability handle and observe it through the event
//! fan-out.

use crate::audit_log;
use crate::constants::{
    ACTIVITY_WINDOW_SECS, BASE_FEE, DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD, FEE_RATE,
    GENESIS_ALLOCATION,
};
use crate::error::CoreError;
use crate::mempool::Mempool;
use log::info;
use nilotic_shared_types::{unix_now, Address, Block, Transaction, COINBASE, GENESIS};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

/// Events emitted by the ledger to interested subsystems (PoRC, the
/// gossip layer).
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    /// A block was appended to the chain.
    BlockMined {
        height: u64,
        block_hash: String,
        collected_fees: f64,
    },
    /// A small transfer was applied through the fast path.
    FastConfirmed { tx_hash: String },
}

/// Where a transaction currently lives, as reported on the status
/// endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending {
        position_in_queue: usize,
        estimated_confirmation_secs: f64,
        fee: f64,
        priority: String,
    },
    Confirmed {
        block_index: u64,
        block_hash: String,
        confirmation_time: u64,
    },
    NotFound,
}

/// State guarded by the chain lock.
pub(crate) struct ChainState {
    pub(crate) chain: Vec<Block>,
    pub(crate) balances: HashMap<Address, f64>,
    pub(crate) stakes: HashMap<Address, f64>,
    pub(crate) contracts: HashMap<Address, String>,
    pub(crate) difficulty: u64,
    pub(crate) mining_reward: f64,
}

pub struct Ledger {
    pub(crate) chain: Mutex<ChainState>,
    pub(crate) mempool: Mutex<Mempool>,
    subscribers: Mutex<Vec<Sender<LedgerEvent>>>,
}

impl Ledger {
    /// Creates a ledger seeded with the genesis block. Used when no
    /// snapshot exists; a snapshot restore replaces this state
    /// wholesale.
    pub fn new() -> Self {
        Ledger::with_parameters(DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD)
    }

    pub fn with_parameters(difficulty: u64, mining_reward: f64) -> Self {
        info!("Creating genesis block");
        let mut genesis = Block::new(0, "0");
        genesis.add_transaction(Transaction::new(COINBASE, GENESIS, GENESIS_ALLOCATION));
        genesis.seal();

        let mut balances = HashMap::new();
        balances.insert(GENESIS.to_string(), GENESIS_ALLOCATION);

        info!("Genesis block created with hash: {}", genesis.hash);
        Ledger {
            chain: Mutex::new(ChainState {
                chain: vec![genesis],
                balances,
                stakes: HashMap::new(),
                contracts: HashMap::new(),
                difficulty,
                mining_reward,
            }),
            mempool: Mutex::new(Mempool::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers an event subscriber. Dead receivers are dropped on the
    /// next emit.
    pub fn subscribe(&self) -> Receiver<LedgerEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.lock().unwrap().push(sender);
        receiver
    }

    pub(crate) fn emit(&self, event: LedgerEvent) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|sub| sub.send(event.clone()).is_ok());
    }

    /// Appends a block to the chain.
    ///
    /// Rejects when the block extends the wrong tip, skips an index,
    /// carries an inconsistent hash, or (for PoW blocks) fails the
    /// current difficulty. Transactions apply in stored order against a
    /// scratch copy of the balances, so a mid-block overdraft rejects
    /// the whole block without state change.
    pub fn append_block(&self, block: Block) -> Result<(), CoreError> {
        let (height, block_hash, fees) = {
            let mut state = self.chain.lock().unwrap();
            let last = state.chain.last().expect("chain is never empty");

            if block.previous_hash != last.hash {
                let err = CoreError::WrongTip {
                    expected: last.hash.clone(),
                    actual: block.previous_hash.clone(),
                };
                audit_log::log_block_rejected(&block, &err);
                return Err(err);
            }
            if block.index != last.index + 1 {
                let err = CoreError::WrongIndex {
                    expected: last.index + 1,
                    actual: block.index,
                };
                audit_log::log_block_rejected(&block, &err);
                return Err(err);
            }
            if block.hash != block.compute_hash() {
                let err = CoreError::InvalidBlock("stored hash does not match contents".into());
                audit_log::log_block_rejected(&block, &err);
                return Err(err);
            }
            // Validator-sealed blocks skip the work requirement.
            if !block.is_validator_sealed() && !block.meets_difficulty(state.difficulty) {
                let err = CoreError::InvalidProofOfWork(state.difficulty);
                audit_log::log_block_rejected(&block, &err);
                return Err(err);
            }

            let coinbase_count = block
                .transactions
                .iter()
                .filter(|tx| tx.is_coinbase())
                .count();
            if coinbase_count > 1 {
                let err = CoreError::InvalidBlock("more than one coinbase transaction".into());
                audit_log::log_block_rejected(&block, &err);
                return Err(err);
            }
            if coinbase_count == 1 && !block.transactions[0].is_coinbase() {
                let err = CoreError::InvalidBlock("coinbase is not the first transaction".into());
                audit_log::log_block_rejected(&block, &err);
                return Err(err);
            }

            let mut balances = state.balances.clone();
            let mut contracts = state.contracts.clone();
            for tx in &block.transactions {
                if let Err(err) = apply_transaction(&mut balances, &mut contracts, tx) {
                    audit_log::log_block_rejected(&block, &err);
                    return Err(err);
                }
            }

            state.balances = balances;
            state.contracts = contracts;
            let fees = block.collected_fees(BASE_FEE, FEE_RATE);
            let height = block.index;
            let block_hash = block.hash.clone();
            audit_log::log_block_added(&block);
            state.chain.push(block);
            (height, block_hash, fees)
        };

        self.emit(LedgerEvent::BlockMined {
            height,
            block_hash,
            collected_fees: fees,
        });
        Ok(())
    }

    /// Admits a transaction to the pending pool. Lock order is
    /// {chain, mempool}: the balance check reads under the chain lock.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<(), CoreError> {
        let state = self.chain.lock().unwrap();
        let mut mempool = self.mempool.lock().unwrap();

        if !tx.is_valid() {
            let err = CoreError::InvalidTransaction(tx.hash.clone());
            audit_log::log_transaction_rejected(&tx, &err);
            return Err(err);
        }
        if mempool.contains(&tx.hash) {
            let err = CoreError::DuplicateTransaction(tx.hash.clone());
            audit_log::log_transaction_rejected(&tx, &err);
            return Err(err);
        }
        if !tx.is_coinbase() {
            let available = state.balances.get(&tx.sender).copied().unwrap_or(0.0);
            if available < tx.amount {
                let err = CoreError::InsufficientBalance {
                    address: tx.sender.clone(),
                    required: tx.amount,
                    available,
                };
                audit_log::log_transaction_rejected(&tx, &err);
                return Err(err);
            }
        }

        audit_log::log_transaction_admitted(&tx);
        mempool.insert(tx);
        Ok(())
    }

    pub fn get_balance(&self, address: &str) -> f64 {
        self.chain
            .lock()
            .unwrap()
            .balances
            .get(address)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn stake_of(&self, address: &str) -> f64 {
        self.chain
            .lock()
            .unwrap()
            .stakes
            .get(address)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn chain_height(&self) -> u64 {
        self.chain.lock().unwrap().chain.len() as u64
    }

    pub fn latest_block(&self) -> Block {
        self.chain.lock().unwrap().chain.last().cloned().unwrap()
    }

    /// The last `limit` blocks, genesis-first order preserved.
    pub fn last_blocks(&self, limit: usize) -> Vec<Block> {
        let state = self.chain.lock().unwrap();
        let start = state.chain.len().saturating_sub(limit);
        state.chain[start..].to_vec()
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.chain.lock().unwrap().chain.clone()
    }

    pub fn balances(&self) -> HashMap<Address, f64> {
        self.chain.lock().unwrap().balances.clone()
    }

    pub fn stakes(&self) -> HashMap<Address, f64> {
        self.chain.lock().unwrap().stakes.clone()
    }

    pub fn contract_code(&self, address: &str) -> Option<String> {
        self.chain.lock().unwrap().contracts.get(address).cloned()
    }

    pub fn difficulty(&self) -> u64 {
        self.chain.lock().unwrap().difficulty
    }

    pub fn set_difficulty(&self, difficulty: u64) {
        self.chain.lock().unwrap().difficulty = difficulty;
    }

    pub fn mining_reward(&self) -> f64 {
        self.chain.lock().unwrap().mining_reward
    }

    /// Moves value from an account's balance into its stake, granting
    /// PoS validator eligibility.
    pub fn stake(&self, address: &str, amount: f64) -> Result<(), CoreError> {
        if amount <= 0.0 {
            return Err(CoreError::InvalidInput("stake amount must be positive".into()));
        }
        let mut state = self.chain.lock().unwrap();
        let available = state.balances.get(address).copied().unwrap_or(0.0);
        if available < amount {
            return Err(CoreError::InsufficientBalance {
                address: address.to_string(),
                required: amount,
                available,
            });
        }
        *state.balances.entry(address.to_string()).or_insert(0.0) -= amount;
        *state.stakes.entry(address.to_string()).or_insert(0.0) += amount;
        audit_log::log_stake_recorded(address, amount);
        Ok(())
    }

    /// Transaction count involving `address` over the trailing 30 days
    /// of chain history. PoRC eligibility input.
    pub fn activity_of(&self, address: &str) -> u64 {
        let cutoff = unix_now().saturating_sub(ACTIVITY_WINDOW_SECS);
        let state = self.chain.lock().unwrap();
        state
            .chain
            .iter()
            .flat_map(|block| block.transactions.iter())
            .filter(|tx| tx.timestamp >= cutoff)
            .filter(|tx| tx.sender == address || tx.recipient == address)
            .count() as u64
    }

    /// Full-chain validation: every stored hash must match the
    /// recomputed hash and every link must hold.
    pub fn is_chain_valid(&self) -> bool {
        let state = self.chain.lock().unwrap();
        Self::first_broken_link(&state.chain).is_none()
    }

    fn first_broken_link(chain: &[Block]) -> Option<usize> {
        for i in 1..chain.len() {
            if chain[i].hash != chain[i].compute_hash() {
                audit_log::log_chain_integrity_failure(&format!(
                    "block {} hash does not match contents",
                    chain[i].index
                ));
                return Some(i);
            }
            if chain[i].previous_hash != chain[i - 1].hash {
                audit_log::log_chain_integrity_failure(&format!(
                    "block {} does not link to block {}",
                    chain[i].index,
                    chain[i - 1].index
                ));
                return Some(i);
            }
        }
        None
    }

    /// Validates the chain and, on failure, applies the single recovery
    /// action: drop the last block and re-check. Returns true when the
    /// chain is valid (possibly after recovery).
    pub fn validate_and_recover(&self) -> bool {
        let mut state = self.chain.lock().unwrap();
        while Self::first_broken_link(&state.chain).is_some() {
            if state.chain.len() <= 1 {
                return false;
            }
            let dropped = state.chain.pop().unwrap();
            audit_log::log_chain_recovery(dropped.index);
        }
        true
    }

    /// Reports whether a transaction is pending, confirmed in a block,
    /// or unknown. Fast-confirmed transfers report as not found here;
    /// their trail is the audit log.
    pub fn transaction_status(&self, hash: &str) -> TransactionStatus {
        let state = self.chain.lock().unwrap();
        let mempool = self.mempool.lock().unwrap();

        if let Some(position) = mempool.position(hash) {
            let fee = mempool
                .pending()
                .into_iter()
                .find(|tx| tx.hash == hash)
                .map(|tx| tx.effective_fee(BASE_FEE, FEE_RATE))
                .unwrap_or(0.0);
            // 2.4 s nominal block time, 50 transactions per block.
            let estimated = (position as f64 / 50.0) * 2.4;
            let priority = if fee > 0.01 {
                "high"
            } else if fee > 0.005 {
                "medium"
            } else {
                "normal"
            };
            return TransactionStatus::Pending {
                position_in_queue: position,
                estimated_confirmation_secs: estimated,
                fee,
                priority: priority.to_string(),
            };
        }

        for block in &state.chain {
            if block.transactions.iter().any(|tx| tx.hash == hash) {
                return TransactionStatus::Confirmed {
                    block_index: block.index,
                    block_hash: block.hash.clone(),
                    confirmation_time: block.timestamp,
                };
            }
        }
        TransactionStatus::NotFound
    }

    // Mempool passthroughs used by the producer and the HTTP surface.

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.mempool.lock().unwrap().pending()
    }

    pub fn pending_count(&self) -> usize {
        self.mempool.lock().unwrap().len()
    }

    pub fn select_candidates(&self, max_txs: usize, max_bytes: u64) -> Vec<Transaction> {
        self.mempool.lock().unwrap().select_for_block(max_txs, max_bytes)
    }

    pub fn remove_from_mempool(&self, hash: &str) -> Option<Transaction> {
        self.mempool.lock().unwrap().remove_by_hash(hash)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Ledger::new()
    }
}

/// The pure transaction application rule shared by block commit and the
/// fast path.
///
/// Coinbase credits the recipient unconditionally; a contract
/// deployment synthesises `CONTRACT-` + the first 10 hex characters of
/// the content hash and stores the payload; everything else debits the
/// sender (rejecting overdrafts) and credits the recipient.
pub(crate) fn apply_transaction(
    balances: &mut HashMap<Address, f64>,
    contracts: &mut HashMap<Address, String>,
    tx: &Transaction,
) -> Result<(), CoreError> {
    if !tx.is_valid() {
        return Err(CoreError::InvalidTransaction(tx.hash.clone()));
    }

    if tx.is_coinbase() {
        *balances.entry(tx.recipient.clone()).or_insert(0.0) += tx.amount;
        return Ok(());
    }

    if tx.is_contract_deploy() {
        let contract_address = format!("CONTRACT-{}", &tx.content_hash()[..10]);
        contracts.insert(contract_address.clone(), tx.contract_code.clone().unwrap());
        info!("Smart contract deployed: {}", contract_address);
        return Ok(());
    }

    let available = balances.get(&tx.sender).copied().unwrap_or(0.0);
    if available < tx.amount {
        return Err(CoreError::InsufficientBalance {
            address: tx.sender.clone(),
            required: tx.amount,
            available,
        });
    }
    *balances.entry(tx.sender.clone()).or_insert(0.0) -= tx.amount;
    *balances.entry(tx.recipient.clone()).or_insert(0.0) += tx.amount;
    Ok(())
}
