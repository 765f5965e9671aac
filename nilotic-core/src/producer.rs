//! Block production: assembly, the proof-of-work nonce search, the
//! proof-of-stake validation path and difficulty retargeting.
//!
//! One producer serves both sealing modes; validator-sealed blocks
//! bypass the work requirement but share assembly, commit and mempool
//! consumption with the mined path.

use crate::audit_log;
use crate::constants::{BASE_FEE, FEE_RATE, HALVING_INTERVAL, MAX_BLOCK_SIZE,
    IMPROVED_MAX_TRANSACTIONS_PER_BLOCK, MAX_TRANSACTIONS_PER_BLOCK};
use crate::error::CoreError;
use crate::fastpath;
use crate::ledger::Ledger;
use log::{info, warn};
use nilotic_shared_types::{Block, Transaction, COINBASE};
use nilotic_crypto::SignatureVerifier;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Ring-buffer capacity for block-time samples.
const BLOCK_TIME_SAMPLES: usize = 100;

#[derive(Debug, Clone)]
pub struct MiningConfig {
    /// Difficulty a fresh node starts at.
    pub target_difficulty: u64,
    pub min_difficulty: u64,
    pub max_difficulty: u64,
    /// Target seconds between blocks, driving the retarget.
    pub target_block_time_secs: u64,
    pub max_block_size: u64,
    pub max_transactions_per_block: usize,
}

impl Default for MiningConfig {
    fn default() -> Self {
        MiningConfig {
            target_difficulty: 4,
            min_difficulty: 2,
            max_difficulty: 8,
            target_block_time_secs: 600,
            max_block_size: MAX_BLOCK_SIZE,
            max_transactions_per_block: MAX_TRANSACTIONS_PER_BLOCK,
        }
    }
}

impl MiningConfig {
    /// The improved-speed profile: lower difficulty, 30 s blocks, 50
    /// transactions per block.
    pub fn improved() -> Self {
        MiningConfig {
            target_difficulty: 2,
            target_block_time_secs: 30,
            max_transactions_per_block: IMPROVED_MAX_TRANSACTIONS_PER_BLOCK,
            ..MiningConfig::default()
        }
    }
}

/// Running mining statistics, exposed on the node status surface.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningStats {
    pub total_blocks_mined: u64,
    pub total_transactions_processed: u64,
    pub total_rewards_earned: f64,
    pub total_fees_earned: f64,
    pub average_block_time_secs: f64,
    pub fastest_block_secs: f64,
    pub slowest_block_secs: f64,
    pub difficulty_changes: u64,
    recent_block_times: VecDeque<f64>,
}

impl MiningStats {
    fn record(&mut self, block_time_secs: f64, reward: f64, fees: f64, tx_count: usize) {
        self.total_blocks_mined += 1;
        self.total_transactions_processed += tx_count as u64;
        self.total_rewards_earned += reward;
        self.total_fees_earned += fees;
        if self.fastest_block_secs == 0.0 || block_time_secs < self.fastest_block_secs {
            self.fastest_block_secs = block_time_secs;
        }
        if block_time_secs > self.slowest_block_secs {
            self.slowest_block_secs = block_time_secs;
        }
        self.push_sample(block_time_secs);
    }

    fn push_sample(&mut self, block_time_secs: f64) {
        self.recent_block_times.push_back(block_time_secs);
        if self.recent_block_times.len() > BLOCK_TIME_SAMPLES {
            self.recent_block_times.pop_front();
        }
        self.average_block_time_secs =
            self.recent_block_times.iter().sum::<f64>() / self.recent_block_times.len() as f64;
    }
}

pub struct Producer {
    ledger: Arc<Ledger>,
    config: MiningConfig,
    verifier: Arc<dyn SignatureVerifier>,
    should_stop: AtomicBool,
    stats: Mutex<MiningStats>,
}

impl Producer {
    pub fn new(
        ledger: Arc<Ledger>,
        config: MiningConfig,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        info!(
            "Producer initialized with difficulty {}",
            ledger.difficulty()
        );
        Producer {
            ledger,
            config,
            verifier,
            should_stop: AtomicBool::new(false),
            stats: Mutex::new(MiningStats::default()),
        }
    }

    pub fn config(&self) -> &MiningConfig {
        &self.config
    }

    pub fn stats(&self) -> MiningStats {
        self.stats.lock().unwrap().clone()
    }

    /// Requests cooperative cancellation of any in-flight nonce search.
    pub fn request_stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
    }

    /// Re-arms the producer after a stop.
    pub fn reset_stop(&self) {
        self.should_stop.store(false, Ordering::SeqCst);
    }

    /// Block reward at `height`: the configured base reward halved
    /// every 210 000 blocks, keeping the real-valued intermediate.
    pub fn calculate_block_reward(&self, height: u64) -> f64 {
        let halvings = height / HALVING_INTERVAL;
        let mut reward = self.ledger.mining_reward();
        for _ in 0..halvings {
            reward /= 2.0;
        }
        reward
    }

    /// Mines one block for `miner`.
    ///
    /// Candidates at or below the instant limit are applied through the
    /// fast path and consumed from the mempool regardless of the mining
    /// outcome; the rest go into the block. Returns the sentinel
    /// invalid block when cancelled or when `max_attempts` (0 =
    /// unbounded) is exhausted without a solution.
    pub fn mine_block(&self, miner: &str, max_attempts: u64) -> Result<Block, CoreError> {
        let started = Instant::now();
        let last = self.ledger.latest_block();
        let difficulty = self.ledger.difficulty();

        let mut block = Block::new(last.index + 1, last.hash);

        let candidates = self
            .ledger
            .select_candidates(self.config.max_transactions_per_block, self.config.max_block_size);
        for tx in candidates {
            if fastpath::qualifies(&tx) {
                if self.ledger.fast_confirm(&tx).is_ok() {
                    // Applied instantly; consumed whether or not the
                    // block below is ever sealed.
                    self.ledger.remove_from_mempool(&tx.hash);
                    continue;
                }
            }
            block.transactions.push(tx);
        }

        let fees = block.collected_fees(BASE_FEE, FEE_RATE);
        let reward = self.calculate_block_reward(block.index);
        block
            .transactions
            .insert(0, Transaction::new(COINBASE, miner, reward));
        block.seal();

        info!(
            "Mining block {} with {} transactions at difficulty {}",
            block.index,
            block.transactions.len(),
            difficulty
        );

        let mut nonce: u64 = 0;
        loop {
            if self.should_stop.load(Ordering::SeqCst) {
                warn!("Mining stopped before a solution was found");
                return Ok(Block::invalid());
            }
            if max_attempts > 0 && nonce >= max_attempts {
                warn!("Mining exhausted {} attempts without a solution", max_attempts);
                return Ok(Block::invalid());
            }
            block.nonce = nonce;
            block.hash = block.compute_hash();
            if block.meets_difficulty(difficulty) {
                break;
            }
            nonce += 1;
        }

        info!("Block mined: hash={}, nonce={}", block.hash, block.nonce);
        self.commit(block, started, reward, fees)
    }

    /// The proof-of-stake production path: a registered validator seals
    /// the next block without a work search. Reward scales with stake;
    /// when the validator's public key is supplied, the signature is
    /// checked against the sealed block hash through the verify oracle.
    pub fn validate_block_pos(
        &self,
        validator: &str,
        signature_hex: &str,
        public_key_hex: Option<&str>,
    ) -> Result<Block, CoreError> {
        let started = Instant::now();
        let stake = self.ledger.stake_of(validator);
        if stake <= 0.0 {
            return Err(CoreError::NotAValidator(validator.to_string()));
        }

        let last = self.ledger.latest_block();
        let mut block = Block::new(last.index + 1, last.hash);
        block.validator = validator.to_string();

        let candidates = self
            .ledger
            .select_candidates(self.config.max_transactions_per_block, self.config.max_block_size);
        block.transactions.extend(candidates);

        let fees = block.collected_fees(BASE_FEE, FEE_RATE);
        let reward = self.ledger.mining_reward() * (stake / 1000.0);
        block
            .transactions
            .insert(0, Transaction::new(COINBASE, validator, reward));
        block.seal();

        if let Some(public_key) = public_key_hex {
            if !self
                .verifier
                .verify(block.hash.as_bytes(), signature_hex, public_key)
            {
                return Err(CoreError::InvalidBlock(
                    "validator signature does not verify".into(),
                ));
            }
        }
        block.signature = signature_hex.to_string();

        info!(
            "Block validated by {} with stake {} and reward {}",
            validator, stake, reward
        );
        self.commit(block, started, reward, fees)
    }

    /// Commits a sealed block: appends to the ledger, consumes its
    /// transactions from the mempool, updates statistics and retargets.
    fn commit(
        &self,
        block: Block,
        started: Instant,
        reward: f64,
        fees: f64,
    ) -> Result<Block, CoreError> {
        self.ledger.append_block(block.clone())?;
        for tx in &block.transactions {
            self.ledger.remove_from_mempool(&tx.hash);
        }

        let elapsed = started.elapsed().as_secs_f64();
        self.stats
            .lock()
            .unwrap()
            .record(elapsed, reward, fees, block.transactions.len());
        self.adjust_difficulty();
        Ok(block)
    }

    /// Feeds a block-time sample into the ring buffer without mining.
    pub fn record_block_time(&self, secs: f64) {
        self.stats.lock().unwrap().push_sample(secs);
    }

    /// Retarget rule: against the ring-buffer average, fast blocks
    /// (< 0.8 × target) raise the difficulty by one, slow blocks
    /// (> 1.2 × target) lower it by one, both clamped to the configured
    /// bounds. Needs at least two samples.
    pub fn adjust_difficulty(&self) {
        let (average, samples) = {
            let stats = self.stats.lock().unwrap();
            (stats.average_block_time_secs, stats.recent_block_times.len())
        };
        if samples < 2 {
            return;
        }

        let current = self.ledger.difficulty();
        let target = self.config.target_block_time_secs as f64;
        let next = if average < target * 0.8 {
            (current + 1).min(self.config.max_difficulty)
        } else if average > target * 1.2 {
            current.saturating_sub(1).max(self.config.min_difficulty)
        } else {
            current
        };

        if next != current {
            self.ledger.set_difficulty(next);
            self.stats.lock().unwrap().difficulty_changes += 1;
            audit_log::log_difficulty_adjusted(current, next);
        }
    }

    /// Spawns the continuous mining loop. The thread exits once
    /// [`Producer::request_stop`] is called.
    pub fn start_mining(self: Arc<Self>, miner: String) -> JoinHandle<()> {
        let producer = self;
        thread::spawn(move || {
            info!("Mining loop started for {}", miner);
            while !producer.should_stop.load(Ordering::SeqCst) {
                match producer.mine_block(&miner, 0) {
                    Ok(block) if block.is_invalid() => break,
                    Ok(_) => {}
                    Err(err) => warn!("Mining attempt failed: {}", err),
                }
                thread::sleep(Duration::from_millis(100));
            }
            info!("Mining loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nilotic_crypto::Ed25519Verifier;
    use nilotic_shared_types::GENESIS;

    fn signed(sender: &str, recipient: &str, amount: f64) -> Transaction {
        let mut tx = Transaction::new(sender, recipient, amount);
        tx.signature = "sig".to_string();
        tx
    }

    fn producer_with(difficulty: u64) -> (Arc<Ledger>, Producer) {
        let ledger = Arc::new(Ledger::with_parameters(difficulty, 100.0));
        let producer = Producer::new(
            Arc::clone(&ledger),
            MiningConfig {
                target_difficulty: difficulty,
                min_difficulty: 1,
                ..MiningConfig::default()
            },
            Arc::new(Ed25519Verifier),
        );
        (ledger, producer)
    }

    #[test]
    fn mine_block_commits_and_rewards_miner() {
        let (ledger, producer) = producer_with(1);
        ledger
            .submit_transaction(signed(GENESIS, "NILalice", 50.0))
            .unwrap();

        let block = producer.mine_block("NILminer", 0).unwrap();
        assert!(!block.is_invalid());
        assert_eq!(ledger.chain_height(), 2);
        assert_eq!(ledger.get_balance("NILalice"), 50.0);
        assert_eq!(ledger.get_balance(GENESIS), 950.0);
        assert_eq!(ledger.get_balance("NILminer"), 100.0);
        assert_eq!(ledger.pending_count(), 0);
        assert_eq!(producer.stats().total_blocks_mined, 1);
    }

    #[test]
    fn small_transfers_take_the_fast_path() {
        let (ledger, producer) = producer_with(1);
        ledger
            .submit_transaction(signed(GENESIS, "NILbob", 5.0))
            .unwrap();

        let block = producer.mine_block("NILminer", 0).unwrap();
        assert_eq!(ledger.get_balance("NILbob"), 5.0);
        assert_eq!(ledger.get_balance(GENESIS), 995.0);
        // Fast-confirmed: consumed from the mempool, absent from the block.
        assert_eq!(ledger.pending_count(), 0);
        assert!(!block.transactions.iter().any(|tx| tx.recipient == "NILbob"));
        assert!(!ledger
            .blocks()
            .iter()
            .any(|b| b.transactions.iter().any(|tx| tx.recipient == "NILbob")));
    }

    #[test]
    fn cancelled_mining_returns_sentinel_until_reset() {
        let (ledger, producer) = producer_with(1);
        producer.request_stop();
        let block = producer.mine_block("NILminer", 0).unwrap();
        assert!(block.is_invalid());
        assert_eq!(ledger.chain_height(), 1);

        producer.reset_stop();
        let block = producer.mine_block("NILminer", 0).unwrap();
        assert!(!block.is_invalid());
        assert_eq!(ledger.chain_height(), 2);
    }

    #[test]
    fn improved_profile_raises_throughput() {
        let config = MiningConfig::improved();
        assert_eq!(config.target_difficulty, 2);
        assert_eq!(config.target_block_time_secs, 30);
        assert_eq!(config.max_transactions_per_block, 50);
    }

    #[test]
    fn exhausted_attempts_return_sentinel() {
        let (ledger, producer) = producer_with(8);
        let block = producer.mine_block("NILminer", 3).unwrap();
        assert!(block.is_invalid());
        assert_eq!(ledger.chain_height(), 1);
    }

    #[test]
    fn reward_halves_every_interval() {
        let (_ledger, producer) = producer_with(1);
        assert_eq!(producer.calculate_block_reward(1), 100.0);
        assert_eq!(producer.calculate_block_reward(HALVING_INTERVAL), 50.0);
        assert_eq!(producer.calculate_block_reward(HALVING_INTERVAL * 2), 25.0);
    }

    #[test]
    fn retarget_raises_difficulty_for_fast_blocks() {
        let ledger = Arc::new(Ledger::with_parameters(4, 100.0));
        let producer = Producer::new(
            Arc::clone(&ledger),
            MiningConfig {
                target_block_time_secs: 10,
                ..MiningConfig::default()
            },
            Arc::new(Ed25519Verifier),
        );
        for _ in 0..100 {
            producer.record_block_time(3.0);
        }
        producer.adjust_difficulty();
        assert_eq!(ledger.difficulty(), 5);
        assert_eq!(producer.stats().difficulty_changes, 1);
    }

    #[test]
    fn retarget_lowers_difficulty_for_slow_blocks_within_bounds() {
        let ledger = Arc::new(Ledger::with_parameters(2, 100.0));
        let producer = Producer::new(
            Arc::clone(&ledger),
            MiningConfig {
                target_block_time_secs: 10,
                min_difficulty: 2,
                ..MiningConfig::default()
            },
            Arc::new(Ed25519Verifier),
        );
        for _ in 0..10 {
            producer.record_block_time(60.0);
        }
        producer.adjust_difficulty();
        // Already at the floor.
        assert_eq!(ledger.difficulty(), 2);
        assert_eq!(producer.stats().difficulty_changes, 0);
    }

    #[test]
    fn retarget_needs_two_samples() {
        let (ledger, producer) = producer_with(4);
        producer.record_block_time(0.1);
        producer.adjust_difficulty();
        assert_eq!(ledger.difficulty(), 4);
    }

    #[test]
    fn pos_path_seals_without_work() {
        let (ledger, producer) = producer_with(8);
        ledger.stake(GENESIS, 500.0).unwrap();

        let block = producer
            .validate_block_pos(GENESIS, "unchecked-signature", None)
            .unwrap();
        assert_eq!(block.validator, GENESIS);
        assert_eq!(ledger.chain_height(), 2);
        // Reward scales with stake: 100 * 500/1000.
        assert_eq!(ledger.get_balance(GENESIS), 500.0 + 50.0);
    }

    #[test]
    fn pos_path_rejects_non_validator() {
        let (_ledger, producer) = producer_with(1);
        assert!(matches!(
            producer.validate_block_pos("NILnobody", "sig", None),
            Err(CoreError::NotAValidator(_))
        ));
    }

    #[test]
    fn pos_path_verifies_signature_when_key_supplied() {
        let (ledger, producer) = producer_with(8);
        ledger.stake(GENESIS, 100.0).unwrap();
        let keypair = nilotic_crypto::NiloticKeyPair::generate();
        let result =
            producer.validate_block_pos(GENESIS, "00", Some(&keypair.public_key_hex()));
        assert!(matches!(result, Err(CoreError::InvalidBlock(_))));
        assert_eq!(ledger.chain_height(), 1);
    }

    #[test]
    fn mining_loop_stops_on_request() {
        let (ledger, producer) = producer_with(1);
        let producer = Arc::new(producer);
        let handle = Arc::clone(&producer).start_mining("NILminer".to_string());
        while ledger.chain_height() < 3 {
            std::thread::yield_now();
        }
        producer.request_stop();
        handle.join().unwrap();
        assert!(ledger.chain_height() >= 3);
    }
}
