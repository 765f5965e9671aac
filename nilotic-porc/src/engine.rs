//! The PoRC engine: enrollment, pool rotation, task generation,
//! contribution verification and reward distribution.
//!
//! Three worker loops run inside the engine (task assignment every
//! 5 s, reward distribution every 30 s, pool rotation every 24 s); the
//! reward tick additionally fires on every block-mined event. Each
//! loop takes only the locks it needs; the store lock serializes
//! persistence writes.

use crate::error::PorcError;
use crate::store::PorcStore;
use log::{info, warn};
use nilotic_core::Ledger;
use nilotic_crypto::SignatureVerifier;
use nilotic_shared_types::porc::config::{
    BLOCKS_PER_DAY, BONDING_CURVE_EARLY, BURN_RATE, DAILY_REWARD_POOL, EARLY_ADOPTER_LIMIT,
    MAX_REWARD_PER_BLOCK, MICRO_PER_UNIT, MIN_ACTIVITY, MIN_BALANCE, POOL_ROTATION_BLOCKS,
    POOL_SIZE,
};
use nilotic_shared_types::porc::{
    PorcContribution, PorcPool, PorcStats, PorcTask, PorcTaskType, PorcWalletStatus,
};
use nilotic_shared_types::{unix_now, Address};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

const TASK_ASSIGNMENT_INTERVAL: Duration = Duration::from_secs(5);
const REWARD_DISTRIBUTION_INTERVAL: Duration = Duration::from_secs(30);
const POOL_ROTATION_INTERVAL: Duration = Duration::from_secs(24);

/// Tunable engine parameters, seeded from the protocol constants.
#[derive(Debug, Clone)]
pub struct PorcEngineConfig {
    pub daily_reward_pool: f64,
    pub early_adopter_limit: u64,
    pub pool_size: usize,
    pub rotation_blocks: u64,
    pub bonding_curve_early: f64,
}

impl Default for PorcEngineConfig {
    fn default() -> Self {
        PorcEngineConfig {
            daily_reward_pool: DAILY_REWARD_POOL,
            early_adopter_limit: EARLY_ADOPTER_LIMIT,
            pool_size: POOL_SIZE,
            rotation_blocks: POOL_ROTATION_BLOCKS,
            bonding_curve_early: BONDING_CURVE_EARLY,
        }
    }
}

pub struct PorcEngine {
    ledger: Arc<Ledger>,
    verifier: Arc<dyn SignatureVerifier>,
    store: Mutex<PorcStore>,
    config: Mutex<PorcEngineConfig>,

    wallets: Mutex<HashMap<Address, PorcWalletStatus>>,
    /// Declared public keys for contribution signature checks.
    wallet_keys: Mutex<HashMap<Address, String>>,
    pools: Mutex<Vec<PorcPool>>,
    tasks: Mutex<VecDeque<PorcTask>>,
    contributions: Mutex<Vec<PorcContribution>>,
    stats: Mutex<PorcStats>,

    current_height: AtomicU64,
    total_registered: AtomicU64,

    running: Mutex<bool>,
    wakeup: Condvar,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PorcEngine {
    pub fn new(
        ledger: Arc<Ledger>,
        verifier: Arc<dyn SignatureVerifier>,
        store: PorcStore,
    ) -> Self {
        PorcEngine {
            ledger,
            verifier,
            store: Mutex::new(store),
            config: Mutex::new(PorcEngineConfig::default()),
            wallets: Mutex::new(HashMap::new()),
            wallet_keys: Mutex::new(HashMap::new()),
            pools: Mutex::new(Vec::new()),
            tasks: Mutex::new(VecDeque::new()),
            contributions: Mutex::new(Vec::new()),
            stats: Mutex::new(PorcStats::default()),
            current_height: AtomicU64::new(0),
            total_registered: AtomicU64::new(0),
            running: Mutex::new(false),
            wakeup: Condvar::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Reloads wallet statuses and pools from the store. Called once at
    /// startup.
    pub fn hydrate(&self) -> Result<(), PorcError> {
        let (loaded_wallets, loaded_pools) = {
            let store = self.store.lock().unwrap();
            (store.load_all_wallets()?, store.load_pools()?)
        };

        let mut wallets = self.wallets.lock().unwrap();
        for status in loaded_wallets {
            wallets.insert(status.address.clone(), status);
        }
        self.total_registered
            .store(wallets.len() as u64, Ordering::SeqCst);
        let wallet_count = wallets.len();
        drop(wallets);

        let pool_count = loaded_pools.len();
        *self.pools.lock().unwrap() = loaded_pools;
        info!("PoRC hydrated: {} wallets, {} pools", wallet_count, pool_count);
        Ok(())
    }

    // Configuration setters, mirroring the tunables of the original
    // deployment.

    pub fn set_daily_reward_pool(&self, daily_reward: f64) {
        self.config.lock().unwrap().daily_reward_pool = daily_reward;
    }

    pub fn set_early_adopter_limit(&self, limit: u64) {
        self.config.lock().unwrap().early_adopter_limit = limit;
    }

    pub fn set_pool_size(&self, size: usize) {
        self.config.lock().unwrap().pool_size = size.max(1);
    }

    pub fn set_rotation_blocks(&self, blocks: u64) {
        self.config.lock().unwrap().rotation_blocks = blocks.max(1);
    }

    pub fn current_height(&self) -> u64 {
        self.current_height.load(Ordering::SeqCst)
    }

    /// Enrolls a wallet. Eligibility requires a ledger balance of at
    /// least `MIN_BALANCE` and at least `MIN_ACTIVITY` transactions in
    /// the trailing 30 days. A previously enrolled wallet is re-enabled
    /// and keeps its history.
    pub fn enable(
        &self,
        address: &str,
        bandwidth_limit: u64,
        public_key: Option<String>,
    ) -> Result<PorcWalletStatus, PorcError> {
        let balance = self.ledger.get_balance(address);
        if balance < MIN_BALANCE {
            return Err(PorcError::NotEligible {
                address: address.to_string(),
                reason: format!("balance {} below minimum {}", balance, MIN_BALANCE),
            });
        }
        let activity = self.ledger.activity_of(address);
        if activity < MIN_ACTIVITY {
            return Err(PorcError::NotEligible {
                address: address.to_string(),
                reason: format!("activity {} below minimum {}", activity, MIN_ACTIVITY),
            });
        }

        if let Some(key) = public_key {
            self.wallet_keys
                .lock()
                .unwrap()
                .insert(address.to_string(), key);
        }

        let mut wallets = self.wallets.lock().unwrap();
        let status = match wallets.get_mut(address) {
            Some(existing) => {
                existing.is_enabled = true;
                existing.bandwidth_limit = bandwidth_limit;
                existing.clone()
            }
            None => {
                let registered = self.total_registered.fetch_add(1, Ordering::SeqCst);
                let config = self.config.lock().unwrap();
                let mut status = PorcWalletStatus::new(address);
                status.is_enabled = true;
                status.bandwidth_limit = bandwidth_limit;
                status.is_early_adopter = registered < config.early_adopter_limit;
                status.pool_index = registered % config.pool_size as u64;
                status.reputation_score = reputation_score(balance, activity);
                wallets.insert(address.to_string(), status.clone());
                status
            }
        };

        self.store.lock().unwrap().save_wallet_status(&status)?;
        info!("PoRC enabled for wallet {}", address);
        Ok(status)
    }

    /// Disables a wallet, keeping its history.
    pub fn disable(&self, address: &str) -> Result<(), PorcError> {
        let mut wallets = self.wallets.lock().unwrap();
        let status = wallets
            .get_mut(address)
            .ok_or_else(|| PorcError::WalletNotFound(address.to_string()))?;
        status.is_enabled = false;
        let snapshot = status.clone();
        drop(wallets);

        self.store.lock().unwrap().save_wallet_status(&snapshot)?;
        info!("PoRC disabled for wallet {}", address);
        Ok(())
    }

    pub fn is_wallet_enabled(&self, address: &str) -> bool {
        self.wallets
            .lock()
            .unwrap()
            .get(address)
            .map_or(false, |s| s.is_enabled)
    }

    pub fn wallet_status(&self, address: &str) -> Option<PorcWalletStatus> {
        self.wallets.lock().unwrap().get(address).cloned()
    }

    /// Rebuilds the pool list from the currently-enabled wallets,
    /// chunked into pools of the configured size. Wallets are taken in
    /// address order so the same enrollment set always produces the
    /// same pools.
    pub fn rotate_pools(&self) -> Result<(), PorcError> {
        let (pool_size, rotation_blocks) = {
            let config = self.config.lock().unwrap();
            (config.pool_size, config.rotation_blocks)
        };
        let height = self.current_height.load(Ordering::SeqCst);

        let mut enabled: Vec<Address> = {
            let wallets = self.wallets.lock().unwrap();
            wallets
                .values()
                .filter(|s| s.is_enabled)
                .map(|s| s.address.clone())
                .collect()
        };
        enabled.sort();

        let mut pools = self.pools.lock().unwrap();
        pools.clear();
        for (i, chunk) in enabled.chunks(pool_size).enumerate() {
            let mut pool = PorcPool::new(i as u64);
            pool.block_start = height;
            pool.block_end = height + rotation_blocks;
            pool.is_active = true;
            for address in chunk {
                pool.add_wallet(address.clone());
            }
            pools.push(pool);
        }

        let store = self.store.lock().unwrap();
        store.clear_pools()?;
        for pool in pools.iter() {
            store.save_pool(pool)?;
        }
        drop(store);

        self.stats.lock().unwrap().active_pools = pools.len() as u64;
        info!("PoRC pools rotated: {} active pools", pools.len());
        Ok(())
    }

    pub fn active_pools(&self) -> Vec<PorcPool> {
        self.pools.lock().unwrap().clone()
    }

    /// Enqueues a relay task and a block-propagation task for every
    /// enrolled wallet of every active pool.
    pub fn generate_tasks(&self) {
        let assignments: Vec<Address> = {
            let pools = self.pools.lock().unwrap();
            pools
                .iter()
                .filter(|pool| pool.is_active)
                .flat_map(|pool| pool.wallet_addresses.iter().cloned())
                .collect()
        };

        let height = self.current_height.load(Ordering::SeqCst);
        let mut fresh = Vec::new();
        for address in assignments {
            if !self.is_wallet_enabled(&address) {
                continue;
            }
            fresh.push(relay_task(&address, height));
            fresh.push(propagation_task(&address, height));
        }

        {
            let store = self.store.lock().unwrap();
            for task in &fresh {
                if let Err(err) = store.save_task(task) {
                    warn!("failed to persist task {}: {}", task.task_id, err);
                }
            }
        }
        self.tasks.lock().unwrap().extend(fresh);
    }

    /// Tasks currently queued for a wallet.
    pub fn tasks_for_wallet(&self, address: &str) -> Vec<PorcTask> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|task| task.assigned_wallet == address)
            .cloned()
            .collect()
    }

    /// Accepts a signed contribution log. The wallet must be enabled,
    /// the log must report work, the task must exist in the queue (or
    /// carry a well-formed task id), and the signature must verify
    /// against the wallet's declared key when one is registered.
    pub fn submit_contribution(&self, contribution: PorcContribution) -> Result<(), PorcError> {
        if contribution.wallet_address.is_empty() || contribution.task_id.is_empty() {
            return Err(PorcError::InvalidContribution(
                "missing wallet address or task id".into(),
            ));
        }
        if !self.is_wallet_enabled(&contribution.wallet_address) {
            return Err(PorcError::WalletNotEnabled(
                contribution.wallet_address.clone(),
            ));
        }
        if contribution.bandwidth_used == 0 && contribution.transactions_relayed == 0 {
            return Err(PorcError::InvalidContribution(
                "contribution reports no work".into(),
            ));
        }

        let task_known = self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .any(|task| task.task_id == contribution.task_id);
        if !task_known && !contribution.task_id.starts_with("task_") {
            return Err(PorcError::InvalidContribution(format!(
                "unknown task {}",
                contribution.task_id
            )));
        }

        let key = self
            .wallet_keys
            .lock()
            .unwrap()
            .get(&contribution.wallet_address)
            .cloned();
        match key {
            Some(public_key) => {
                let message = contribution.content_hash();
                if !self
                    .verifier
                    .verify(message.as_bytes(), &contribution.signature, &public_key)
                {
                    return Err(PorcError::InvalidContribution(
                        "signature does not verify".into(),
                    ));
                }
            }
            None => {
                if contribution.signature.is_empty() {
                    return Err(PorcError::InvalidContribution("missing signature".into()));
                }
            }
        }

        {
            let mut wallets = self.wallets.lock().unwrap();
            if let Some(status) = wallets.get_mut(&contribution.wallet_address) {
                status.last_contribution = unix_now();
            }
        }
        self.store.lock().unwrap().save_contribution(&contribution)?;
        info!(
            "Contribution accepted from {} ({} points)",
            contribution.wallet_address,
            contribution.resource_points()
        );
        self.contributions.lock().unwrap().push(contribution);
        Ok(())
    }

    /// The reward tick. Sums resource points across the pending
    /// contributions, splits the per-block budget proportionally with
    /// the early-adopter multiplier and the per-wallet cap, then clears
    /// the batch. The unpaid residue of the budget is burned.
    pub fn distribute_rewards(&self) -> Result<(), PorcError> {
        let batch: Vec<PorcContribution> = {
            let mut contributions = self.contributions.lock().unwrap();
            if contributions.is_empty() {
                return Ok(());
            }
            contributions.drain(..).collect()
        };

        let mut total_points: u64 = 0;
        let mut wallet_points: HashMap<Address, u64> = HashMap::new();
        for contribution in &batch {
            let points = contribution.resource_points();
            total_points += points;
            *wallet_points
                .entry(contribution.wallet_address.clone())
                .or_insert(0) += points;
        }
        if total_points == 0 {
            return Ok(());
        }

        let (daily_pool, bonding_early) = {
            let config = self.config.lock().unwrap();
            (config.daily_reward_pool, config.bonding_curve_early)
        };
        let block_reward = daily_pool / BLOCKS_PER_DAY as f64;

        let mut paid_total = 0.0_f64;
        {
            let mut wallets = self.wallets.lock().unwrap();
            let store = self.store.lock().unwrap();
            for (address, points) in &wallet_points {
                let status = match wallets.get_mut(address) {
                    Some(status) => status,
                    None => continue,
                };
                let proportional = (*points as f64 / total_points as f64) * block_reward;
                let multiplier = if status.is_early_adopter {
                    bonding_early
                } else {
                    1.0
                };
                let reward = (proportional * multiplier).min(MAX_REWARD_PER_BLOCK);
                paid_total += reward;

                status.total_rewards += (reward * MICRO_PER_UNIT) as u64;
                status.total_resource_points += points;
                if let Err(err) = store.save_wallet_status(status) {
                    warn!("failed to persist wallet {}: {}", address, err);
                }
            }
        }

        let bandwidth_sum: u64 = batch.iter().map(|c| c.bandwidth_used).sum();
        let uptime_sum: u64 = batch.iter().map(|c| c.uptime_seconds).sum();

        let mut stats = self.stats.lock().unwrap();
        stats.total_resource_points += total_points;
        stats.total_rewards_distributed += (block_reward * MICRO_PER_UNIT) as u64;
        stats.current_block_reward = (block_reward * MICRO_PER_UNIT) as u64;
        // Whatever the cap withheld from the budget is burned.
        let residue = (block_reward - paid_total).max(0.0);
        stats.total_burned += (residue * MICRO_PER_UNIT) as u64;
        stats.average_bandwidth = bandwidth_sum as f64 / batch.len() as f64;
        stats.average_uptime = uptime_sum as f64 / batch.len() as f64;
        Ok(())
    }

    /// Records the burn of the configured fraction of the fees
    /// collected by a block.
    pub fn burn_fees(&self, collected_fees: f64) {
        if collected_fees <= 0.0 {
            return;
        }
        let burned = BURN_RATE * collected_fees;
        self.stats.lock().unwrap().total_burned += (burned * MICRO_PER_UNIT) as u64;
    }

    /// Block-mined hook: advances the engine height, rotates pools on
    /// the rotation boundary, burns the fee share and runs the reward
    /// tick.
    pub fn on_block_mined(&self, height: u64, collected_fees: f64) {
        self.current_height.store(height, Ordering::SeqCst);
        let rotation_blocks = self.config.lock().unwrap().rotation_blocks;
        if height % rotation_blocks == 0 {
            if let Err(err) = self.rotate_pools() {
                warn!("pool rotation failed: {}", err);
            }
        }
        self.burn_fees(collected_fees);
        if let Err(err) = self.distribute_rewards() {
            warn!("reward distribution failed: {}", err);
        }
    }

    /// Engine-wide counters with the wallet tallies filled in. Each
    /// lock is taken and released on its own.
    pub fn stats(&self) -> PorcStats {
        let (total_wallets, active_wallets) = {
            let wallets = self.wallets.lock().unwrap();
            (
                wallets.len() as u64,
                wallets.values().filter(|s| s.is_enabled).count() as u64,
            )
        };
        let active_pools = self
            .pools
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.is_active)
            .count() as u64;

        let mut stats = self.stats.lock().unwrap().clone();
        stats.total_wallets = total_wallets;
        stats.active_wallets = active_wallets;
        stats.active_pools = active_pools;
        stats
    }

    /// Enabled wallets ranked by lifetime resource points.
    pub fn top_contributors(&self, limit: usize) -> Vec<PorcWalletStatus> {
        let wallets = self.wallets.lock().unwrap();
        let mut contributors: Vec<PorcWalletStatus> = wallets
            .values()
            .filter(|s| s.is_enabled)
            .cloned()
            .collect();
        contributors.sort_by(|a, b| b.total_resource_points.cmp(&a.total_resource_points));
        contributors.truncate(limit);
        contributors
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock().unwrap()
    }

    /// Starts the three worker loops. Idempotent.
    pub fn start(self: Arc<Self>) {
        {
            let mut running = self.running.lock().unwrap();
            if *running {
                return;
            }
            *running = true;
        }

        let mut workers = self.workers.lock().unwrap();
        let engine = Arc::clone(&self);
        workers.push(std::thread::spawn(move || {
            while engine.sleep_interval(TASK_ASSIGNMENT_INTERVAL) {
                engine.generate_tasks();
            }
        }));
        let engine = Arc::clone(&self);
        workers.push(std::thread::spawn(move || {
            while engine.sleep_interval(REWARD_DISTRIBUTION_INTERVAL) {
                if let Err(err) = engine.distribute_rewards() {
                    warn!("reward distribution failed: {}", err);
                }
            }
        }));
        let engine = Arc::clone(&self);
        workers.push(std::thread::spawn(move || {
            while engine.sleep_interval(POOL_ROTATION_INTERVAL) {
                if let Err(err) = engine.rotate_pools() {
                    warn!("pool rotation failed: {}", err);
                }
            }
        }));
        info!("PoRC engine started");
    }

    /// Stops the worker loops and joins them.
    pub fn stop(&self) {
        {
            let mut running = self.running.lock().unwrap();
            if !*running {
                return;
            }
            *running = false;
        }
        self.wakeup.notify_all();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().unwrap().drain(..).collect();
        for worker in workers {
            let _ = worker.join();
        }
        info!("PoRC engine stopped");
    }

    /// Cancellation-aware sleep: returns false once the engine is
    /// stopping.
    fn sleep_interval(&self, interval: Duration) -> bool {
        let mut running = self.running.lock().unwrap();
        let deadline = std::time::Instant::now() + interval;
        while *running {
            let now = std::time::Instant::now();
            if now >= deadline {
                return true;
            }
            let (guard, _) = self
                .wakeup
                .wait_timeout(running, deadline - now)
                .unwrap();
            running = guard;
        }
        false
    }
}

/// Reputation from balance and recent activity, capped at 10 000.
fn reputation_score(balance: f64, activity: u64) -> u64 {
    ((balance as u64) * 10 + activity * 100).min(10_000)
}

fn relay_task(address: &str, height: u64) -> PorcTask {
    PorcTask {
        task_type: PorcTaskType::RelayTransactions,
        task_id: generate_task_id(),
        assigned_wallet: address.to_string(),
        timestamp: unix_now(),
        block_height: height,
        estimated_bandwidth_mb: 10,
        estimated_transactions: 50,
    }
}

fn propagation_task(address: &str, height: u64) -> PorcTask {
    PorcTask {
        task_type: PorcTaskType::PropagateBlock,
        task_id: generate_task_id(),
        assigned_wallet: address.to_string(),
        timestamp: unix_now(),
        block_height: height,
        estimated_bandwidth_mb: 5,
        estimated_transactions: 0,
    }
}

fn generate_task_id() -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let salt: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("task_{}_{}", millis, salt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nilotic_core::{MiningConfig, Producer};
    use nilotic_crypto::Ed25519Verifier;
    use nilotic_shared_types::{Transaction, GENESIS};

    fn signed(sender: &str, recipient: &str, amount: f64) -> Transaction {
        let mut tx = Transaction::new(sender, recipient, amount);
        tx.signature = "sig".to_string();
        tx
    }

    /// A ledger where the given wallets are funded and active: one
    /// mined block carries a transfer to each.
    fn funded_ledger(wallets: &[&str]) -> Arc<Ledger> {
        let ledger = Arc::new(Ledger::with_parameters(1, 100.0));
        let producer = Producer::new(
            Arc::clone(&ledger),
            MiningConfig {
                min_difficulty: 1,
                ..MiningConfig::default()
            },
            Arc::new(Ed25519Verifier),
        );
        for wallet in wallets {
            // Above the instant limit so the transfer is mined, which
            // both funds the wallet and gives it chain activity.
            ledger
                .submit_transaction(signed(GENESIS, wallet, 20.0))
                .unwrap();
        }
        producer.mine_block("NILminer", 0).unwrap();
        ledger
    }

    fn engine_for(ledger: Arc<Ledger>) -> Arc<PorcEngine> {
        Arc::new(PorcEngine::new(
            ledger,
            Arc::new(Ed25519Verifier),
            PorcStore::in_memory().unwrap(),
        ))
    }

    fn contribution(wallet: &str, bandwidth: u64, txs: u64) -> PorcContribution {
        PorcContribution {
            wallet_address: wallet.to_string(),
            task_id: "task_1700000000_1".to_string(),
            timestamp: unix_now(),
            block_height: 1,
            bandwidth_used: bandwidth,
            transactions_relayed: txs,
            uptime_seconds: 600,
            proof_hash: "00".repeat(32),
            signature: "sig".to_string(),
        }
    }

    #[test]
    fn enable_requires_balance_and_activity() {
        let ledger = funded_ledger(&["NILw1"]);
        let engine = engine_for(Arc::clone(&ledger));

        // Funded and active.
        let status = engine.enable("NILw1", 50, None).unwrap();
        assert!(status.is_enabled);
        assert!(status.is_early_adopter);
        assert_eq!(status.pool_index, 0);

        // Never seen on chain.
        assert!(matches!(
            engine.enable("NILstranger", 50, None),
            Err(PorcError::NotEligible { .. })
        ));
    }

    #[test]
    fn disable_keeps_history() {
        let ledger = funded_ledger(&["NILw1"]);
        let engine = engine_for(ledger);
        engine.enable("NILw1", 50, None).unwrap();
        engine.disable("NILw1").unwrap();

        let status = engine.wallet_status("NILw1").unwrap();
        assert!(!status.is_enabled);
        // Re-enabling does not double-count the registration.
        engine.enable("NILw1", 80, None).unwrap();
        assert_eq!(engine.stats().total_wallets, 1);
        assert_eq!(engine.wallet_status("NILw1").unwrap().bandwidth_limit, 80);
    }

    #[test]
    fn rotation_partitions_enabled_wallets() {
        let ledger = funded_ledger(&["NILa", "NILb", "NILc"]);
        let engine = engine_for(ledger);
        for wallet in ["NILa", "NILb", "NILc"] {
            engine.enable(wallet, 50, None).unwrap();
        }
        engine.disable("NILb").unwrap();
        engine.set_pool_size(2);
        engine.rotate_pools().unwrap();

        let pools = engine.active_pools();
        assert_eq!(pools.len(), 1);
        assert!(pools[0].contains_wallet("NILa"));
        assert!(pools[0].contains_wallet("NILc"));
        assert!(!pools[0].contains_wallet("NILb"));

        // Every enabled wallet lands in exactly one pool, none exceeds
        // the configured size.
        engine.enable("NILb", 50, None).unwrap();
        engine.rotate_pools().unwrap();
        let pools = engine.active_pools();
        assert_eq!(pools.len(), 2);
        let mut seen: Vec<&str> = Vec::new();
        for pool in &pools {
            assert!(pool.wallet_addresses.len() <= 2);
            for address in &pool.wallet_addresses {
                assert!(!seen.contains(&address.as_str()));
                seen.push(address);
            }
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn rotation_is_deterministic() {
        let ledger = funded_ledger(&["NILc", "NILa", "NILb"]);
        let engine = engine_for(ledger);
        for wallet in ["NILc", "NILa", "NILb"] {
            engine.enable(wallet, 50, None).unwrap();
        }
        engine.rotate_pools().unwrap();
        let first = engine.active_pools();
        engine.rotate_pools().unwrap();
        assert_eq!(first, engine.active_pools());
        // Address order, independent of enrollment order.
        assert_eq!(
            first[0].wallet_addresses,
            vec!["NILa".to_string(), "NILb".to_string(), "NILc".to_string()]
        );
    }

    #[test]
    fn tasks_generated_per_enrolled_wallet() {
        let ledger = funded_ledger(&["NILa", "NILb"]);
        let engine = engine_for(ledger);
        engine.enable("NILa", 50, None).unwrap();
        engine.enable("NILb", 50, None).unwrap();
        engine.rotate_pools().unwrap();
        engine.generate_tasks();

        let tasks = engine.tasks_for_wallet("NILa");
        assert_eq!(tasks.len(), 2);
        assert!(tasks
            .iter()
            .any(|t| t.task_type == PorcTaskType::RelayTransactions
                && t.estimated_bandwidth_mb == 10
                && t.estimated_transactions == 50));
        assert!(tasks
            .iter()
            .any(|t| t.task_type == PorcTaskType::PropagateBlock
                && t.estimated_bandwidth_mb == 5));
        assert_eq!(engine.tasks_for_wallet("NILb").len(), 2);
    }

    #[test]
    fn contribution_validation() {
        let ledger = funded_ledger(&["NILa"]);
        let engine = engine_for(ledger);
        engine.enable("NILa", 50, None).unwrap();

        // Unenrolled wallet.
        assert!(matches!(
            engine.submit_contribution(contribution("NILghost", 10, 0)),
            Err(PorcError::WalletNotEnabled(_))
        ));
        // No work reported.
        assert!(matches!(
            engine.submit_contribution(contribution("NILa", 0, 0)),
            Err(PorcError::InvalidContribution(_))
        ));
        // Malformed task id with no matching queued task.
        let mut bad_task = contribution("NILa", 10, 0);
        bad_task.task_id = "bogus".to_string();
        assert!(engine.submit_contribution(bad_task).is_err());

        // Well-formed submission.
        engine.submit_contribution(contribution("NILa", 10, 0)).unwrap();
        assert!(engine.wallet_status("NILa").unwrap().last_contribution > 0);
    }

    #[test]
    fn contribution_signature_checked_when_key_registered() {
        let ledger = funded_ledger(&["NILa"]);
        let engine = engine_for(ledger);
        let keypair = nilotic_crypto::NiloticKeyPair::generate();
        engine
            .enable("NILa", 50, Some(keypair.public_key_hex()))
            .unwrap();

        let mut forged = contribution("NILa", 10, 0);
        forged.signature = "00".repeat(64);
        assert!(matches!(
            engine.submit_contribution(forged),
            Err(PorcError::InvalidContribution(_))
        ));

        let mut genuine = contribution("NILa", 10, 0);
        genuine.signature = keypair.sign_hex(genuine.content_hash().as_bytes());
        engine.submit_contribution(genuine).unwrap();
    }

    // Five wallets, one early adopter, equal contributions: the early
    // adopter earns the bonding-curve multiple and nobody hits the cap.
    #[test]
    fn reward_tick_splits_budget_proportionally() {
        let wallets = ["NILw1", "NILw2", "NILw3", "NILw4", "NILw5"];
        let ledger = funded_ledger(&wallets);
        let engine = engine_for(ledger);
        engine.set_early_adopter_limit(1);
        for wallet in wallets {
            engine.enable(wallet, 50, None).unwrap();
        }
        assert!(engine.wallet_status("NILw1").unwrap().is_early_adopter);
        assert!(!engine.wallet_status("NILw2").unwrap().is_early_adopter);

        for wallet in wallets {
            engine.submit_contribution(contribution(wallet, 10, 0)).unwrap();
        }
        engine.distribute_rewards().unwrap();

        let block_reward = DAILY_REWARD_POOL / BLOCKS_PER_DAY as f64;
        // Mirrors the engine's arithmetic: each wallet holds 10 of the
        // 50 total points.
        let proportional = (10.0_f64 / 50.0) * block_reward;
        let early = (proportional * 1.5 * MICRO_PER_UNIT) as u64;
        let regular = (proportional * MICRO_PER_UNIT) as u64;

        let w1 = engine.wallet_status("NILw1").unwrap();
        assert_eq!(w1.total_rewards, early);
        assert_eq!(w1.total_resource_points, 10);
        for wallet in &wallets[1..] {
            assert_eq!(engine.wallet_status(wallet).unwrap().total_rewards, regular);
        }

        let stats = engine.stats();
        assert_eq!(
            stats.current_block_reward,
            (block_reward * MICRO_PER_UNIT) as u64
        );
        assert_eq!(
            stats.total_rewards_distributed,
            (block_reward * MICRO_PER_UNIT) as u64
        );
        assert_eq!(stats.total_resource_points, 50);
        // Pending batch consumed.
        engine.distribute_rewards().unwrap();
        assert_eq!(engine.wallet_status("NILw1").unwrap().total_rewards, early);
    }

    #[test]
    fn reward_cap_limits_single_wallet() {
        let ledger = funded_ledger(&["NILwhale"]);
        let engine = engine_for(ledger);
        // A huge budget forces the per-wallet cap to bind.
        engine.set_daily_reward_pool(36_000_000.0);
        engine.enable("NILwhale", 50, None).unwrap();
        engine
            .submit_contribution(contribution("NILwhale", 100, 0))
            .unwrap();
        engine.distribute_rewards().unwrap();

        let status = engine.wallet_status("NILwhale").unwrap();
        assert_eq!(
            status.total_rewards,
            (MAX_REWARD_PER_BLOCK * MICRO_PER_UNIT) as u64
        );
        // The withheld budget is burned.
        let block_reward = 36_000_000.0 / BLOCKS_PER_DAY as f64;
        let expected_burn = ((block_reward - MAX_REWARD_PER_BLOCK) * MICRO_PER_UNIT) as u64;
        assert_eq!(engine.stats().total_burned, expected_burn);
    }

    #[test]
    fn fee_burn_accumulates() {
        let ledger = funded_ledger(&["NILa"]);
        let engine = engine_for(ledger);
        engine.burn_fees(10.0);
        engine.burn_fees(2.0);
        assert_eq!(
            engine.stats().total_burned,
            ((0.5 * 10.0 + 0.5 * 2.0) * MICRO_PER_UNIT) as u64
        );
    }

    #[test]
    fn block_mined_hook_rotates_on_boundary() {
        let ledger = funded_ledger(&["NILa"]);
        let engine = engine_for(ledger);
        engine.enable("NILa", 50, None).unwrap();

        engine.on_block_mined(7, 0.0);
        assert!(engine.active_pools().is_empty());
        engine.on_block_mined(10, 0.0);
        assert_eq!(engine.active_pools().len(), 1);
        assert_eq!(engine.active_pools()[0].block_start, 10);
        assert_eq!(engine.active_pools()[0].block_end, 20);
    }

    #[test]
    fn top_contributors_ranked_by_points() {
        let ledger = funded_ledger(&["NILa", "NILb"]);
        let engine = engine_for(ledger);
        engine.enable("NILa", 50, None).unwrap();
        engine.enable("NILb", 50, None).unwrap();
        engine.submit_contribution(contribution("NILa", 5, 0)).unwrap();
        engine.submit_contribution(contribution("NILb", 50, 0)).unwrap();
        engine.distribute_rewards().unwrap();

        let top = engine.top_contributors(10);
        assert_eq!(top[0].address, "NILb");
        assert_eq!(top[1].address, "NILa");
        assert_eq!(engine.top_contributors(1).len(), 1);
    }

    #[test]
    fn hydrate_restores_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("porc.db");
        let db_path = db_path.to_str().unwrap();

        let ledger = funded_ledger(&["NILa"]);
        {
            let engine = Arc::new(PorcEngine::new(
                Arc::clone(&ledger),
                Arc::new(Ed25519Verifier),
                PorcStore::open(db_path).unwrap(),
            ));
            engine.enable("NILa", 50, None).unwrap();
            engine.rotate_pools().unwrap();
        }

        let engine = Arc::new(PorcEngine::new(
            ledger,
            Arc::new(Ed25519Verifier),
            PorcStore::open(db_path).unwrap(),
        ));
        engine.hydrate().unwrap();
        assert!(engine.is_wallet_enabled("NILa"));
        assert_eq!(engine.active_pools().len(), 1);
        assert_eq!(engine.stats().total_wallets, 1);
    }

    #[test]
    fn workers_start_and_stop() {
        let ledger = funded_ledger(&["NILa"]);
        let engine = engine_for(ledger);
        Arc::clone(&engine).start();
        assert!(engine.is_running());
        Arc::clone(&engine).start(); // idempotent
        engine.stop();
        assert!(!engine.is_running());
        engine.stop(); // idempotent
    }
}
