//! Proof-of-Resource-Contribution record types.
//!
//! PoRC rewards enrolled wallets for relay and propagation work
//! reported through signed contribution logs. The engine itself lives
//! in `nilotic-porc`; the records and the protocol constants are shared
//! here so the node surface and the engine agree on the wire forms.

use crate::{sha256_hex, Address};
use serde::{Deserialize, Serialize};

/// Protocol constants for the PoRC reward schedule.
pub mod config {
    /// Minimum account balance required to enroll.
    pub const MIN_BALANCE: f64 = 5.0;
    /// Minimum transaction count in the trailing 30 days.
    pub const MIN_ACTIVITY: u64 = 1;
    /// Total daily reward budget in whole units.
    pub const DAILY_REWARD_POOL: f64 = 500.0;
    /// Nominal blocks per day (2.4 s block time).
    pub const BLOCKS_PER_DAY: u64 = 36_000;
    /// First N enrolled wallets receive the early-adopter multiplier.
    pub const EARLY_ADOPTER_LIMIT: u64 = 1_000;
    /// Bonding-curve multiplier for early adopters.
    pub const BONDING_CURVE_EARLY: f64 = 1.5;
    /// Per-wallet reward cap per block, in whole units.
    pub const MAX_REWARD_PER_BLOCK: f64 = 0.5;
    /// Addresses per rotating pool.
    pub const POOL_SIZE: usize = 100;
    /// Pools are rebuilt every N blocks.
    pub const POOL_ROTATION_BLOCKS: u64 = 10;
    /// Fraction of collected transaction fees burned.
    pub const BURN_RATE: f64 = 0.5;
    /// Resource points granted per MB relayed.
    pub const RESOURCE_POINT_MB: u64 = 1;
    /// One resource point per this many relayed transactions.
    pub const RESOURCE_POINT_TX: u64 = 10;
    /// Micro-units per whole unit for stored reward amounts.
    pub const MICRO_PER_UNIT: f64 = 1_000_000.0;
}

/// The kind of work a PoRC task asks a wallet to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PorcTaskType {
    RelayTransactions,
    PropagateBlock,
    CacheData,
    VerifyPeers,
}

/// A unit of relay/propagation work assigned to an enrolled wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PorcTask {
    #[serde(rename = "type")]
    pub task_type: PorcTaskType,
    pub task_id: String,
    pub assigned_wallet: Address,
    pub timestamp: u64,
    /// Chain height when the task was issued.
    pub block_height: u64,
    pub estimated_bandwidth_mb: u64,
    pub estimated_transactions: u64,
}

impl PorcTask {
    pub fn content_hash(&self) -> String {
        sha256_hex(&format!(
            "{}{}{}{}{}{}",
            self.task_id,
            self.assigned_wallet,
            self.timestamp,
            self.block_height,
            self.estimated_bandwidth_mb,
            self.estimated_transactions
        ))
    }
}

/// A signed log of relay work, submitted by a wallet and accumulated
/// between reward ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PorcContribution {
    pub wallet_address: Address,
    pub task_id: String,
    pub timestamp: u64,
    pub block_height: u64,
    /// Megabytes relayed.
    pub bandwidth_used: u64,
    pub transactions_relayed: u64,
    pub uptime_seconds: u64,
    pub proof_hash: String,
    pub signature: String,
}

impl PorcContribution {
    pub fn content_hash(&self) -> String {
        sha256_hex(&format!(
            "{}{}{}{}{}{}{}{}",
            self.wallet_address,
            self.task_id,
            self.timestamp,
            self.block_height,
            self.bandwidth_used,
            self.transactions_relayed,
            self.uptime_seconds,
            self.proof_hash
        ))
    }

    /// Resource points earned by this contribution: one point per MB
    /// relayed plus one point per [`config::RESOURCE_POINT_TX`]
    /// transactions (integer division).
    pub fn resource_points(&self) -> u64 {
        self.bandwidth_used * config::RESOURCE_POINT_MB
            + self.transactions_relayed / config::RESOURCE_POINT_TX
    }
}

/// Per-wallet PoRC enrollment state. Created on first enroll and kept
/// across disable/re-enable cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PorcWalletStatus {
    pub address: Address,
    pub is_enabled: bool,
    pub total_resource_points: u64,
    /// Lifetime rewards in micro-units.
    pub total_rewards: u64,
    /// Unix timestamp of the last accepted contribution.
    pub last_contribution: u64,
    pub reputation_score: u64,
    /// Self-declared bandwidth budget in MB per day.
    pub bandwidth_limit: u64,
    pub is_early_adopter: bool,
    pub pool_index: u64,
}

impl PorcWalletStatus {
    pub fn new(address: impl Into<Address>) -> Self {
        PorcWalletStatus {
            address: address.into(),
            is_enabled: false,
            total_resource_points: 0,
            total_rewards: 0,
            last_contribution: 0,
            reputation_score: 0,
            bandwidth_limit: 50,
            is_early_adopter: false,
            pool_index: 0,
        }
    }
}

/// A group of enrolled wallets scheduled together for a fixed block
/// range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PorcPool {
    pub pool_index: u64,
    pub wallet_addresses: Vec<Address>,
    pub total_resource_points: u64,
    pub block_start: u64,
    pub block_end: u64,
    pub is_active: bool,
}

impl PorcPool {
    pub fn new(pool_index: u64) -> Self {
        PorcPool {
            pool_index,
            wallet_addresses: Vec::new(),
            total_resource_points: 0,
            block_start: 0,
            block_end: 0,
            is_active: false,
        }
    }

    pub fn add_wallet(&mut self, address: impl Into<Address>) {
        let address = address.into();
        if !self.contains_wallet(&address) {
            self.wallet_addresses.push(address);
        }
    }

    pub fn remove_wallet(&mut self, address: &str) {
        self.wallet_addresses.retain(|a| a != address);
    }

    pub fn contains_wallet(&self, address: &str) -> bool {
        self.wallet_addresses.iter().any(|a| a == address)
    }
}

/// Engine-wide running counters, exposed on the stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PorcStats {
    pub total_wallets: u64,
    pub active_wallets: u64,
    pub total_resource_points: u64,
    /// Lifetime distributed rewards in micro-units.
    pub total_rewards_distributed: u64,
    /// Lifetime burned value in micro-units.
    pub total_burned: u64,
    /// Budget of the most recent reward tick in micro-units.
    pub current_block_reward: u64,
    pub active_pools: u64,
    pub average_bandwidth: f64,
    pub average_uptime: f64,
}
