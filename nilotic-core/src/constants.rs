/// Balance installed for the `GENESIS` account by block 0.
pub const GENESIS_ALLOCATION: f64 = 1000.0;

/// Flat component of the default transaction fee.
pub const BASE_FEE: f64 = 0.001;

/// Amount-proportional component of the default transaction fee.
pub const FEE_RATE: f64 = 0.0001;

/// Transfers at or below this amount qualify for instant confirmation.
pub const INSTANT_LIMIT: f64 = 10.0;

/// Maximum transactions selected into a block (standard profile).
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 10;

/// Maximum transactions per block in the improved-speed profile.
pub const IMPROVED_MAX_TRANSACTIONS_PER_BLOCK: usize = 50;

/// Maximum serialized block payload in bytes.
pub const MAX_BLOCK_SIZE: u64 = 1024 * 1024;

/// Block reward halves every this many blocks.
pub const HALVING_INTERVAL: u64 = 210_000;

/// Difficulty a fresh ledger starts at.
pub const DEFAULT_DIFFICULTY: u64 = 4;

/// Base block reward before halving.
pub const DEFAULT_MINING_REWARD: f64 = 100.0;

/// Fixed amount credited when an Odero SLW token is redeemed.
pub const ODERO_REDEMPTION_AMOUNT: f64 = 25.5;

/// Trailing window for the activity count used by PoRC eligibility.
pub const ACTIVITY_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;
