//! Shared data types for the Nilotic blockchain.
//!
//! This crate defines the entity model used by every other crate in the
//! workspace: transactions, blocks and the PoRC (Proof-of-Resource-
//! Contribution) records, together with their JSON wire forms.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod porc;

/// An account address. Wallet addresses are derived from a public key
/// and carry the `NIL` prefix; a handful of reserved values never have
/// a corresponding private key.
pub type Address = String;

/// Sentinel sender address for block-issued value (new supply or
/// reward payouts). No private key corresponds to it.
pub const COINBASE: &str = "COINBASE";

/// Recipient sentinel marking a smart-contract deployment.
pub const CONTRACT: &str = "CONTRACT";

/// Beneficiary of the genesis allocation.
pub const GENESIS: &str = "GENESIS";

/// Block index used to signal a failed or cancelled mining attempt.
pub const INVALID_BLOCK_INDEX: u64 = u64::MAX;

/// Returns the current Unix timestamp in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Computes the lowercase hex SHA-256 digest of a string preimage.
pub(crate) fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// A value transfer, contract deployment or offline-token transaction.
///
/// The content hash is a deterministic digest over the identifying
/// fields; the signature covers the content hash and is produced by
/// the wallet layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub sender: Address,
    pub recipient: Address,
    pub amount: f64,
    /// Creation time in Unix seconds.
    pub timestamp: u64,
    /// Content hash as stored; recomputed by validators.
    pub hash: String,
    pub signature: String,
    /// Odero SLW offline-token flag.
    pub is_offline: bool,
    /// Bytecode payload of a contract deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_state: Option<String>,
    /// Explicit fee; when absent the effective fee is derived from the
    /// amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<f64>,
}

impl Transaction {
    /// Creates a regular transfer stamped with the current time.
    pub fn new(sender: impl Into<Address>, recipient: impl Into<Address>, amount: f64) -> Self {
        let mut tx = Transaction {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            timestamp: unix_now(),
            hash: String::new(),
            signature: String::new(),
            is_offline: false,
            contract_code: None,
            contract_state: None,
            fee: None,
        };
        tx.hash = tx.content_hash();
        tx
    }

    /// Creates an offline (Odero SLW) transaction.
    pub fn new_offline(
        sender: impl Into<Address>,
        recipient: impl Into<Address>,
        amount: f64,
    ) -> Self {
        let mut tx = Transaction::new(sender, recipient, amount);
        tx.is_offline = true;
        tx.hash = tx.content_hash();
        tx
    }

    /// Creates a contract-deployment transaction. The recipient is the
    /// `CONTRACT` sentinel; the ledger synthesises the final contract
    /// address when the deployment is applied.
    pub fn contract_deploy(sender: impl Into<Address>, code: impl Into<String>) -> Self {
        let mut tx = Transaction {
            sender: sender.into(),
            recipient: CONTRACT.to_string(),
            amount: 0.0,
            timestamp: unix_now(),
            hash: String::new(),
            signature: String::new(),
            is_offline: false,
            contract_code: Some(code.into()),
            contract_state: None,
            fee: None,
        };
        tx.hash = tx.content_hash();
        tx
    }

    /// Recomputes the deterministic content hash over the identifying
    /// fields. The stored `hash` field is not trusted by validators.
    pub fn content_hash(&self) -> String {
        let mut preimage = format!(
            "{}{}{}{}",
            self.sender, self.recipient, self.amount, self.timestamp
        );
        if let Some(code) = &self.contract_code {
            if !code.is_empty() {
                preimage.push_str("CONTRACT:");
                preimage.push_str(code);
            }
        }
        preimage.push_str("OFFLINE:");
        preimage.push_str(if self.is_offline { "true" } else { "false" });
        sha256_hex(&preimage)
    }

    /// Effective fee: the explicit fee when set, otherwise
    /// `base_fee + amount * rate`.
    pub fn effective_fee(&self, base_fee: f64, rate: f64) -> f64 {
        self.fee.unwrap_or(base_fee + self.amount * rate)
    }

    pub fn is_coinbase(&self) -> bool {
        self.sender == COINBASE
    }

    /// True when the recipient is the contract sentinel and a payload
    /// is attached.
    pub fn is_contract_deploy(&self) -> bool {
        self.recipient == CONTRACT
            && self.contract_code.as_deref().map_or(false, |c| !c.is_empty())
    }

    /// Structural validity: non-empty sender, non-negative amount, a
    /// recipient unless the transaction is offline, and either a
    /// coinbase origin or a present signature. Cryptographic signature
    /// verification is performed by the wallet oracle where the
    /// sender's key is known.
    pub fn is_valid(&self) -> bool {
        if self.sender.is_empty() || self.amount < 0.0 {
            return false;
        }
        if !self.is_offline && self.recipient.is_empty() {
            return false;
        }
        if self.is_coinbase() {
            return true;
        }
        !self.signature.is_empty()
    }
}

/// A sealed unit of the chain.
///
/// For non-genesis blocks sealed by proof-of-work the hash carries the
/// difficulty prefix; validator-sealed blocks skip the work requirement
/// and record the validator address and signature instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub previous_hash: String,
    pub hash: String,
    pub nonce: u64,
    pub merkle_root: String,
    /// PoS validator address; empty for proof-of-work blocks.
    #[serde(default)]
    pub validator: String,
    /// Validator signature over the block; empty for PoW blocks.
    #[serde(default)]
    pub signature: String,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Drafts a new block on top of `previous_hash`. The merkle root
    /// and hash are computed for the (still empty) transaction list and
    /// must be recomputed after transactions are added.
    pub fn new(index: u64, previous_hash: impl Into<String>) -> Self {
        let mut block = Block {
            index,
            timestamp: unix_now(),
            previous_hash: previous_hash.into(),
            hash: String::new(),
            nonce: 0,
            merkle_root: String::new(),
            validator: String::new(),
            signature: String::new(),
            transactions: Vec::new(),
        };
        block.merkle_root = block.compute_merkle_root();
        block.hash = block.compute_hash();
        block
    }

    /// Sentinel block returned when mining is cancelled or exhausted.
    pub fn invalid() -> Self {
        Block {
            index: INVALID_BLOCK_INDEX,
            timestamp: 0,
            previous_hash: "0".to_string(),
            hash: String::new(),
            nonce: 0,
            merkle_root: "0".to_string(),
            validator: String::new(),
            signature: String::new(),
            transactions: Vec::new(),
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.index == INVALID_BLOCK_INDEX
    }

    /// Recomputes the block hash over (index, previous_hash, timestamp,
    /// merkle_root, nonce) plus the validator address when present.
    pub fn compute_hash(&self) -> String {
        let mut preimage = format!(
            "{}{}{}{}{}",
            self.index, self.previous_hash, self.timestamp, self.merkle_root, self.nonce
        );
        if !self.validator.is_empty() {
            preimage.push_str(&self.validator);
        }
        sha256_hex(&preimage)
    }

    /// Computes the Merkle root of the transaction content hashes,
    /// duplicating the last leaf when a level is odd. An empty list
    /// yields `"0"`.
    pub fn compute_merkle_root(&self) -> String {
        if self.transactions.is_empty() {
            return "0".to_string();
        }
        let mut level: Vec<String> = self
            .transactions
            .iter()
            .map(|tx| tx.content_hash())
            .collect();
        while level.len() > 1 {
            if level.len() % 2 != 0 {
                level.push(level.last().cloned().unwrap());
            }
            level = level
                .chunks(2)
                .map(|pair| sha256_hex(&format!("{}{}", pair[0], pair[1])))
                .collect();
        }
        level.pop().unwrap()
    }

    /// Appends a transaction after a structural validity check.
    pub fn add_transaction(&mut self, tx: Transaction) -> bool {
        if !tx.is_valid() {
            return false;
        }
        self.transactions.push(tx);
        true
    }

    /// Refreshes the merkle root and hash after the transaction list or
    /// nonce changed.
    pub fn seal(&mut self) {
        self.merkle_root = self.compute_merkle_root();
        self.hash = self.compute_hash();
    }

    /// True when `hash` carries at least `difficulty` leading `'0'` hex
    /// characters.
    pub fn meets_difficulty(&self, difficulty: u64) -> bool {
        let required = difficulty as usize;
        self.hash.len() >= required && self.hash.bytes().take(required).all(|b| b == b'0')
    }

    /// True when this block was sealed by a PoS validator.
    pub fn is_validator_sealed(&self) -> bool {
        !self.validator.is_empty()
    }

    /// Sum of the effective fees of all non-coinbase transactions.
    pub fn collected_fees(&self, base_fee: f64, rate: f64) -> f64 {
        self.transactions
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .map(|tx| tx.effective_fee(base_fee, rate))
            .sum()
    }
}
