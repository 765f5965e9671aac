// nilotic-core/src/error.rs

use thiserror::Error;

#[derive(Debug, PartialEq, Error, Clone)]
pub enum CoreError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Insufficient balance for {address}: required {required}, available {available}")]
    InsufficientBalance {
        address: String,
        required: f64,
        available: f64,
    },
    #[error("Transaction {0} already in mempool")]
    DuplicateTransaction(String),
    #[error("Block extends wrong tip: expected previous hash {expected}, got {actual}")]
    WrongTip { expected: String, actual: String },
    #[error("Block index out of sequence: expected {expected}, got {actual}")]
    WrongIndex { expected: u64, actual: u64 },
    #[error("Block hash does not meet difficulty {0}")]
    InvalidProofOfWork(u64),
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Not a registered validator: {0}")]
    NotAValidator(String),
    #[error("Chain integrity failure: {0}")]
    ChainIntegrity(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Persistence(err.to_string())
    }
}
