// nilotic-porc/src/error.rs

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PorcError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Wallet {address} is not eligible: {reason}")]
    NotEligible { address: String, reason: String },
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),
    #[error("Wallet not enabled: {0}")]
    WalletNotEnabled(String),
    #[error("Invalid contribution: {0}")]
    InvalidContribution(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for PorcError {
    fn from(err: rusqlite::Error) -> Self {
        PorcError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for PorcError {
    fn from(err: serde_json::Error) -> Self {
        PorcError::Serialization(err.to_string())
    }
}
