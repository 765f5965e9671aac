//! Odero SLW offline tokens.
//!
//! An Odero token is a bearer voucher for offline payments: issuance
//! records an offline transaction from the creator, and redemption is a
//! COINBASE-backed credit to the redeemer. Token ids carry the `OSLW`
//! prefix followed by 16 hex characters.

use crate::constants::ODERO_REDEMPTION_AMOUNT;
use crate::error::CoreError;
use log::debug;
use nilotic_crypto::sha256_hex;
use nilotic_shared_types::{unix_now, Transaction, COINBASE};
use serde::{Deserialize, Serialize};

const TOKEN_PREFIX: &str = "OSLW";
const TOKEN_ID_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OderoToken {
    pub token_id: String,
    pub amount: f64,
    pub creator: String,
    pub creation_time: u64,
}

impl OderoToken {
    /// Issues a new token for `creator`. The id is `OSLW` plus the
    /// first 16 hex characters of a digest over creator, amount and
    /// issue time.
    pub fn issue(creator: impl Into<String>, amount: f64) -> Self {
        let creator = creator.into();
        let now = unix_now();
        let digest = sha256_hex(format!("{}{}{}", creator, amount, now).as_bytes());
        OderoToken {
            token_id: format!("{}{}", TOKEN_PREFIX, &digest[..16]),
            amount,
            creator,
            creation_time: now,
        }
    }

    /// Token-format validity: correct prefix, fixed length, hex suffix,
    /// positive amount, non-empty creator.
    pub fn verify(&self) -> bool {
        is_valid_token_id(&self.token_id) && self.amount > 0.0 && !self.creator.is_empty()
    }

    /// The payload encoded into the token's QR code.
    pub fn qr_payload(&self) -> String {
        format!(
            "odero://{}?amount={}&creator={}",
            self.token_id, self.amount, self.creator
        )
    }

    pub fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "tokenId": self.token_id,
            "amount": self.amount,
            "creator": self.creator,
            "creationTime": self.creation_time,
        })
    }

    /// The offline transaction recording this token's issuance. The
    /// wallet layer signs it before admission.
    pub fn creation_transaction(&self) -> Transaction {
        Transaction::new_offline(self.creator.clone(), "", self.amount)
    }
}

/// Strips a duplicated `OSLW` prefix that some wallet exports produce.
pub fn normalize_token_id(token_id: &str) -> String {
    if let Some(pos) = token_id[TOKEN_PREFIX.len().min(token_id.len())..]
        .find(TOKEN_PREFIX)
        .map(|p| p + TOKEN_PREFIX.len())
    {
        debug!("corrected duplicated token id: {}", token_id);
        return token_id[..pos].to_string();
    }
    token_id.to_string()
}

pub fn is_valid_token_id(token_id: &str) -> bool {
    token_id.len() == TOKEN_ID_LEN
        && token_id.starts_with(TOKEN_PREFIX)
        && token_id[TOKEN_PREFIX.len()..]
            .bytes()
            .all(|b| b.is_ascii_hexdigit())
}

/// Builds the redemption transaction for a token: a COINBASE-backed
/// offline credit of the standard redemption amount.
pub fn redemption_transaction(redeemer: &str, token_id: &str) -> Result<Transaction, CoreError> {
    let token_id = normalize_token_id(token_id);
    if !token_id.starts_with(TOKEN_PREFIX) {
        return Err(CoreError::InvalidInput(format!(
            "invalid token id format: {}",
            token_id
        )));
    }
    if redeemer.is_empty() {
        return Err(CoreError::InvalidInput("redeemer address is empty".into()));
    }
    Ok(Transaction::new_offline(
        COINBASE,
        redeemer,
        ODERO_REDEMPTION_AMOUNT,
    ))
}
