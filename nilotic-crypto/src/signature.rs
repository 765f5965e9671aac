//! Signature verification oracle and address derivation.
//!
//! The core treats signing as an external ceremony: everything that
//! needs to check a signature goes through [`SignatureVerifier`], a
//! pure oracle over `(message, signature, public key)`. The shipped
//! implementation wraps Ed25519; the historical deployment used
//! RSA-SHA256, and either satisfies the oracle contract.

use crate::hash::sha256_hex;
use ed25519_dalek::{PublicKey, Signature, Verifier};
use log::debug;

/// Pure verification oracle: given a message, a hex-encoded signature
/// and a hex-encoded public key, decide whether the signature is valid.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, message: &[u8], signature_hex: &str, public_key_hex: &str) -> bool;
}

/// Ed25519 implementation of the verify oracle.
#[derive(Debug, Default, Clone)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, message: &[u8], signature_hex: &str, public_key_hex: &str) -> bool {
        let key_bytes = match hex::decode(public_key_hex) {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!("signature verify: public key is not valid hex");
                return false;
            }
        };
        let sig_bytes = match hex::decode(signature_hex) {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!("signature verify: signature is not valid hex");
                return false;
            }
        };
        let public_key = match PublicKey::from_bytes(&key_bytes) {
            Ok(key) => key,
            Err(_) => return false,
        };
        let signature = match Signature::from_bytes(&sig_bytes) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        public_key.verify(message, &signature).is_ok()
    }
}

/// Derives a wallet address from a public key encoding: `"NIL"`
/// followed by the first 34 hex characters of the SHA-256 digest of
/// the encoded key.
pub fn derive_address(public_key_encoding: &str) -> String {
    let digest = sha256_hex(public_key_encoding.as_bytes());
    format!("NIL{}", &digest[..34])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::NiloticKeyPair;

    #[test]
    fn address_has_nil_prefix_and_fixed_length() {
        let address = derive_address("some-public-key-encoding");
        assert!(address.starts_with("NIL"));
        assert_eq!(address.len(), 3 + 34);
        // Deterministic.
        assert_eq!(address, derive_address("some-public-key-encoding"));
        assert_ne!(address, derive_address("another-public-key"));
    }

    #[test]
    fn oracle_accepts_valid_signature() {
        let keypair = NiloticKeyPair::generate();
        let message = b"transfer 5 NIL";
        let signature = keypair.sign_hex(message);
        let verifier = Ed25519Verifier;
        assert!(verifier.verify(message, &signature, &keypair.public_key_hex()));
    }

    #[test]
    fn oracle_rejects_tampered_message() {
        let keypair = NiloticKeyPair::generate();
        let signature = keypair.sign_hex(b"transfer 5 NIL");
        let verifier = Ed25519Verifier;
        assert!(!verifier.verify(b"transfer 500 NIL", &signature, &keypair.public_key_hex()));
    }

    #[test]
    fn oracle_rejects_garbage_inputs() {
        let verifier = Ed25519Verifier;
        assert!(!verifier.verify(b"msg", "zz-not-hex", "00"));
        assert!(!verifier.verify(b"msg", "00", "zz-not-hex"));
        assert!(!verifier.verify(b"msg", "", ""));
    }

    #[test]
    fn oracle_rejects_wrong_key() {
        let signer = NiloticKeyPair::generate();
        let other = NiloticKeyPair::generate();
        let signature = signer.sign_hex(b"msg");
        let verifier = Ed25519Verifier;
        assert!(!verifier.verify(b"msg", &signature, &other.public_key_hex()));
    }
}
