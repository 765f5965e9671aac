//! Keypair generation and signing for the Nilotic blockchain.

use crate::signature::derive_address;
use ed25519_dalek::{Keypair, PublicKey, Signer};
use rand::rngs::OsRng;

/// An Ed25519 key pair used by wallets and by tests exercising the
/// verify oracle.
pub struct NiloticKeyPair {
    keypair: Keypair,
}

impl NiloticKeyPair {
    /// Generates a new random key pair.
    pub fn generate() -> Self {
        let mut csprng = OsRng {};
        let keypair = Keypair::generate(&mut csprng);
        NiloticKeyPair { keypair }
    }

    /// Returns the public key of this key pair.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public
    }

    /// Hex encoding of the public key, the form carried in signed
    /// records.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.keypair.public.as_bytes())
    }

    /// Signs `message` and returns the hex-encoded signature.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.keypair.sign(message).to_bytes())
    }

    /// The wallet address derived from this key pair's public key.
    pub fn address(&self) -> String {
        derive_address(&self.public_key_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{Ed25519Verifier, SignatureVerifier};

    #[test]
    fn sign_and_verify_round_trip() {
        let keypair = NiloticKeyPair::generate();
        let signature = keypair.sign_hex(b"hello");
        assert_eq!(signature.len(), 128);
        assert!(Ed25519Verifier.verify(b"hello", &signature, &keypair.public_key_hex()));
    }

    #[test]
    fn address_is_stable_per_key() {
        let keypair = NiloticKeyPair::generate();
        assert_eq!(keypair.address(), keypair.address());
        assert!(keypair.address().starts_with("NIL"));
    }
}
