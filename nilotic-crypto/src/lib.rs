//! Cryptographic primitives for the Nilotic blockchain: SHA-256
//! digests, the signature verify oracle and address derivation.

pub mod hash;
pub mod keypair;
pub mod signature;

pub use hash::sha256_hex;
pub use keypair::NiloticKeyPair;
pub use signature::{derive_address, Ed25519Verifier, SignatureVerifier};
