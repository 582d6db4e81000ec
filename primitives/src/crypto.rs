//! Cryptographic operations for the corevm execution layer.
//!
//! - Keccak-256 for code hashes, account addresses and log blooms
//! - RLP + Keccak-256 for contract-creation address derivation
//! - SHA-256 for transaction and block hashing
//! - BLAKE3 for the state commitment
//! - Ed25519 for transaction signatures
//!
//! All operations are deterministic with no randomization.

use crate::types::{Address, Hash};
use tiny_keccak::{Hasher, Keccak};

/// Compute the Keccak-256 hash of the input data.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Derive the address of a contract created by `creator` at `nonce`.
///
/// `keccak256(rlp([creator, nonce]))[12..]`. The same creator and nonce
/// always yield the same address.
pub fn create_address(creator: &Address, nonce: u64) -> Address {
    let mut stream = rlp::RlpStream::new_list(2);
    stream.append(&creator.to_vec());
    stream.append(&nonce);
    let hash = keccak256(&stream.out());

    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..]);
    addr
}

/// Derive an account address from an Ed25519 public key.
pub fn public_key_to_address(public_key: &[u8; 32]) -> Address {
    let hash = keccak256(public_key);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..]);
    addr
}

/// Compute BLAKE3 hash of the input data.
///
/// Used for the state commitment merkle tree.
pub fn hash_blake3(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Compute SHA-256 hash of the input data.
///
/// Used for transaction and block header hashing.
pub fn hash_sha256(data: &[u8]) -> Hash {
    use sha2::Digest;
    let result = sha2::Sha256::digest(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Verify an Ed25519 signature.
///
/// Returns `true` if the signature is valid for the given message and
/// public key, `false` otherwise.
pub fn verify_ed25519(message: &[u8], signature: &[u8; 64], public_key: &[u8; 32]) -> bool {
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let sig = Signature::from_bytes(signature);
    verifying_key.verify(message, &sig).is_ok()
}
