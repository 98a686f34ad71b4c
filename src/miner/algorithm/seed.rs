// src/miner/algorithm/seed.rs
//! Seed derivation from node work
//!
//! The solver is keyed by four 64-bit words obtained by hashing the job's
//! pre-proof-of-work header together with the attempt nonce.

use super::siphash::SipKeys;
use blake2::Blake2b;
use blake2::Digest;
use blake2::digest::consts::U32;

type Blake2b256 = Blake2b<U32>;

/// BLAKE2b with a 32-byte digest
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Blake2b256::digest(data));
    out
}

/// Derives the graph keys for one solving attempt
///
/// The nonce is appended to `pre_pow` big-endian, the concatenation is
/// hashed with BLAKE2b-256, and the digest is read as four little-endian
/// words.
pub fn derive_keys(pre_pow: &[u8], nonce: u64) -> SipKeys {
    let mut hasher = Blake2b256::new();
    hasher.update(pre_pow);
    hasher.update(nonce.to_be_bytes());
    let digest = hasher.finalize();

    let mut keys = [0u64; 4];
    for (key, chunk) in keys.iter_mut().zip(digest.chunks_exact(8)) {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        *key = u64::from_le_bytes(word);
    }
    keys
}
