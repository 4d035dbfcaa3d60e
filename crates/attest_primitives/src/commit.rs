//! Commit-reveal masking of a round's Merkle root.
//!
//! At commit time an attester publishes `masked_root = root XOR random` and
//! `commitment_hash = keccak256(random)`. At reveal time it publishes
//! `random`; anyone can then check the hash and unmask the root.

use core::fmt;

use rand_core::{CryptoRng, RngCore};

use crate::{ct_eq_hash, keccak256, Hash256};

/// 256-bit XOR.
#[must_use]
pub fn xor256(a: &Hash256, b: &Hash256) -> Hash256 {
    let mut out = [0u8; 32];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
        *o = x ^ y;
    }
    out
}

/// `keccak256` of the 32-byte big-endian random.
#[must_use]
pub fn commitment_hash(random: &Hash256) -> Hash256 {
    keccak256(random)
}

/// Draw a fresh 256-bit nonce.
#[must_use]
pub fn random_nonce<R: RngCore + CryptoRng>(rng: &mut R) -> Hash256 {
    let mut out = [0u8; 32];
    rng.fill_bytes(&mut out);
    out
}

/// Recover the committed root from a reveal, or `None` if `revealed_random`
/// does not hash to `commitment_hash`.
#[must_use]
pub fn verify_reveal(
    commitment_hash_value: &Hash256,
    masked_root: &Hash256,
    revealed_random: &Hash256,
) -> Option<Hash256> {
    if ct_eq_hash(&commitment_hash(revealed_random), commitment_hash_value) {
        Some(xor256(masked_root, revealed_random))
    } else {
        None
    }
}

/// Commit-side state of one round. Written once, read-only afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct Commitment {
    pub merkle_root: Hash256,
    pub random: Hash256,
    pub masked_root: Hash256,
    pub commitment_hash: Hash256,
}

impl Commitment {
    #[must_use]
    pub fn new(merkle_root: Hash256, random: Hash256) -> Self {
        Self {
            merkle_root,
            masked_root: xor256(&merkle_root, &random),
            commitment_hash: commitment_hash(&random),
            random,
        }
    }

    /// Mask `merkle_root` with a nonce drawn from `rng`.
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(merkle_root: Hash256, rng: &mut R) -> Self {
        Self::new(merkle_root, random_nonce(rng))
    }

    #[must_use]
    pub fn unmask(masked_root: &Hash256, revealed_random: &Hash256) -> Hash256 {
        xor256(masked_root, revealed_random)
    }
}

// The random stays private until reveal; keep it out of logs.
impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commitment")
            .field("merkle_root", &crate::to_hex(&self.merkle_root))
            .field("masked_root", &crate::to_hex(&self.masked_root))
            .field("commitment_hash", &crate::to_hex(&self.commitment_hash))
            .finish_non_exhaustive()
    }
}
