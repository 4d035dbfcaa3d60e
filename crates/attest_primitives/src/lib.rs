#![forbid(unsafe_code)]
#![deny(
    warnings,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::result_large_err
)]

//! Attestation primitives: Keccak-256 hashing, sentinel-padded binary Merkle
//! trees, commit-reveal masking, and the attestation record shared by the
//! scheduler and round crates.
//
// Everything in this crate is consensus-relevant across independently run
// attesters. Two honest attesters that validate the same event set must
// reach byte-identical roots, masks and commitment hashes:
//
// - Hash: Keccak-256 (Solidity `keccak256`), plain concatenation, no framing
// - Merkle: odd rows padded with `keccak256("")`, never by duplication
// - Commit: `masked = root XOR random`, `commitment = keccak256(random)`

use sha3::{Digest, Keccak256};
use subtle::ConstantTimeEq;

/// 32-byte hash (Keccak-256 output). Also used for 256-bit protocol words.
pub type Hash256 = [u8; 32];

pub mod attestation;
pub mod commit;
pub mod constants;
pub mod merkle;

pub use attestation::{
    Attestation, AttestationId, AttestationRequest, AttestationStatus, EventKey, ParseSourceError,
    RoundId, SourceId, Verification, VerificationStatus,
};
pub use commit::{commitment_hash, random_nonce, verify_reveal, xor256, Commitment};
pub use constants::{MERKLE_SENTINEL, MIC_SALT, ZERO_HASH};
pub use merkle::{MerkleProof, MerkleTree};

/// Keccak-256 of a byte string.
#[must_use]
pub fn keccak256(input: &[u8]) -> Hash256 {
    let mut hasher = Keccak256::new();
    hasher.update(input);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Keccak-256 over the plain concatenation of `parts` (no length framing).
#[must_use]
pub fn keccak256_concat(parts: &[&[u8]]) -> Hash256 {
    let mut hasher = Keccak256::new();
    for p in parts {
        hasher.update(p);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Message integrity code a requester pre-declares for the response it expects:
/// `keccak256(response || MIC_SALT)`.
#[must_use]
pub fn message_integrity_code(response: &[u8]) -> Hash256 {
    keccak256_concat(&[response, MIC_SALT.as_bytes()])
}

/// Constant-time equality for two 32-byte hashes.
#[must_use]
pub fn ct_eq_hash(a: &Hash256, b: &Hash256) -> bool {
    a.ct_eq(b).into()
}

/// Lowercase `0x`-prefixed hex rendering for log fields.
#[must_use]
pub fn to_hex(h: &Hash256) -> String {
    format!("0x{}", hex::encode(h))
}
