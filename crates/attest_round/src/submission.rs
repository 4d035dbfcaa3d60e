//! Commit and reveal submissions and their ABI word encoding.
//!
//! Wire layout (128 bytes, four big-endian 256-bit words):
//! `buffer_index || masked_root || commitment_hash || revealed_random`.
//! A commit carries a zero `revealed_random`; a reveal carries zero
//! `masked_root` and `commitment_hash`.

use attest_primitives::{Commitment, Hash256, RoundId, ZERO_HASH};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use attest_primitives::constants::BUFFER_INDEX_OFFSET;

pub const SUBMISSION_LEN: usize = 4 * 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionKind {
    Commit,
    Reveal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub kind: SubmissionKind,
    pub round_id: RoundId,
    pub buffer_index: u64,
    pub masked_root: Hash256,
    pub commitment_hash: Hash256,
    pub revealed_random: Hash256,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("short input")]
    Short,
    #[error("trailing")]
    Trailing,
    #[error("buffer index does not fit in u64")]
    BufferIndexOverflow,
    #[error("buffer index below first round")]
    BufferIndexUnderflow,
    #[error("submission sets both commit and reveal words")]
    Mixed,
}

impl Submission {
    #[must_use]
    pub const fn commit(round_id: RoundId, commitment: &Commitment) -> Self {
        Self {
            kind: SubmissionKind::Commit,
            round_id,
            buffer_index: round_id + BUFFER_INDEX_OFFSET,
            masked_root: commitment.masked_root,
            commitment_hash: commitment.commitment_hash,
            revealed_random: ZERO_HASH,
        }
    }

    #[must_use]
    pub const fn reveal(round_id: RoundId, commitment: &Commitment) -> Self {
        Self {
            kind: SubmissionKind::Reveal,
            round_id,
            buffer_index: round_id + BUFFER_INDEX_OFFSET,
            masked_root: ZERO_HASH,
            commitment_hash: ZERO_HASH,
            revealed_random: commitment.random,
        }
    }

    #[must_use]
    pub fn abi_encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SUBMISSION_LEN);
        let mut word = [0u8; 32];
        U256::from(self.buffer_index).to_big_endian(&mut word);
        out.extend_from_slice(&word);
        out.extend_from_slice(&self.masked_root);
        out.extend_from_slice(&self.commitment_hash);
        out.extend_from_slice(&self.revealed_random);
        out
    }

    /// Inverse of [`Self::abi_encode`]. The kind is inferred from which words
    /// are zero.
    pub fn abi_decode(mut src: &[u8]) -> Result<Self, CodecError> {
        let index_word = read_word(&mut src)?;
        let masked_root = read_word(&mut src)?;
        let commitment_hash = read_word(&mut src)?;
        let revealed_random = read_word(&mut src)?;
        if !src.is_empty() {
            return Err(CodecError::Trailing);
        }

        let index = U256::from_big_endian(&index_word);
        if index > U256::from(u64::MAX) {
            return Err(CodecError::BufferIndexOverflow);
        }
        let buffer_index = index.low_u64();
        let round_id = buffer_index
            .checked_sub(BUFFER_INDEX_OFFSET)
            .ok_or(CodecError::BufferIndexUnderflow)?;

        let commit_words = masked_root != ZERO_HASH || commitment_hash != ZERO_HASH;
        // all-zero words decode as a commit of an empty mask
        let kind = if revealed_random == ZERO_HASH {
            SubmissionKind::Commit
        } else if commit_words {
            return Err(CodecError::Mixed);
        } else {
            SubmissionKind::Reveal
        };
        Ok(Self { kind, round_id, buffer_index, masked_root, commitment_hash, revealed_random })
    }
}

fn read_word(src: &mut &[u8]) -> Result<Hash256, CodecError> {
    if src.len() < 32 {
        return Err(CodecError::Short);
    }
    let (head, rest) = src.split_at(32);
    *src = rest;
    let mut w = [0u8; 32];
    w.copy_from_slice(head);
    Ok(w)
}
