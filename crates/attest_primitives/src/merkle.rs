//! Binary Merkle tree over an ordered list of leaf payloads.
//!
//! Leaves are `keccak256(payload)` in the given order. Whenever a row holds
//! more than one node and its length is odd, [`MERKLE_SENTINEL`] is appended
//! before pairing; the last real node is never duplicated. Parents are
//! `keccak256(left || right)`. The tree is immutable once built.

use crate::constants::{MERKLE_SENTINEL, ZERO_HASH};
use crate::{ct_eq_hash, keccak256, keccak256_concat, Hash256};

/// Authentication path from a leaf to the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    /// Leaf index (0-based) in the ordered payload list.
    pub index: usize,
    /// Sibling hashes from leaf level up to, not including, the root.
    pub siblings: Vec<Hash256>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    // levels[0] = leaf hashes; each row with len > 1 is padded to even length.
    levels: Vec<Vec<Hash256>>,
    leaf_count: usize,
}

#[inline]
#[must_use]
pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    keccak256_concat(&[left, right])
}

impl MerkleTree {
    /// Build the tree over `payloads`, which must already be in canonical order.
    #[must_use]
    pub fn build<P: AsRef<[u8]>>(payloads: &[P]) -> Self {
        let leaves: Vec<Hash256> = payloads.iter().map(|p| keccak256(p.as_ref())).collect();
        Self::from_leaf_hashes(leaves)
    }

    /// Build the tree over leaf hashes that were computed elsewhere.
    #[must_use]
    pub fn from_leaf_hashes(leaves: Vec<Hash256>) -> Self {
        let leaf_count = leaves.len();
        let mut levels: Vec<Vec<Hash256>> = Vec::new();
        let mut row = leaves;
        while row.len() > 1 {
            if row.len() % 2 == 1 {
                row.push(MERKLE_SENTINEL);
            }
            let next: Vec<Hash256> = row
                .chunks_exact(2)
                .map(|pair| node_hash(&pair[0], &pair[1]))
                .collect();
            levels.push(row);
            row = next;
        }
        levels.push(row);
        Self { levels, leaf_count }
    }

    /// Root of the tree; [`ZERO_HASH`] when there are no leaves.
    #[must_use]
    pub fn root(&self) -> Hash256 {
        self.levels
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or(ZERO_HASH)
    }

    #[must_use]
    pub const fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Hash of the `i`-th real leaf.
    #[must_use]
    pub fn leaf(&self, i: usize) -> Option<Hash256> {
        if i >= self.leaf_count {
            return None;
        }
        self.levels.first().map(|l| l[i])
    }

    /// All rows from leaves to root, sentinel padding included.
    #[must_use]
    pub fn levels(&self) -> &[Vec<Hash256>] {
        &self.levels
    }

    /// Authentication path for leaf `index`.
    #[must_use]
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count {
            return None;
        }
        let mut siblings = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut pos = index;
        for row in &self.levels[..self.levels.len() - 1] {
            siblings.push(row[pos ^ 1]);
            pos >>= 1;
        }
        Some(MerkleProof { index, siblings })
    }

    /// Check a payload against `root` along `proof`.
    #[must_use]
    pub fn verify_proof(root: &Hash256, payload: &[u8], proof: &MerkleProof) -> bool {
        let mut h = keccak256(payload);
        let mut idx = proof.index;
        for sib in &proof.siblings {
            h = if idx & 1 == 0 {
                node_hash(&h, sib)
            } else {
                node_hash(sib, &h)
            };
            idx >>= 1;
        }
        ct_eq_hash(root, &h)
    }
}
