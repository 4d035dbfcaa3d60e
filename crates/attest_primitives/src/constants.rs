#![forbid(unsafe_code)]

use crate::Hash256;

/// All-zero word. Root of an empty tree and the blank fields of commit/reveal submissions.
pub const ZERO_HASH: Hash256 = [0u8; 32];

/// Pad element appended to an odd Merkle row: `keccak256("")`.
pub const MERKLE_SENTINEL: Hash256 = [
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0,
    0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
];

/// Salt appended to a response before hashing it into a message integrity code.
pub const MIC_SALT: &str = "Flare";

/// Offset between a round id and the buffer index it is committed under.
pub const BUFFER_INDEX_OFFSET: u64 = 1;
