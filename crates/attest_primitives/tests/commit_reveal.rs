use attest_primitives::{
    commitment_hash, keccak256, verify_reveal, xor256, Commitment, MerkleTree, ZERO_HASH,
};
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;

#[test]
fn masked_root_unmasks_to_committed_root() {
    let root = MerkleTree::build(&["tx100_0", "tx100_1"]).root();
    let mut rng = ChaCha20Rng::seed_from_u64(42);
    let c = Commitment::generate(root, &mut rng);

    assert_eq!(c.commitment_hash, keccak256(&c.random));
    assert_eq!(Commitment::unmask(&c.masked_root, &c.random), root);
    assert_eq!(verify_reveal(&c.commitment_hash, &c.masked_root, &c.random), Some(root));
}

#[test]
fn fresh_nonce_per_commitment() {
    let mut rng = ChaCha20Rng::seed_from_u64(1);
    let a = Commitment::generate(ZERO_HASH, &mut rng);
    let b = Commitment::generate(ZERO_HASH, &mut rng);
    assert_ne!(a.random, b.random);
    assert_ne!(a.masked_root, b.masked_root);
}

#[test]
fn empty_root_masks_to_random() {
    let random = [0x11u8; 32];
    let c = Commitment::new(ZERO_HASH, random);
    assert_eq!(c.masked_root, random);
    assert_eq!(c.commitment_hash, commitment_hash(&random));
    assert_eq!(xor256(&c.masked_root, &random), ZERO_HASH);
}
