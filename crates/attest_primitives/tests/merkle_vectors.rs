use attest_primitives::{keccak256, keccak256_concat, MerkleTree, MERKLE_SENTINEL, ZERO_HASH};

fn h(s: &str) -> [u8; 32] {
    keccak256(s.as_bytes())
}

fn pair(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    keccak256_concat(&[a, b])
}

#[test]
fn single_leaf_root_is_leaf_hash() {
    assert_eq!(MerkleTree::build(&["a"]).root(), h("a"));
}

#[test]
fn two_leaves_hash_pairwise() {
    assert_eq!(MerkleTree::build(&["a", "b"]).root(), pair(&h("a"), &h("b")));
}

#[test]
fn odd_row_pads_with_sentinel_not_duplicate() {
    let root = MerkleTree::build(&["a", "b", "c"]).root();
    let expected = pair(&pair(&h("a"), &h("b")), &pair(&h("c"), &MERKLE_SENTINEL));
    assert_eq!(root, expected);
    let duplicated = pair(&pair(&h("a"), &h("b")), &pair(&h("c"), &h("c")));
    assert_ne!(root, duplicated);
}

#[test]
fn upper_odd_row_is_padded_too() {
    // 5 leaves -> 3 pairs -> odd row of 3 at level 1
    let leaves = ["a", "b", "c", "d", "e"];
    let l1 = [
        pair(&h("a"), &h("b")),
        pair(&h("c"), &h("d")),
        pair(&h("e"), &MERKLE_SENTINEL),
    ];
    let l2 = [pair(&l1[0], &l1[1]), pair(&l1[2], &MERKLE_SENTINEL)];
    assert_eq!(MerkleTree::build(&leaves).root(), pair(&l2[0], &l2[1]));
}

#[test]
fn order_matters_and_empty_is_zero() {
    assert_ne!(
        MerkleTree::build(&["a", "b"]).root(),
        MerkleTree::build(&["b", "a"]).root()
    );
    assert_eq!(MerkleTree::build::<&str>(&[]).root(), ZERO_HASH);
}

#[test]
fn sentinel_sibling_shows_up_in_proofs() {
    let t = MerkleTree::build(&["a", "b", "c"]);
    let proof = t.proof(2).expect("leaf 2");
    assert_eq!(proof.siblings[0], MERKLE_SENTINEL);
    assert!(MerkleTree::verify_proof(&t.root(), b"c", &proof));
}
