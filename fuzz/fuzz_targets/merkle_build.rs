#![no_main]

use attest_primitives::MerkleTree;
use libfuzzer_sys::fuzz_target;

// Split the input on 0xff into leaf payloads; every leaf must prove.
fuzz_target!(|data: &[u8]| {
    let leaves: Vec<&[u8]> = data.split(|&b| b == 0xff).take(256).collect();
    let tree = MerkleTree::build(&leaves);
    let root = tree.root();
    for (i, leaf) in leaves.iter().enumerate() {
        let proof = tree.proof(i).expect("proof for real leaf");
        assert!(MerkleTree::verify_proof(&root, leaf, &proof));
    }
});
