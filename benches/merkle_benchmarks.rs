use attest_primitives::{
    message_integrity_code, Attestation, AttestationId, AttestationRequest, Commitment, EventKey,
    MerkleTree, SourceId,
};
use attest_round::{Round, RoundSchedule};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;

const SCHEDULE: RoundSchedule = RoundSchedule {
    first_round_start_ms: 0,
    round_period_ms: 90_000,
    commit_time_ms: 10_000,
    reveal_time_ms: 5_000,
};

fn payloads(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| format!("response-{i:08}").into_bytes()).collect()
}

fn bench_merkle_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("merkle_build");
    for n in [1usize, 17, 256, 4096] {
        let leaves = payloads(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &leaves, |b, leaves| {
            b.iter(|| MerkleTree::build(black_box(leaves)).root());
        });
    }
    group.finish();
}

fn bench_merkle_proof(c: &mut Criterion) {
    let leaves = payloads(4096);
    let tree = MerkleTree::build(&leaves);
    let root = tree.root();
    let proof = tree.proof(1234).unwrap();

    c.bench_function("merkle_verify_proof", |b| {
        b.iter(|| {
            MerkleTree::verify_proof(black_box(&root), black_box(&leaves[1234]), black_box(&proof))
        });
    });
}

fn bench_round_commit(c: &mut Criterion) {
    let attestations: Vec<Attestation> = payloads(1024)
        .into_iter()
        .enumerate()
        .rev()
        .map(|(i, response)| {
            let request = AttestationRequest {
                source_id: SourceId::Btc,
                timestamp_sec: 0,
                key: EventKey {
                    block_number: (i / 16) as u64,
                    transaction_index: (i % 16) as u32,
                    signature: Vec::new(),
                },
                payload: (i as u64).to_be_bytes().to_vec(),
                message_integrity_code: message_integrity_code(&response),
            };
            let mut a = Attestation::new(AttestationId(i as u64), 0, request, SCHEDULE.commit_at(0));
            a.begin_processing(0);
            a.mark_valid(response, 1);
            a
        })
        .collect();

    c.bench_function("round_commit_1024", |b| {
        b.iter(|| {
            let mut round = Round::new(0, SCHEDULE.deadlines(0));
            for a in &attestations {
                round.add(a);
                round.on_attestation_processed(a.clone(), 2);
            }
            round.start_commit(&mut ChaCha20Rng::seed_from_u64(0))
        });
    });
}

fn bench_commitment(c: &mut Criterion) {
    let root = [7u8; 32];
    let mut rng = ChaCha20Rng::seed_from_u64(1);
    c.bench_function("commitment_generate", |b| {
        b.iter(|| Commitment::generate(black_box(root), &mut rng));
    });
}

criterion_group!(
    benches,
    bench_merkle_build,
    bench_merkle_proof,
    bench_round_commit,
    bench_commitment
);
criterion_main!(benches);
