//! Property-based tests for the attestation client

use attest_primitives::{
    message_integrity_code, verify_reveal, xor256, Attestation, AttestationId, AttestationRequest,
    AttestationStatus, Commitment, EventKey, MerkleTree, SourceId, Verification,
};
use attest_round::{Round, RoundSchedule, Submission};
use attest_scheduler::{SourceLimits, SourceScheduler, VerifierError};
use attestation_client::RoundManager;
use proptest::prelude::*;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;

const SCHEDULE: RoundSchedule = RoundSchedule {
    first_round_start_ms: 0,
    round_period_ms: 90_000,
    commit_time_ms: 10_000,
    reveal_time_ms: 5_000,
};

fn queued_attestation(id: u64, key: (u64, u32), response: &[u8]) -> Attestation {
    let request = AttestationRequest {
        source_id: SourceId::Btc,
        timestamp_sec: 0,
        key: EventKey { block_number: key.0, transaction_index: key.1, signature: vec![] },
        payload: id.to_be_bytes().to_vec(),
        message_integrity_code: message_integrity_code(response),
    };
    Attestation::new(AttestationId(id), 0, request, SCHEDULE.commit_at(0))
}

fn valid_attestation(id: u64, key: (u64, u32), response: Vec<u8>) -> Attestation {
    let mut a = queued_attestation(id, key, &response);
    a.begin_processing(0);
    a.mark_valid(response, 1);
    a
}

// Property test: the committed root depends only on the valid set, not on hand-over order
proptest! {
    #[test]
    fn committed_root_ignores_completion_order(
        keys in prop::collection::btree_set((0u64..50, 0u32..8), 1..24),
        seed in any::<u64>(),
    ) {
        let atts: Vec<Attestation> = keys
            .iter()
            .enumerate()
            .map(|(i, &k)| valid_attestation(i as u64, k, format!("{}:{}", k.0, k.1).into_bytes()))
            .collect();
        let mut shuffled = atts.clone();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        for i in (1..shuffled.len()).rev() {
            let j = (rand_chacha::rand_core::RngCore::next_u64(&mut rng) % (i as u64 + 1)) as usize;
            shuffled.swap(i, j);
        }

        let root_of = |list: &[Attestation]| {
            let mut round = Round::new(0, SCHEDULE.deadlines(0));
            for a in list {
                prop_assert!(round.add(a));
                round.on_attestation_processed(a.clone(), 2);
            }
            let _ = round.start_commit(&mut ChaCha20Rng::seed_from_u64(0));
            Ok(round.merkle_root().unwrap())
        };
        let sorted: Vec<String> = keys.iter().map(|k| format!("{}:{}", k.0, k.1)).collect();
        let expected = MerkleTree::build(&sorted).root();
        prop_assert_eq!(root_of(&atts)?, expected);
        prop_assert_eq!(root_of(&shuffled)?, expected);
    }
}

// Property test: masking is an involution and reveals verify against the commitment
proptest! {
    #[test]
    fn commit_reveal_round_trip(
        root in prop::array::uniform32(any::<u8>()),
        random in prop::array::uniform32(any::<u8>()),
        round_id in 0u64..1_000_000,
    ) {
        prop_assert_eq!(xor256(&xor256(&root, &random), &random), root);
        let c = Commitment::new(root, random);
        let commit = Submission::commit(round_id, &c);
        let reveal = Submission::reveal(round_id, &c);
        prop_assert_eq!(commit.buffer_index, round_id + 1);
        prop_assert_eq!(
            verify_reveal(&commit.commitment_hash, &commit.masked_root, &reveal.revealed_random),
            Some(root)
        );
    }
}

// Property test: every leaf of any tree proves against its root
proptest! {
    #[test]
    fn merkle_proofs_verify(payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 1..40)) {
        let tree = MerkleTree::build(&payloads);
        let root = tree.root();
        for (i, p) in payloads.iter().enumerate() {
            let proof = tree.proof(i).unwrap();
            prop_assert!(MerkleTree::verify_proof(&root, p, &proof));
        }
    }
}

#[derive(Clone, Debug)]
enum Op {
    Submit,
    CompleteOk,
    CompleteErr,
    Tick(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Submit),
        2 => Just(Op::CompleteOk),
        1 => Just(Op::CompleteErr),
        2 => (1u64..700).prop_map(Op::Tick),
    ]
}

// Property test: admission bounds hold under any interleaving of submits, completions and time
proptest! {
    #[test]
    fn admission_bounds_hold(
        ops in prop::collection::vec(op(), 1..200),
        rps in 1u32..6,
        concurrent in 1usize..5,
    ) {
        let limits = SourceLimits {
            max_requests_per_second: rps,
            max_processing_transactions: concurrent,
            max_failed_retry: 2,
            delay_before_retry_ms: 50,
        };
        let mut s = SourceScheduler::new(SourceId::Btc, limits);
        let mut now = 0u64;
        let mut next_id = 0u64;
        let mut in_flight: Vec<(AttestationId, u64)> = Vec::new();
        let mut starts: Vec<u64> = Vec::new();

        for op in ops {
            let step = match op {
                Op::Submit => {
                    next_id += 1;
                    s.submit(queued_attestation(next_id, (1, 0), b"r"), now)
                }
                Op::CompleteOk | Op::CompleteErr if in_flight.is_empty() => continue,
                Op::CompleteOk => {
                    let (id, attempt) = in_flight.remove(0);
                    s.complete(id, attempt, Ok(Verification::ok(b"r".to_vec())), now)
                }
                Op::CompleteErr => {
                    let (id, attempt) = in_flight.remove(0);
                    s.complete(id, attempt, Err(VerifierError::Timeout(1)), now)
                }
                Op::Tick(dt) => {
                    now += dt;
                    match s.wake_at() {
                        Some(at) if at <= now => s.on_wake(now),
                        _ => continue,
                    }
                }
            };
            for d in step.dispatches {
                in_flight.push((d.attestation_id, d.attempt));
                starts.push(now);
            }
            prop_assert!(s.stats().processing <= concurrent);
            prop_assert_eq!(s.stats().processing, in_flight.len());
        }

        let mut per_second = std::collections::HashMap::new();
        for t in starts {
            *per_second.entry(t / 1000).or_insert(0u32) += 1;
        }
        prop_assert!(per_second.values().all(|&n| n <= rps));
    }
}

// Property test: only transient failures means exactly max_failed_retry + 1 attempts
proptest! {
    #[test]
    fn retry_budget_is_exact(max_failed_retry in 0u32..6, delay in 1u64..500) {
        let limits = SourceLimits { max_failed_retry, delay_before_retry_ms: delay, ..SourceLimits::default() };
        let mut s = SourceScheduler::new(SourceId::Btc, limits);
        let mut now = 0;
        let mut current = s.submit(queued_attestation(1, (1, 0), b"r"), now).dispatches;
        let mut attempts = current.len();
        let finished = loop {
            now += 1;
            let step = s.complete(AttestationId(1), current[0].attempt, Err(VerifierError::Transport("x".into())), now);
            if let Some(a) = step.finished.into_iter().next() {
                break a;
            }
            now = s.wake_at().unwrap();
            current = s.on_wake(now).dispatches;
            attempts += current.len();
        };
        prop_assert_eq!(finished.status(), AttestationStatus::Invalid);
        prop_assert_eq!(attempts as u32, max_failed_retry + 1);
    }
}

// Property test: the manager's next deadline is never in the past after advancing
proptest! {
    #[test]
    fn next_deadline_is_in_the_future(ts in prop::collection::vec(0u64..400, 1..20), step in 1_000u64..60_000) {
        let mut m = RoundManager::new(SCHEDULE);
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        for (i, t) in ts.iter().enumerate() {
            let request = AttestationRequest {
                source_id: SourceId::Ltc,
                timestamp_sec: *t,
                key: EventKey { block_number: *t, transaction_index: 0, signature: vec![] },
                payload: (i as u64).to_be_bytes().to_vec(),
                message_integrity_code: [0u8; 32],
            };
            let _ = m.route_event(request, t * 1000);
        }
        let mut now = 0;
        while let Some(next) = m.next_deadline() {
            now = now.max(next).max(now + step);
            let _ = m.advance(now, &mut rng);
            if let Some(after) = m.next_deadline() {
                prop_assert!(after > now);
            }
        }
    }
}
