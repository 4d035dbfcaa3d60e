//! Discrete-event harness for end-to-end round tests.
//!
//! Drives a [`RoundManager`] on a virtual millisecond clock. Verifications
//! are scripted per request payload: each attempt resolves after a fixed
//! latency with a scripted outcome. Nothing sleeps; `run_until` jumps from
//! one event to the next.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use attest_primitives::{
    message_integrity_code, AttestationId, AttestationRequest, EventKey, SourceId, Verification,
    VerificationStatus,
};
use attest_round::{RoundSchedule, Submission};
use attest_scheduler::{DelayQueue, Dispatch, SourceLimits, VerifierError};
use attestation_client::{ClientError, RoundManager};
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Result of one scripted verification attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// OK with this response.
    Respond(Vec<u8>),
    Fail(VerificationStatus),
    Transient,
}

#[derive(Clone, Debug)]
struct Script {
    latency_ms: u64,
    // one entry per attempt; the last repeats
    outcomes: Vec<Outcome>,
}

#[derive(Debug)]
struct Pending {
    source: SourceId,
    id: AttestationId,
    attempt: u64,
    payload: Vec<u8>,
}

pub struct Harness {
    manager: RoundManager,
    rng: ChaCha20Rng,
    now_ms: u64,
    scripts: HashMap<Vec<u8>, Script>,
    attempts: HashMap<Vec<u8>, usize>,
    pending: DelayQueue<Pending>,
    submissions: Vec<(u64, Submission)>,
    starts: Vec<(u64, AttestationId)>,
}

/// Request for `response`, with the integrity code the response must match.
#[must_use]
pub fn request(
    source: SourceId,
    timestamp_sec: u64,
    block_number: u64,
    transaction_index: u32,
    response: &str,
) -> AttestationRequest {
    AttestationRequest {
        source_id: source,
        timestamp_sec,
        key: EventKey { block_number, transaction_index, signature: Vec::new() },
        payload: format!("req:{response}").into_bytes(),
        message_integrity_code: message_integrity_code(response.as_bytes()),
    }
}

impl Harness {
    #[must_use]
    pub fn new(schedule: RoundSchedule, seed: u64) -> Self {
        Self {
            manager: RoundManager::new(schedule),
            rng: ChaCha20Rng::seed_from_u64(seed),
            now_ms: 0,
            scripts: HashMap::new(),
            attempts: HashMap::new(),
            pending: DelayQueue::new(),
            submissions: Vec::new(),
            starts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_limits(mut self, source: SourceId, limits: SourceLimits) -> Self {
        self.manager = self.manager.with_limits(source, limits);
        self
    }

    /// Script the verifier for `request`. Without a script a request
    /// resolves OK with its own payload after 1 ms (and fails the MIC check).
    pub fn script(&mut self, request: &AttestationRequest, latency_ms: u64, outcomes: Vec<Outcome>) {
        assert!(!outcomes.is_empty());
        self.scripts.insert(request.payload.clone(), Script { latency_ms, outcomes });
    }

    #[must_use]
    pub const fn now_ms(&self) -> u64 {
        self.now_ms
    }

    #[must_use]
    pub const fn manager(&self) -> &RoundManager {
        &self.manager
    }

    /// Submissions with the instant they were emitted.
    #[must_use]
    pub fn submissions(&self) -> &[(u64, Submission)] {
        &self.submissions
    }

    /// Every verification start, in order.
    #[must_use]
    pub fn starts(&self) -> &[(u64, AttestationId)] {
        &self.starts
    }

    pub fn route(&mut self, request: AttestationRequest) -> Result<(), ClientError> {
        let dispatches = self.manager.route_event(request, self.now_ms)?;
        self.launch(dispatches);
        Ok(())
    }

    fn launch(&mut self, dispatches: Vec<Dispatch>) {
        for d in dispatches {
            let latency = self.scripts.get(&d.request.payload).map_or(1, |s| s.latency_ms);
            self.starts.push((self.now_ms, d.attestation_id));
            self.pending.push(
                Pending {
                    source: d.source_id,
                    id: d.attestation_id,
                    attempt: d.attempt,
                    payload: d.request.payload,
                },
                self.now_ms + latency,
            );
        }
    }

    fn resolve(&mut self, payload: &[u8]) -> Result<Verification, VerifierError> {
        let attempt = self.attempts.entry(payload.to_vec()).or_insert(0);
        let n = *attempt;
        *attempt += 1;
        let Some(script) = self.scripts.get(payload) else {
            return Ok(Verification::ok(payload.to_vec()));
        };
        let outcome = script.outcomes.get(n).or_else(|| script.outcomes.last());
        match outcome {
            Some(Outcome::Respond(r)) => Ok(Verification::ok(r.clone())),
            Some(Outcome::Fail(status)) => Ok(Verification::failed(*status)),
            Some(Outcome::Transient) | None => Err(VerifierError::Transport("scripted".into())),
        }
    }

    /// Process every event up to and including `until_ms`.
    pub fn run_until(&mut self, until_ms: u64) {
        loop {
            let next = [self.pending.peek_key(), self.manager.next_deadline()]
                .into_iter()
                .flatten()
                .min();
            match next {
                Some(t) if t <= until_ms => self.now_ms = self.now_ms.max(t),
                _ => break,
            }
            while let Some(p) = self.pending.pop_due(self.now_ms) {
                let result = self.resolve(&p.payload);
                let dispatches = self.manager.on_verified(p.source, p.id, p.attempt, result, self.now_ms);
                self.launch(dispatches);
            }
            let advance = self.manager.advance(self.now_ms, &mut self.rng);
            self.launch(advance.dispatches);
            let now = self.now_ms;
            self.submissions.extend(advance.submissions.into_iter().map(|s| (now, s)));
        }
        self.now_ms = self.now_ms.max(until_ms);
    }
}
