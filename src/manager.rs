//! Sans-IO round manager.
//!
//! Owns every round and every source scheduler. The host feeds it events,
//! verification results and the current time; it answers with the
//! verifications to start and the submissions to deliver. Nothing here
//! sleeps or performs I/O, so a test can drive whole rounds with a fake
//! clock.

use std::collections::{BTreeMap, HashMap};

use attest_primitives::{
    to_hex, Attestation, AttestationId, AttestationRequest, RoundId, SourceId, Verification,
};
use attest_round::{Round, RoundDeadlines, RoundSchedule, Submission};
use attest_scheduler::{DelayQueue, Dispatch, SourceLimits, SourceScheduler, Step, VerifierError};
use rand_core::{CryptoRng, RngCore};
use tracing::{debug, info, warn};

use crate::config::{AttesterConfig, DEFAULT_RETAIN_ROUNDS};
use crate::errors::ClientError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PhaseTimer {
    Commit(RoundId),
    Reveal(RoundId),
    Complete(RoundId),
}

/// Work produced by [`RoundManager::advance`].
#[derive(Debug, Default)]
pub struct Advance {
    pub dispatches: Vec<Dispatch>,
    pub submissions: Vec<Submission>,
}

impl Advance {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dispatches.is_empty() && self.submissions.is_empty()
    }
}

#[derive(Debug)]
pub struct RoundManager {
    schedule: RoundSchedule,
    limits: HashMap<SourceId, SourceLimits>,
    retain_rounds: usize,
    rounds: BTreeMap<RoundId, Round>,
    schedulers: HashMap<SourceId, SourceScheduler>,
    timers: DelayQueue<PhaseTimer>,
    next_id: u64,
}

impl RoundManager {
    #[must_use]
    pub fn new(schedule: RoundSchedule) -> Self {
        Self {
            schedule,
            limits: HashMap::new(),
            retain_rounds: DEFAULT_RETAIN_ROUNDS,
            rounds: BTreeMap::new(),
            schedulers: HashMap::new(),
            timers: DelayQueue::new(),
            next_id: 0,
        }
    }

    #[must_use]
    pub fn from_config(config: &AttesterConfig) -> Self {
        let mut manager = Self::new(config.round_schedule()).with_retain_rounds(config.retain_rounds);
        for s in &config.sources {
            manager.limits.insert(s.source, s.limits);
        }
        manager
    }

    #[must_use]
    pub fn with_limits(mut self, source: SourceId, limits: SourceLimits) -> Self {
        self.limits.insert(source, limits);
        self
    }

    #[must_use]
    pub const fn with_retain_rounds(mut self, retain_rounds: usize) -> Self {
        self.retain_rounds = retain_rounds;
        self
    }

    #[must_use]
    pub const fn schedule(&self) -> &RoundSchedule {
        &self.schedule
    }

    #[must_use]
    pub fn round(&self, round_id: RoundId) -> Option<&Round> {
        self.rounds.get(&round_id)
    }

    pub fn rounds(&self) -> impl Iterator<Item = &Round> {
        self.rounds.values()
    }

    #[must_use]
    pub fn scheduler(&self, source: SourceId) -> Option<&SourceScheduler> {
        self.schedulers.get(&source)
    }

    /// Admit a chain event: find or open its round, create the attestation
    /// and hand it to its source scheduler.
    pub fn route_event(
        &mut self,
        request: AttestationRequest,
        now_ms: u64,
    ) -> Result<Vec<Dispatch>, ClientError> {
        let timestamp_sec = request.timestamp_sec;
        let timestamp_ms = timestamp_sec
            .checked_mul(1000)
            .ok_or(ClientError::TimestampOutOfRange { timestamp_sec })?;
        if timestamp_ms < self.schedule.first_round_start_ms {
            return Err(ClientError::BeforeFirstRound { timestamp_sec });
        }
        let (round_id, deadlines) = self
            .schedule
            .round_id_for(timestamp_ms)
            .and_then(|id| self.schedule.checked_deadlines(id).map(|d| (id, d)))
            .ok_or(ClientError::TimestampOutOfRange { timestamp_sec })?;

        if !self.rounds.contains_key(&round_id) {
            if now_ms >= deadlines.complete_at {
                return Err(ClientError::RoundClosed { round_id });
            }
            self.open_round(round_id, deadlines);
        }
        let Some(round) = self.rounds.get_mut(&round_id) else {
            return Err(ClientError::RoundClosed { round_id });
        };
        if round.is_closed() {
            return Err(ClientError::RoundClosed { round_id });
        }

        let id = AttestationId(self.next_id);
        let source = request.source_id;
        let attestation = Attestation::new(id, round_id, request, deadlines.commit_at);
        if !round.add(&attestation) {
            return Err(ClientError::DuplicateAttestation {
                round_id,
                request_hash: to_hex(&attestation.request.request_hash()),
            });
        }
        self.next_id += 1;
        debug!(round = round_id, source = %source, id = %id, "attestation routed");

        let limits = self.limits.get(&source).copied().unwrap_or_default();
        let step = self
            .schedulers
            .entry(source)
            .or_insert_with(|| SourceScheduler::new(source, limits))
            .submit(attestation, now_ms);
        Ok(self.absorb(step))
    }

    fn open_round(&mut self, round_id: RoundId, deadlines: RoundDeadlines) {
        self.timers.push(PhaseTimer::Commit(round_id), deadlines.commit_at);
        self.timers.push(PhaseTimer::Reveal(round_id), deadlines.reveal_at);
        self.timers.push(PhaseTimer::Complete(round_id), deadlines.complete_at);
        self.rounds.insert(round_id, Round::new(round_id, deadlines));
        info!(
            round = round_id,
            commit_at = deadlines.commit_at,
            reveal_at = deadlines.reveal_at,
            complete_at = deadlines.complete_at,
            "round opened"
        );
    }

    /// Hand terminal attestations to their rounds; keep the dispatches.
    fn absorb(&mut self, step: Step) -> Vec<Dispatch> {
        for attestation in step.finished {
            let end = attestation.process_end_ms().unwrap_or_default();
            match self.rounds.get_mut(&attestation.round_id) {
                Some(round) => round.on_attestation_processed(attestation, end),
                None => {
                    debug!(round = attestation.round_id, id = %attestation.id, "round already pruned, dropping attestation");
                }
            }
        }
        step.dispatches
    }

    /// Report a verification started by an earlier [`Dispatch`], quoting
    /// its attempt number.
    pub fn on_verified(
        &mut self,
        source: SourceId,
        id: AttestationId,
        attempt: u64,
        result: Result<Verification, VerifierError>,
        now_ms: u64,
    ) -> Vec<Dispatch> {
        let Some(scheduler) = self.schedulers.get_mut(&source) else {
            warn!(source = %source, id = %id, "verification result for unknown source");
            return Vec::new();
        };
        let step = scheduler.complete(id, attempt, result, now_ms);
        self.absorb(step)
    }

    /// Park attestation `id` of `source` until `start_ms`.
    pub fn delay_attestation(
        &mut self,
        source: SourceId,
        id: AttestationId,
        start_ms: u64,
        now_ms: u64,
    ) -> Vec<Dispatch> {
        let Some(scheduler) = self.schedulers.get_mut(&source) else {
            return Vec::new();
        };
        let step = scheduler.delay(id, start_ms, now_ms);
        self.absorb(step)
    }

    /// Fire every scheduler wake-up and round timer due at `now_ms`, then
    /// prune closed rounds.
    pub fn advance<R: RngCore + CryptoRng>(&mut self, now_ms: u64, rng: &mut R) -> Advance {
        let mut out = Advance::default();

        let due: Vec<SourceId> = self
            .schedulers
            .iter()
            .filter(|(_, s)| s.wake_at().is_some_and(|at| at <= now_ms))
            .map(|(&id, _)| id)
            .collect();
        for source in due {
            if let Some(scheduler) = self.schedulers.get_mut(&source) {
                let step = scheduler.on_wake(now_ms);
                out.dispatches.extend(self.absorb(step));
            }
        }

        while let Some(timer) = self.timers.pop_due(now_ms) {
            self.fire(timer, rng, &mut out);
        }

        self.prune();
        out
    }

    fn fire<R: RngCore + CryptoRng>(&mut self, timer: PhaseTimer, rng: &mut R, out: &mut Advance) {
        let round_id = match timer {
            PhaseTimer::Commit(id) | PhaseTimer::Reveal(id) | PhaseTimer::Complete(id) => id,
        };
        let Some(round) = self.rounds.get_mut(&round_id) else {
            warn!(round = round_id, ?timer, "timer for unknown round");
            return;
        };
        match timer {
            PhaseTimer::Commit(_) => out.submissions.push(round.start_commit(rng)),
            PhaseTimer::Reveal(_) => {
                out.submissions.push(round.start_reveal());
                round.finish();
            }
            PhaseTimer::Complete(_) => round.complete(),
        }
    }

    /// Earliest instant at which [`Self::advance`] has work.
    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        self.schedulers
            .values()
            .filter_map(SourceScheduler::wake_at)
            .chain(self.timers.peek_key())
            .min()
    }

    /// Drop the oldest closed rounds beyond `retain_rounds`. Open rounds are
    /// never dropped. Returns how many rounds were removed.
    pub fn prune(&mut self) -> usize {
        let closed: Vec<RoundId> =
            self.rounds.values().filter(|r| r.is_closed()).map(Round::round_id).collect();
        let excess = closed.len().saturating_sub(self.retain_rounds);
        for id in &closed[..excess] {
            self.rounds.remove(id);
            debug!(round = *id, "round pruned");
        }
        excess
    }
}
