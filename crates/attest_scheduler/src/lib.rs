#![forbid(unsafe_code)]
#![deny(
    warnings,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::result_large_err
)]

//! Per-source verification scheduling: admission control (requests per
//! second and in-flight cap), a FIFO queue, and a delay queue for retries.
//!
//! The scheduler is sans-IO. Every call receives the current time in ms and
//! returns a [`Step`]: verifications the host must start ([`Dispatch`]) and
//! attestations that reached a terminal status (moved out, now owned by
//! their round). The host reports each verification back with
//! [`SourceScheduler::complete`], quoting the dispatch's attempt number, and
//! calls [`SourceScheduler::on_wake`] once [`SourceScheduler::wake_at`] has
//! passed.

use std::collections::{HashMap, HashSet, VecDeque};

use attest_primitives::{
    ct_eq_hash, message_integrity_code, Attestation, AttestationId, AttestationRequest, SourceId,
    Verification, VerificationStatus,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

pub mod delay_queue;

pub use delay_queue::DelayQueue;

/// Liveness re-check interval when admission is blocked and nothing is in flight.
pub const HEARTBEAT_MS: u64 = 100;

/// Transient verifier failure; always retried while budget remains.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VerifierError {
    #[error("verifier transport error: {0}")]
    Transport(String),
    #[error("verifier timed out after {0} ms")]
    Timeout(u64),
    #[error("verifier system failure: {0}")]
    System(String),
}

/// Admission and retry limits of one source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceLimits {
    pub max_requests_per_second: u32,
    pub max_processing_transactions: usize,
    pub max_failed_retry: u32,
    pub delay_before_retry_ms: u64,
}

impl Default for SourceLimits {
    fn default() -> Self {
        Self {
            max_requests_per_second: 10,
            max_processing_transactions: 10,
            max_failed_retry: 3,
            delay_before_retry_ms: 100,
        }
    }
}

/// A verification the host must run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dispatch {
    pub attestation_id: AttestationId,
    /// Unique per scheduler; a completion must quote it back.
    pub attempt: u64,
    pub source_id: SourceId,
    pub request: AttestationRequest,
}

/// Outcome of one scheduler call.
#[derive(Debug, Default)]
pub struct Step {
    /// Terminal attestations, in the order they finished.
    pub finished: Vec<Attestation>,
    pub dispatches: Vec<Dispatch>,
}

impl Step {
    pub fn extend(&mut self, other: Self) {
        self.finished.extend(other.finished);
        self.dispatches.extend(other.dispatches);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.finished.is_empty() && self.dispatches.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub struct SchedulerStats {
    pub queued: usize,
    pub processing: usize,
    pub delayed: usize,
    pub requests_this_second: u32,
}

#[derive(Debug)]
struct InFlight {
    attempt: u64,
    attestation: Attestation,
}

#[derive(Debug)]
pub struct SourceScheduler {
    source_id: SourceId,
    limits: SourceLimits,
    last_second_mark: u64,
    requests_this_second: u32,
    queued: VecDeque<Attestation>,
    processing: HashMap<AttestationId, InFlight>,
    // Attempts pulled back by `delay` whose verifier call is still running.
    // They hold a processing slot until their completion arrives.
    abandoned: HashSet<u64>,
    next_attempt: u64,
    delayed: DelayQueue<Attestation>,
    // The single armed wake-up; re-arming replaces it.
    wake: Option<u64>,
}

impl SourceScheduler {
    #[must_use]
    pub fn new(source_id: SourceId, limits: SourceLimits) -> Self {
        Self {
            source_id,
            limits,
            last_second_mark: u64::MAX,
            requests_this_second: 0,
            queued: VecDeque::new(),
            processing: HashMap::new(),
            abandoned: HashSet::new(),
            next_attempt: 0,
            delayed: DelayQueue::new(),
            wake: None,
        }
    }

    #[must_use]
    pub const fn source_id(&self) -> SourceId {
        self.source_id
    }

    #[must_use]
    pub const fn limits(&self) -> &SourceLimits {
        &self.limits
    }

    /// Swap limits in place, e.g. after a configuration reload.
    pub fn set_limits(&mut self, limits: SourceLimits) {
        self.limits = limits;
    }

    /// Instant of the armed wake-up, if any.
    #[must_use]
    pub const fn wake_at(&self) -> Option<u64> {
        self.wake
    }

    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queued: self.queued.len(),
            processing: self.in_flight(),
            delayed: self.delayed.len(),
            requests_this_second: self.requests_this_second,
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queued.is_empty() && self.in_flight() == 0 && self.delayed.is_empty()
    }

    /// Verifier calls outstanding, including abandoned attempts.
    fn in_flight(&self) -> usize {
        self.processing.len() + self.abandoned.len()
    }

    fn has_pending(&self) -> bool {
        !self.queued.is_empty() || !self.delayed.is_empty()
    }

    /// Per-second quota check. A new wall-clock second always has quota.
    #[must_use]
    pub const fn can_add_request(&self, now_ms: u64) -> bool {
        let second = now_ms / 1000;
        if second != self.last_second_mark {
            return true;
        }
        self.requests_this_second < self.limits.max_requests_per_second
    }

    #[must_use]
    pub fn can_process(&self, now_ms: u64) -> bool {
        self.can_add_request(now_ms)
            && self.in_flight() < self.limits.max_processing_transactions
    }

    fn count_request(&mut self, now_ms: u64) {
        let second = now_ms / 1000;
        if second == self.last_second_mark {
            self.requests_this_second += 1;
        } else {
            self.last_second_mark = second;
            self.requests_this_second = 1;
        }
    }

    /// Admit `attestation` now if possible, otherwise queue it. Queued work
    /// keeps its FIFO precedence over new arrivals.
    pub fn submit(&mut self, attestation: Attestation, now_ms: u64) -> Step {
        let mut step = Step::default();
        if self.queued.is_empty() && self.can_process(now_ms) {
            self.begin_verification(attestation, now_ms, &mut step);
            self.rearm(now_ms);
        } else {
            debug!(source = %self.source_id, id = %attestation.id, queued = self.queued.len() + 1, "attestation queued");
            self.queued.push_back(attestation);
            self.start_next(now_ms, &mut step);
        }
        step
    }

    fn begin_verification(&mut self, mut attestation: Attestation, now_ms: u64, step: &mut Step) {
        if attestation.is_past_deadline(now_ms) {
            debug!(source = %self.source_id, id = %attestation.id, round = attestation.round_id, "too late to verify");
            attestation.mark_too_late(now_ms);
            step.finished.push(attestation);
            return;
        }
        self.count_request(now_ms);
        attestation.begin_processing(now_ms);
        let attempt = self.next_attempt;
        self.next_attempt += 1;
        step.dispatches.push(Dispatch {
            attestation_id: attestation.id,
            attempt,
            source_id: self.source_id,
            request: attestation.request.clone(),
        });
        self.processing.insert(attestation.id, InFlight { attempt, attestation });
    }

    /// Report the result of a dispatched verification.
    ///
    /// A completion for an attempt pulled back by [`Self::delay`] only frees
    /// its processing slot. Any other attempt that is not the current one of
    /// `id` is ignored, so every attestation finishes exactly once.
    pub fn complete(
        &mut self,
        id: AttestationId,
        attempt: u64,
        result: Result<Verification, VerifierError>,
        now_ms: u64,
    ) -> Step {
        let mut step = Step::default();
        if self.abandoned.remove(&attempt) {
            debug!(source = %self.source_id, id = %id, attempt, "late completion of a delayed attempt");
            self.start_next(now_ms, &mut step);
            return step;
        }
        if self.processing.get(&id).map(|f| f.attempt) != Some(attempt) {
            warn!(source = %self.source_id, id = %id, attempt, "completion for attempt not in flight");
            return step;
        }
        let Some(InFlight { mut attestation, .. }) = self.processing.remove(&id) else {
            return step;
        };

        if attestation.is_past_deadline(now_ms) {
            debug!(source = %self.source_id, id = %id, round = attestation.round_id, "verified after commit deadline");
            attestation.mark_too_late(now_ms);
            step.finished.push(attestation);
        } else {
            match result {
                Ok(verification) => {
                    Self::apply_verification(&mut attestation, verification, now_ms);
                    step.finished.push(attestation);
                }
                Err(err) => self.on_transient_failure(attestation, &err, now_ms, &mut step),
            }
        }

        self.start_next(now_ms, &mut step);
        step
    }

    fn apply_verification(attestation: &mut Attestation, verification: Verification, now_ms: u64) {
        match (verification.status, verification.response) {
            (VerificationStatus::Ok, Some(response)) => {
                let mic = message_integrity_code(&response);
                if ct_eq_hash(&mic, &attestation.request.message_integrity_code) {
                    attestation.mark_valid(response, now_ms);
                } else {
                    debug!(id = %attestation.id, "message integrity code mismatch");
                    attestation.mark_invalid(now_ms);
                }
            }
            (VerificationStatus::Ok, None) => {
                warn!(id = %attestation.id, "verifier returned OK without a response");
                attestation.mark_invalid(now_ms);
            }
            (VerificationStatus::SystemFailure, _) => {
                error!(id = %attestation.id, "verifier reported SYSTEM_FAILURE");
                attestation.mark_invalid(now_ms);
            }
            (status, _) => {
                debug!(id = %attestation.id, ?status, "attestation invalid");
                attestation.mark_invalid(now_ms);
            }
        }
    }

    fn on_transient_failure(
        &mut self,
        mut attestation: Attestation,
        err: &VerifierError,
        now_ms: u64,
        step: &mut Step,
    ) {
        if attestation.retry_count() >= self.limits.max_failed_retry {
            error!(source = %self.source_id, id = %attestation.id, retries = attestation.retry_count(), %err, "verification failed, retries exhausted");
            attestation.mark_invalid(now_ms);
            step.finished.push(attestation);
            return;
        }
        let start_ms = now_ms.saturating_add(self.limits.delay_before_retry_ms);
        if attestation.is_past_deadline(start_ms) {
            debug!(source = %self.source_id, id = %attestation.id, "retry would land after commit deadline");
            attestation.mark_too_late(now_ms);
            step.finished.push(attestation);
            return;
        }
        warn!(source = %self.source_id, id = %attestation.id, retry = attestation.retry_count(), %err, "verification error, retrying");
        attestation.requeue_for_retry(now_ms);
        self.delayed.push(attestation, start_ms);
    }

    /// Move attestation `id` from the FIFO queue or the in-flight set into the
    /// delay queue, to restart at `start_ms`. Pulling an in-flight attestation
    /// counts as a retry. Its running attempt keeps its processing slot until
    /// the completion arrives, and that completion is otherwise ignored.
    pub fn delay(&mut self, id: AttestationId, start_ms: u64, now_ms: u64) -> Step {
        let mut step = Step::default();
        let attestation = if let Some(pos) = self.queued.iter().position(|a| a.id == id) {
            self.queued.remove(pos)
        } else if let Some(InFlight { attempt, mut attestation }) = self.processing.remove(&id) {
            self.abandoned.insert(attempt);
            attestation.requeue_for_retry(now_ms);
            Some(attestation)
        } else {
            None
        };
        if let Some(a) = attestation {
            self.delayed.push(a, start_ms);
            // a due entry may start right away; otherwise this re-arms the timer
            self.start_next(now_ms, &mut step);
        }
        step
    }

    /// Armed wake-up fired.
    pub fn on_wake(&mut self, now_ms: u64) -> Step {
        let mut step = Step::default();
        self.wake = None;
        self.start_next(now_ms, &mut step);
        step
    }

    /// Admit due delayed work first, then FIFO work, while admission allows.
    fn start_next(&mut self, now_ms: u64, step: &mut Step) {
        while self.can_process(now_ms) {
            let Some(a) = self.delayed.pop_due(now_ms) else { break };
            self.begin_verification(a, now_ms, step);
        }
        while self.can_process(now_ms) {
            let Some(a) = self.queued.pop_front() else { break };
            self.begin_verification(a, now_ms, step);
        }
        self.rearm(now_ms);
    }

    fn rearm(&mut self, now_ms: u64) {
        // a head that is already due waits for capacity, not for a timer
        let mut at = self.delayed.peek_key().filter(|&k| k > now_ms);
        if !self.can_process(now_ms) && self.in_flight() == 0 && self.has_pending() {
            debug!(source = %self.source_id, "startNext heartbeat");
            let beat = now_ms + HEARTBEAT_MS;
            at = Some(at.map_or(beat, |k| k.min(beat)));
        }
        self.wake = at;
    }
}
