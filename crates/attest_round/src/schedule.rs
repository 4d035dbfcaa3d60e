//! Round boundaries and phase instants. All values are ms since Unix epoch.
//!
//! ```text
//! round_id    = floor((t - first_round_start) / round_period)
//! round_end   = round_start + round_period
//! commit_at   = round_end + round_period - commit_time
//! reveal_at   = round_end + round_period + reveal_time
//! complete_at = round_end + round_period + 2 * reveal_time
//! ```

use attest_primitives::RoundId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSchedule {
    pub first_round_start_ms: u64,
    pub round_period_ms: u64,
    pub commit_time_ms: u64,
    pub reveal_time_ms: u64,
}

/// The three one-shot phase instants of a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundDeadlines {
    pub commit_at: u64,
    pub reveal_at: u64,
    pub complete_at: u64,
}

impl RoundSchedule {
    /// Round owning an event at `timestamp_ms`. `None` before the first
    /// round, for a zero period, or when the round's deadlines would not fit
    /// in a `u64`.
    #[must_use]
    pub fn round_id_for(&self, timestamp_ms: u64) -> Option<RoundId> {
        if timestamp_ms < self.first_round_start_ms || self.round_period_ms == 0 {
            return None;
        }
        let round_id = (timestamp_ms - self.first_round_start_ms) / self.round_period_ms;
        self.checked_deadlines(round_id).map(|_| round_id)
    }

    /// Deadlines of `round_id`, or `None` on overflow.
    #[must_use]
    pub fn checked_deadlines(&self, round_id: RoundId) -> Option<RoundDeadlines> {
        let round_end = round_id
            .checked_mul(self.round_period_ms)?
            .checked_add(self.first_round_start_ms)?
            .checked_add(self.round_period_ms)?;
        let next_end = round_end.checked_add(self.round_period_ms)?;
        Some(RoundDeadlines {
            commit_at: next_end.checked_sub(self.commit_time_ms)?,
            reveal_at: next_end.checked_add(self.reveal_time_ms)?,
            complete_at: next_end.checked_add(self.reveal_time_ms.checked_mul(2)?)?,
        })
    }

    // The accessors below saturate; rounds from `round_id_for` never reach
    // the bound.

    #[must_use]
    pub const fn round_start(&self, round_id: RoundId) -> u64 {
        self.first_round_start_ms.saturating_add(round_id.saturating_mul(self.round_period_ms))
    }

    #[must_use]
    pub const fn round_end(&self, round_id: RoundId) -> u64 {
        self.round_start(round_id).saturating_add(self.round_period_ms)
    }

    #[must_use]
    pub const fn commit_at(&self, round_id: RoundId) -> u64 {
        self.round_end(round_id)
            .saturating_add(self.round_period_ms)
            .saturating_sub(self.commit_time_ms)
    }

    #[must_use]
    pub const fn reveal_at(&self, round_id: RoundId) -> u64 {
        self.round_end(round_id)
            .saturating_add(self.round_period_ms)
            .saturating_add(self.reveal_time_ms)
    }

    #[must_use]
    pub const fn complete_at(&self, round_id: RoundId) -> u64 {
        self.round_end(round_id)
            .saturating_add(self.round_period_ms)
            .saturating_add(self.reveal_time_ms.saturating_mul(2))
    }

    #[must_use]
    pub const fn deadlines(&self, round_id: RoundId) -> RoundDeadlines {
        RoundDeadlines {
            commit_at: self.commit_at(round_id),
            reveal_at: self.reveal_at(round_id),
            complete_at: self.complete_at(round_id),
        }
    }
}
