//! The attestation record: one verification request plus its outcome.
//!
//! Status moves `Queued -> Processing -> {Valid | Invalid | TooLate}` with one
//! permitted loop `Processing -> Queued` per retry. Every transition goes
//! through a method here; an illegal one is a programming error and panics.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{keccak256, Hash256};

/// Round index derived from an event timestamp.
pub type RoundId = u64;

/// External chain an attestation is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceId {
    Btc,
    Ltc,
    Doge,
    Xrp,
    Algo,
}

impl SourceId {
    pub const ALL: [Self; 5] = [Self::Btc, Self::Ltc, Self::Doge, Self::Xrp, Self::Algo];

    /// Stable numeric id used in request encodings.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Btc => 0,
            Self::Ltc => 1,
            Self::Doge => 2,
            Self::Xrp => 3,
            Self::Algo => 4,
        }
    }

    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Btc),
            1 => Some(Self::Ltc),
            2 => Some(Self::Doge),
            3 => Some(Self::Xrp),
            4 => Some(Self::Algo),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Btc => "BTC",
            Self::Ltc => "LTC",
            Self::Doge => "DOGE",
            Self::Xrp => "XRP",
            Self::Algo => "ALGO",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown source id: {0}")]
pub struct ParseSourceError(pub String);

impl FromStr for SourceId {
    type Err = ParseSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseSourceError(s.to_owned()))
    }
}

/// Position of the request event; the canonical leaf order of a round.
///
/// The derived `Ord` compares `block_number`, then `transaction_index`, then
/// `signature` bytes lexicographically. Field order is load-bearing.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub block_number: u64,
    pub transaction_index: u32,
    pub signature: Vec<u8>,
}

/// An attestation request as received from the request chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRequest {
    pub source_id: SourceId,
    /// Timestamp of the request event, seconds since Unix epoch.
    pub timestamp_sec: u64,
    pub key: EventKey,
    /// Opaque request bytes handed to the verifier.
    pub payload: Vec<u8>,
    /// Pre-declared hash the verified response must reproduce.
    pub message_integrity_code: Hash256,
}

impl AttestationRequest {
    /// Identity of the request for duplicate detection (event position is ignored).
    #[must_use]
    pub fn request_hash(&self) -> Hash256 {
        keccak256(&self.payload)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttestationId(pub u64);

impl fmt::Display for AttestationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttestationStatus {
    Queued,
    Processing,
    Valid,
    Invalid,
    TooLate,
}

impl AttestationStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Valid | Self::Invalid | Self::TooLate)
    }
}

/// Definite answer of a verifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Ok,
    NeedsRecheck,
    NotConfirmed,
    NonExistingTransaction,
    InvalidRequest,
    SystemFailure,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub status: VerificationStatus,
    /// Encoded response; the Merkle leaf payload when the attestation is valid.
    pub response: Option<Vec<u8>>,
}

impl Verification {
    #[must_use]
    pub const fn ok(response: Vec<u8>) -> Self {
        Self { status: VerificationStatus::Ok, response: Some(response) }
    }

    #[must_use]
    pub const fn failed(status: VerificationStatus) -> Self {
        Self { status, response: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attestation {
    pub id: AttestationId,
    pub round_id: RoundId,
    pub request: AttestationRequest,
    /// `commit_at` of the owning round, ms since Unix epoch.
    pub commit_deadline_ms: u64,
    status: AttestationStatus,
    retry_count: u32,
    process_start_ms: Option<u64>,
    process_end_ms: Option<u64>,
    verified: Option<Vec<u8>>,
}

impl Attestation {
    #[must_use]
    pub const fn new(
        id: AttestationId,
        round_id: RoundId,
        request: AttestationRequest,
        commit_deadline_ms: u64,
    ) -> Self {
        Self {
            id,
            round_id,
            request,
            commit_deadline_ms,
            status: AttestationStatus::Queued,
            retry_count: 0,
            process_start_ms: None,
            process_end_ms: None,
            verified: None,
        }
    }

    #[must_use]
    pub const fn status(&self) -> AttestationStatus {
        self.status
    }

    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[must_use]
    pub const fn process_start_ms(&self) -> Option<u64> {
        self.process_start_ms
    }

    #[must_use]
    pub const fn process_end_ms(&self) -> Option<u64> {
        self.process_end_ms
    }

    #[must_use]
    pub const fn source_id(&self) -> SourceId {
        self.request.source_id
    }

    /// True once `now` has reached the owning round's commit instant.
    #[must_use]
    pub const fn is_past_deadline(&self, now_ms: u64) -> bool {
        now_ms >= self.commit_deadline_ms
    }

    /// Verified response bytes, present iff the status is `Valid`.
    #[must_use]
    pub fn verified_response(&self) -> Option<&[u8]> {
        self.verified.as_deref()
    }

    /// Merkle leaf payload of a valid attestation.
    ///
    /// Panics if the attestation is `Valid` without a response: that would
    /// silently corrupt the round's leaf set.
    #[must_use]
    pub fn leaf_payload(&self) -> Option<&[u8]> {
        if self.status != AttestationStatus::Valid {
            return None;
        }
        assert!(
            self.verified.is_some(),
            "valid attestation {} has no verification result",
            self.id
        );
        self.verified.as_deref()
    }

    pub fn begin_processing(&mut self, now_ms: u64) {
        self.transition(AttestationStatus::Processing);
        self.process_start_ms = Some(now_ms);
    }

    /// `Processing -> Queued` ahead of a retry; counts the retry.
    pub fn requeue_for_retry(&mut self, now_ms: u64) {
        self.transition(AttestationStatus::Queued);
        self.retry_count += 1;
        self.process_end_ms = Some(now_ms);
    }

    pub fn mark_valid(&mut self, response: Vec<u8>, now_ms: u64) {
        self.transition(AttestationStatus::Valid);
        self.verified = Some(response);
        self.process_end_ms = Some(now_ms);
    }

    pub fn mark_invalid(&mut self, now_ms: u64) {
        self.transition(AttestationStatus::Invalid);
        self.process_end_ms = Some(now_ms);
    }

    /// Exclude from the round. Also downgrades a `Valid` result that reached
    /// its round only after commit.
    pub fn mark_too_late(&mut self, now_ms: u64) {
        self.transition(AttestationStatus::TooLate);
        self.verified = None;
        self.process_end_ms = Some(now_ms);
    }

    fn transition(&mut self, to: AttestationStatus) {
        use AttestationStatus::{Invalid, Processing, Queued, TooLate, Valid};
        let allowed = matches!(
            (self.status, to),
            (Queued, Processing | Invalid | TooLate)
                | (Processing, Queued | Valid | Invalid | TooLate)
                | (Valid, TooLate)
        );
        assert!(
            allowed,
            "illegal attestation transition {:?} -> {:?} for {}",
            self.status, to, self.id
        );
        self.status = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AttestationRequest {
        AttestationRequest {
            source_id: SourceId::Btc,
            timestamp_sec: 0,
            key: EventKey { block_number: 1, transaction_index: 0, signature: vec![] },
            payload: b"req".to_vec(),
            message_integrity_code: [0u8; 32],
        }
    }

    #[test]
    fn event_key_orders_by_block_then_index_then_signature() {
        let k = |b, i, s: &[u8]| EventKey {
            block_number: b,
            transaction_index: i,
            signature: s.to_vec(),
        };
        let mut keys = vec![k(101, 0, b"a"), k(100, 1, b"a"), k(100, 0, b"b"), k(100, 0, b"a")];
        keys.sort();
        assert_eq!(
            keys,
            vec![k(100, 0, b"a"), k(100, 0, b"b"), k(100, 1, b"a"), k(101, 0, b"a")]
        );
    }

    #[test]
    fn source_id_parses_case_insensitively() {
        assert_eq!("doge".parse::<SourceId>(), Ok(SourceId::Doge));
        assert_eq!(SourceId::from_code(SourceId::Algo.code()), Some(SourceId::Algo));
        assert!("ETH".parse::<SourceId>().is_err());
    }

    #[test]
    fn retry_cycle_then_valid() {
        let mut a = Attestation::new(AttestationId(1), 3, request(), 1_000);
        a.begin_processing(10);
        a.requeue_for_retry(20);
        a.begin_processing(30);
        a.mark_valid(b"resp".to_vec(), 40);
        assert_eq!(a.status(), AttestationStatus::Valid);
        assert_eq!(a.retry_count(), 1);
        assert_eq!(a.leaf_payload(), Some(b"resp".as_slice()));
        assert_eq!(a.process_start_ms(), Some(30));
        assert_eq!(a.process_end_ms(), Some(40));
    }

    #[test]
    fn late_valid_loses_its_leaf() {
        let mut a = Attestation::new(AttestationId(1), 3, request(), 1_000);
        a.begin_processing(10);
        a.mark_valid(b"resp".to_vec(), 20);
        a.mark_too_late(1_001);
        assert_eq!(a.leaf_payload(), None);
        assert!(a.is_past_deadline(1_000));
    }

    #[test]
    #[should_panic(expected = "illegal attestation transition")]
    fn terminal_is_final() {
        let mut a = Attestation::new(AttestationId(1), 3, request(), 1_000);
        a.begin_processing(10);
        a.mark_invalid(20);
        a.begin_processing(30);
    }
}
