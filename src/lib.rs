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

//! Attestation client.
//!
//! Routes chain events into time-boxed rounds, verifies them through
//! per-chain admission-controlled schedulers, and runs each round's
//! commit-reveal cycle over a deterministic Merkle root.
//
// Layers:
// - `attest_primitives`: hashing, Merkle, commit masks, attestation record
// - `attest_scheduler`: per-source admission, FIFO and retry delay queue
// - `attest_round`: round timing and state machine, submission encoding
// - this crate: sans-IO `RoundManager`, config, and the tokio driver

pub mod client;
pub mod clock;
pub mod config;
pub mod errors;
pub mod manager;
pub mod verifier;

pub use attest_primitives::{
    AttestationId, AttestationRequest, AttestationStatus, EventKey, Hash256, SourceId,
    Verification, VerificationStatus,
};
pub use attest_round::{Phase, RoundSchedule, Submission, SubmissionKind};
pub use attest_scheduler::{SourceLimits, VerifierError};
pub use client::{AttesterClient, ClientHandle};
pub use clock::{Clock, SystemClock, TokioClock};
pub use config::{AttesterConfig, SourceConfig};
pub use errors::ClientError;
pub use manager::{Advance, RoundManager};
pub use verifier::{RecordingSink, SinkError, SubmissionSink, Verifier};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
