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

//! Round timing, the per-round commit-reveal state machine, and the
//! submissions it emits.
//!
//! A round collects terminal attestations until `commit_at`, then freezes
//! its valid set, commits to the masked Merkle root, and reveals the mask at
//! `reveal_at`. Nothing in a round changes after it reaches [`Phase::Done`].

pub mod round;
pub mod schedule;
pub mod submission;

pub use round::{Phase, Round};
pub use schedule::{RoundDeadlines, RoundSchedule};
pub use submission::{CodecError, Submission, SubmissionKind, SUBMISSION_LEN};
