//! Collaborators of the driver: chain verification and submission delivery.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use attest_primitives::{AttestationRequest, SourceId, Verification};
use attest_round::Submission;
use attest_scheduler::VerifierError;
use thiserror::Error;
use tracing::info;

/// Checks a request against chain data.
///
/// `Ok` carries a definite answer, never retried. `Err` is transient and
/// retried by the source scheduler within its budget.
#[async_trait]
pub trait Verifier: Send + Sync + 'static {
    async fn verify(
        &self,
        source: SourceId,
        request: &AttestationRequest,
    ) -> Result<Verification, VerifierError>;
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("submission rejected: {0}")]
    Rejected(String),
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Delivers commit and reveal submissions. Retry and finality handling
/// belong to the implementation.
#[async_trait]
pub trait SubmissionSink: Send + Sync + 'static {
    async fn submit(&self, submission: Submission) -> Result<(), SinkError>;
}

/// Sink that only records and logs submissions (dry runs, tests).
#[derive(Debug, Default)]
pub struct RecordingSink {
    submissions: Mutex<Vec<Submission>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.submissions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SubmissionSink for RecordingSink {
    async fn submit(&self, submission: Submission) -> Result<(), SinkError> {
        info!(
            round = submission.round_id,
            kind = ?submission.kind,
            buffer_index = submission.buffer_index,
            "[dry-run] submission"
        );
        self.submissions.lock().unwrap_or_else(PoisonError::into_inner).push(submission);
        Ok(())
    }
}
