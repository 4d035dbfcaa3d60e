//! One attestation round: `Collect -> Commit -> Reveal -> Done`.
//!
//! The round owns every attestation of its window once that attestation is
//! terminal. Only `Valid` attestations handed over before `commit_at` become
//! Merkle leaves, ordered by [`EventKey`]; anything arriving later is kept
//! as `TooLate` for accounting.

use std::collections::{HashMap, HashSet};

use attest_primitives::{
    Attestation, AttestationId, AttestationStatus, Commitment, EventKey, Hash256, MerkleTree,
    RoundId, ZERO_HASH,
};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::schedule::RoundDeadlines;
use crate::submission::Submission;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Collect,
    Commit,
    Reveal,
    Done,
}

#[derive(Debug)]
pub struct Round {
    round_id: RoundId,
    deadlines: RoundDeadlines,
    phase: Phase,
    request_hashes: HashSet<Hash256>,
    pending: HashSet<AttestationId>,
    attestations: Vec<Attestation>,
    leaves: Vec<Vec<u8>>,
    merkle_root: Option<Hash256>,
    commitment: Option<Commitment>,
    closed: bool,
}

impl Round {
    #[must_use]
    pub fn new(round_id: RoundId, deadlines: RoundDeadlines) -> Self {
        Self {
            round_id,
            deadlines,
            phase: Phase::Collect,
            request_hashes: HashSet::new(),
            pending: HashSet::new(),
            attestations: Vec::new(),
            leaves: Vec::new(),
            merkle_root: None,
            commitment: None,
            closed: false,
        }
    }

    #[must_use]
    pub const fn round_id(&self) -> RoundId {
        self.round_id
    }

    #[must_use]
    pub const fn deadlines(&self) -> &RoundDeadlines {
        &self.deadlines
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// True once `complete_at` has fired; the round may then be pruned.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Record a request by its hash. `false` if the round already has it.
    pub fn register(&mut self, request_hash: Hash256) -> bool {
        self.request_hashes.insert(request_hash)
    }

    /// Announce an attestation that its scheduler now owns. Returns `false`
    /// for a duplicate request, which must then be dropped.
    pub fn add(&mut self, attestation: &Attestation) -> bool {
        assert_eq!(
            attestation.round_id, self.round_id,
            "attestation {} routed to round {}",
            attestation.id, self.round_id
        );
        if !self.register(attestation.request.request_hash()) {
            debug!(round = self.round_id, id = %attestation.id, "duplicate attestation");
            return false;
        }
        self.pending.insert(attestation.id);
        true
    }

    /// Take ownership of a terminal attestation. A `Valid` result arriving
    /// after commit is downgraded to `TooLate`.
    pub fn on_attestation_processed(&mut self, mut attestation: Attestation, now_ms: u64) {
        assert!(
            attestation.status().is_terminal(),
            "attestation {} handed to round {} while {:?}",
            attestation.id,
            self.round_id,
            attestation.status()
        );
        if !self.pending.remove(&attestation.id) {
            warn!(round = self.round_id, id = %attestation.id, "attestation was not announced to this round");
        }
        if self.phase != Phase::Collect && attestation.status() == AttestationStatus::Valid {
            debug!(round = self.round_id, id = %attestation.id, phase = ?self.phase, "valid after commit, excluded");
            attestation.mark_too_late(now_ms);
        }
        self.attestations.push(attestation);
    }

    /// `Collect -> Commit`: freeze the valid set, build the tree, mask the
    /// root with a fresh nonce and return the commit submission.
    pub fn start_commit<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Submission {
        assert_eq!(self.phase, Phase::Collect, "round {} committed twice", self.round_id);

        let mut valid: Vec<(&EventKey, &[u8])> = self
            .attestations
            .iter()
            .filter_map(|a| a.leaf_payload().map(|p| (&a.request.key, p)))
            .collect();
        valid.sort_by(|a, b| a.0.cmp(b.0));
        self.leaves = valid.into_iter().map(|(_, p)| p.to_vec()).collect();

        let tree = MerkleTree::build(&self.leaves);
        let root = tree.root();
        let commitment = Commitment::generate(root, rng);
        let submission = Submission::commit(self.round_id, &commitment);

        info!(
            round = self.round_id,
            leaves = self.leaves.len(),
            pending = self.pending.len(),
            root = %attest_primitives::to_hex(&root),
            "round commit"
        );
        self.merkle_root = Some(root);
        self.commitment = Some(commitment);
        self.phase = Phase::Commit;
        submission
    }

    /// `Commit -> Reveal`: return the reveal submission.
    pub fn start_reveal(&mut self) -> Submission {
        assert_eq!(self.phase, Phase::Commit, "round {} revealed out of order", self.round_id);
        let Some(commitment) = self.commitment.as_ref() else {
            unreachable!("committed round without commitment")
        };
        let submission = Submission::reveal(self.round_id, commitment);
        info!(round = self.round_id, "round reveal");
        self.phase = Phase::Reveal;
        submission
    }

    /// `Reveal -> Done`, once the reveal submission has been handed off.
    pub fn finish(&mut self) {
        assert_eq!(self.phase, Phase::Reveal, "round {} finished before reveal", self.round_id);
        self.phase = Phase::Done;
    }

    /// `complete_at` fired: no further submissions, eligible for pruning.
    pub fn complete(&mut self) {
        if self.phase != Phase::Done {
            warn!(round = self.round_id, phase = ?self.phase, "round closed before reveal finished");
        }
        self.closed = true;
        debug!(round = self.round_id, counts = ?self.counts(), "round closed");
    }

    /// Root committed to; [`ZERO_HASH`] for a committed round without leaves.
    #[must_use]
    pub const fn merkle_root(&self) -> Option<Hash256> {
        self.merkle_root
    }

    #[must_use]
    pub const fn commitment(&self) -> Option<&Commitment> {
        self.commitment.as_ref()
    }

    /// Leaf payloads in tree order, empty before commit.
    #[must_use]
    pub fn leaf_payloads(&self) -> &[Vec<u8>] {
        &self.leaves
    }

    #[must_use]
    pub fn attestations(&self) -> &[Attestation] {
        &self.attestations
    }

    /// Attestations announced but not yet terminal.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn count(&self, status: AttestationStatus) -> usize {
        self.attestations.iter().filter(|a| a.status() == status).count()
    }

    #[must_use]
    pub fn counts(&self) -> HashMap<AttestationStatus, usize> {
        let mut out = HashMap::new();
        for a in &self.attestations {
            *out.entry(a.status()).or_insert(0) += 1;
        }
        out
    }

    /// True if the committed root of this round is the empty-tree root.
    #[must_use]
    pub fn is_empty_commit(&self) -> bool {
        self.merkle_root == Some(ZERO_HASH)
    }
}
