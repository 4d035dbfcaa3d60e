use std::path::PathBuf;

use attest_primitives::RoundId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("event timestamp {timestamp_sec}s precedes the first round")]
    BeforeFirstRound { timestamp_sec: u64 },

    #[error("event timestamp {timestamp_sec}s is beyond the last schedulable round")]
    TimestampOutOfRange { timestamp_sec: u64 },

    #[error("round {round_id} is closed")]
    RoundClosed { round_id: RoundId },

    #[error("duplicate attestation {request_hash} in round {round_id}")]
    DuplicateAttestation { round_id: RoundId, request_hash: String },

    #[error("attester client has shut down")]
    ChannelClosed,
}
