//! JSON configuration of an attester.
//!
//! ```json
//! {
//!   "firstEpochStartTime": 1636070400,
//!   "roundDurationSec": 90,
//!   "commitTimeSec": 10,
//!   "revealTimeSec": 10,
//!   "sources": [
//!     { "source": "BTC", "maxRequestsPerSecond": 5, "delayBeforeRetryMs": 2000 }
//!   ]
//! }
//! ```
//!
//! Per-source limits that are not given take [`SourceLimits::default`].

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use attest_primitives::SourceId;
use attest_round::RoundSchedule;
use attest_scheduler::SourceLimits;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ClientError;

pub const DEFAULT_RETAIN_ROUNDS: usize = 10;
// keeps every ms instant of the first few thousand years of rounds inside u64
const MAX_CONFIG_SECONDS: u64 = 1 << 40;

const fn default_retain_rounds() -> usize {
    DEFAULT_RETAIN_ROUNDS
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttesterConfig {
    /// Label attached to the client's log span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(alias = "firstEpochStartTime")]
    pub first_round_start_sec: u64,
    #[serde(alias = "roundDurationSec")]
    pub round_period_sec: u64,
    /// Commit happens this long before the end of the round's commit window.
    pub commit_time_sec: u64,
    /// Reveal happens this long after the start of the round's reveal window.
    pub reveal_time_sec: u64,
    /// Closed rounds kept in memory before pruning.
    #[serde(default = "default_retain_rounds")]
    pub retain_rounds: usize,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub source: SourceId,
    #[serde(flatten)]
    pub limits: SourceLimits,
}

impl Default for AttesterConfig {
    fn default() -> Self {
        Self {
            label: None,
            first_round_start_sec: 1_636_070_400,
            round_period_sec: 90,
            commit_time_sec: 10,
            reveal_time_sec: 10,
            retain_rounds: DEFAULT_RETAIN_ROUNDS,
            sources: Vec::new(),
        }
    }
}

impl AttesterConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ClientError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        debug!("Loading attester config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| ClientError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn to_json_pretty(&self) -> Result<String, ClientError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        let invalid = |msg: String| Err(ClientError::ConfigInvalid(msg));
        let times = [
            self.first_round_start_sec,
            self.round_period_sec,
            self.commit_time_sec,
            self.reveal_time_sec,
        ];
        if times.iter().any(|&t| t > MAX_CONFIG_SECONDS) {
            return invalid(format!("timing values must not exceed {MAX_CONFIG_SECONDS}s"));
        }
        if self.round_period_sec == 0 {
            return invalid("roundPeriodSec must be positive".into());
        }
        if self.commit_time_sec == 0 || self.commit_time_sec >= self.round_period_sec {
            return invalid(format!(
                "commitTimeSec must be in 1..{} (got {})",
                self.round_period_sec, self.commit_time_sec
            ));
        }
        if self.reveal_time_sec == 0 {
            return invalid("revealTimeSec must be positive".into());
        }
        if self.retain_rounds == 0 {
            return invalid("retainRounds must be at least 1".into());
        }
        let mut seen = HashSet::new();
        for s in &self.sources {
            if !seen.insert(s.source) {
                return invalid(format!("source {} configured twice", s.source));
            }
            if s.limits.max_requests_per_second == 0 || s.limits.max_processing_transactions == 0 {
                return invalid(format!("source {} admits no requests", s.source));
            }
        }
        Ok(())
    }

    #[must_use]
    pub const fn round_schedule(&self) -> RoundSchedule {
        RoundSchedule {
            first_round_start_ms: self.first_round_start_sec * 1000,
            round_period_ms: self.round_period_sec * 1000,
            commit_time_ms: self.commit_time_sec * 1000,
            reveal_time_ms: self.reveal_time_sec * 1000,
        }
    }

    #[must_use]
    pub fn limits_for(&self, source: SourceId) -> SourceLimits {
        self.sources
            .iter()
            .find(|s| s.source == source)
            .map_or_else(SourceLimits::default, |s| s.limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
        "label": "attester-1",
        "firstEpochStartTime": 1636070400,
        "roundDurationSec": 90,
        "commitTimeSec": 10,
        "revealTimeSec": 5,
        "sources": [
            { "source": "BTC", "maxRequestsPerSecond": 2, "delayBeforeRetryMs": 2000 },
            { "source": "XRP", "maxProcessingTransactions": 4 }
        ]
    }"#;

    #[test]
    fn parses_original_field_names_and_partial_limits() {
        let c = AttesterConfig::from_json_str(JSON).unwrap();
        assert_eq!(c.retain_rounds, DEFAULT_RETAIN_ROUNDS);
        let btc = c.limits_for(SourceId::Btc);
        assert_eq!(btc.max_requests_per_second, 2);
        assert_eq!(btc.delay_before_retry_ms, 2_000);
        assert_eq!(btc.max_processing_transactions, 10);
        assert_eq!(c.limits_for(SourceId::Doge), SourceLimits::default());
        assert_eq!(c.round_schedule().round_period_ms, 90_000);
    }

    #[test]
    fn rejects_inconsistent_timing() {
        let bad = JSON.replace("\"commitTimeSec\": 10", "\"commitTimeSec\": 90");
        assert!(matches!(
            AttesterConfig::from_json_str(&bad),
            Err(ClientError::ConfigInvalid(_))
        ));
        assert!(matches!(
            AttesterConfig::from_json_str("{"),
            Err(ClientError::ConfigParse(_))
        ));
    }

    #[test]
    fn rejects_duplicate_sources() {
        let mut c = AttesterConfig::default();
        c.sources.push(SourceConfig { source: SourceId::Ltc, limits: SourceLimits::default() });
        c.sources.push(SourceConfig { source: SourceId::Ltc, limits: SourceLimits::default() });
        assert!(c.validate().is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AttesterConfig::load("/nonexistent/attester.json").unwrap_err();
        assert!(matches!(err, ClientError::ConfigIo { .. }));
    }

    #[test]
    fn pretty_json_round_trips() {
        let c = AttesterConfig::from_json_str(JSON).unwrap();
        let again = AttesterConfig::from_json_str(&c.to_json_pretty().unwrap()).unwrap();
        assert_eq!(again, c);
    }
}
