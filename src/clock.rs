//! Millisecond wall clocks for the driver.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

pub trait Clock: Send + Sync + 'static {
    /// Milliseconds since Unix epoch.
    fn now_ms(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Wall-clock base advanced by tokio's monotonic clock. Under a paused tokio
/// runtime this is a virtual clock that only moves when time is advanced.
#[derive(Clone, Copy, Debug)]
pub struct TokioClock {
    base_ms: u64,
    origin: Instant,
}

impl TokioClock {
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(SystemClock.now_ms())
    }

    #[must_use]
    pub fn starting_at(base_ms: u64) -> Self {
        Self { base_ms, origin: Instant::now() }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.base_ms.saturating_add(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = TokioClock::starting_at(5_000);
        assert_eq!(clock.now_ms(), 5_000);
        tokio::time::advance(Duration::from_millis(1_250)).await;
        assert_eq!(clock.now_ms(), 6_250);
    }

    #[test]
    fn system_clock_is_after_2021() {
        assert!(SystemClock.now_ms() > 1_636_070_400_000);
    }
}
