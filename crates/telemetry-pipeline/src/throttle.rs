//! Log throttling for per-packet failure paths.

use std::time::{Duration, Instant};

/// Lets one message through per interval and counts the ones it holds back.
///
/// Packets arrive at ~60 Hz, so a sink that keeps failing would otherwise log
/// sixty identical warnings a second.
#[derive(Debug, Clone)]
pub struct LogThrottle {
    min_interval: Duration,
    last_emitted: Option<Instant>,
    suppressed_since_last: u64,
    suppressed_total: u64,
    emitted: u64,
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::per_second()
    }
}

impl LogThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emitted: None,
            suppressed_since_last: 0,
            suppressed_total: 0,
            emitted: 0,
        }
    }

    /// At most one message per second.
    pub fn per_second() -> Self {
        Self::new(Duration::from_secs(1))
    }

    /// Returns `Some(suppressed)` if a message may be logged now, where
    /// `suppressed` is the number of messages held back since the last one.
    pub fn check(&mut self) -> Option<u64> {
        self.check_at(Instant::now())
    }

    pub fn check_at(&mut self, now: Instant) -> Option<u64> {
        if let Some(last) = self.last_emitted
            && now.saturating_duration_since(last) < self.min_interval
        {
            self.suppressed_since_last = self.suppressed_since_last.saturating_add(1);
            self.suppressed_total = self.suppressed_total.saturating_add(1);
            return None;
        }

        self.last_emitted = Some(now);
        self.emitted = self.emitted.saturating_add(1);
        Some(std::mem::take(&mut self.suppressed_since_last))
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn suppressed_total(&self) -> u64 {
        self.suppressed_total
    }
}
