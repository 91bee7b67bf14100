use std::time::Duration;
use std::time::Instant;

/// Rolling crash counter of one socket's serving task.
///
/// Consecutive crashes are counted as long as each follows the previous one
/// within `reset_after`; a longer gap restarts the count at 1.
#[derive(Debug, Clone)]
pub(crate) struct CrashWindow {
    last_crash: Instant,
    consecutive: u32,
    reset_after: Duration,
    threshold: u32,
}

impl CrashWindow {
    /// `serving_since` stands in for the previous crash of a fresh server.
    pub(crate) fn new(serving_since: Instant, reset_after: Duration, threshold: u32) -> Self {
        Self {
            last_crash: serving_since,
            consecutive: 0,
            reset_after,
            threshold,
        }
    }

    /// Records a crash at `now` and reports whether the crash loop must be
    /// escalated.
    pub(crate) fn record(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_crash) > self.reset_after {
            self.consecutive = 1;
        } else {
            self.consecutive += 1;
        }
        self.last_crash = now;

        self.consecutive > self.threshold
    }

    pub(crate) fn consecutive(&self) -> u32 {
        self.consecutive
    }
}
