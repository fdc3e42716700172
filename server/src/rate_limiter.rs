//! Per-connection fixed-window frame counter.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    window_ms: u64,
    threshold: u32,
    window_start: u64,
    count: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, threshold: u32, now: u64) -> Self {
        Self {
            window_ms: window.as_millis() as u64,
            threshold,
            window_start: now,
            count: 0,
        }
    }

    /// Counts one inbound frame and reports whether it may be dispatched.
    ///
    /// The window restarts once more than `window` has elapsed since it
    /// opened. Frames past the threshold within a window are refused.
    pub fn admit(&mut self, now: u64) -> bool {
        if now.saturating_sub(self.window_start) > self.window_ms {
            self.count = 0;
            self.window_start = now;
        }
        self.count = self.count.saturating_add(1);
        self.count <= self.threshold
    }
}

#[cfg(test)]
impl RateLimiter {
    fn count(&self) -> u32 {
        self.count
    }
}
