// Advisory pick clock. Expiry is informational and never blocks a pick.

use std::time::Duration;

use tokio::time::Instant;

/// Seconds-remaining threshold at which the clock shows a warning.
pub const WARNING_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Running,
    Warning,
    Expired,
}

/// Countdown for the pick currently on the clock.
#[derive(Debug, Clone)]
pub struct PickClock {
    limit: Duration,
    started: Instant,
}

impl PickClock {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            started: Instant::now(),
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Restart the countdown at the full limit.
    pub fn reset(&mut self) {
        self.started = Instant::now();
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.started.elapsed())
    }

    /// Whole seconds remaining, rounded up so a fresh clock shows the limit.
    pub fn remaining_secs(&self) -> u64 {
        let rem = self.remaining();
        rem.as_secs() + u64::from(rem.subsec_nanos() > 0)
    }

    pub fn state(&self) -> ClockState {
        match self.remaining_secs() {
            0 => ClockState::Expired,
            s if s <= WARNING_SECS => ClockState::Warning,
            _ => ClockState::Running,
        }
    }
}
