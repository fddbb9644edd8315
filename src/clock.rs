//! Deadlines for bounded waits.
//!
//! Built on `tokio::time::Instant` so that tests running on a paused runtime
//! clock see exact, deterministic elapsed times.

use std::time::Duration;

use tokio::time::Instant;

/// An absolute expiry derived from a budget. One per wait call.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            at: started + budget,
            budget,
        }
    }

    /// Budget left, saturating at zero. Never increases.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}
