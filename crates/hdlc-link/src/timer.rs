//! Monotonic deadline timer. Replaces the SIGALRM-driven retransmission
//! timer of the original implementation with a deadline checked inside the
//! read loop, per the design notes: deterministic, no reentrancy hazards.

use std::time::{Duration, Instant};

pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    pub fn new() -> Self {
        Timer { deadline: None }
    }

    pub fn arm(&mut self, duration: Duration) {
        self.deadline = Some(Instant::now() + duration);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Remaining time until the deadline, or `Duration::ZERO` if armed and
    /// already past, or `None` if not armed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
