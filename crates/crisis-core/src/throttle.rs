//! Publish rate limiting for bulk layer snapshots.
//!
//! A [`Throttle`] coalesces bursts: the first request in a quiet period is
//! emitted at once, later requests inside the interval collapse into a single
//! emission at the end of the interval. Requests are never dropped.

use std::time::Duration;

use tokio::time::Instant;

/// Leading and trailing edge throttle with coalescing.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_emit: Option<Instant>,
    pending: bool,
}

impl Throttle {
    /// Throttle allowing at most one emission per `interval`.
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            pending: false,
        }
    }

    /// Register an update at `now`. Returns true when it should be emitted
    /// immediately; otherwise it is held until [`Self::deadline`].
    pub fn request(&mut self, now: Instant) -> bool {
        let open = self
            .last_emit
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if open {
            self.last_emit = Some(now);
            self.pending = false;
        } else {
            self.pending = true;
        }
        open
    }

    /// When the held update becomes due, if one is held.
    pub fn deadline(&self) -> Option<Instant> {
        if !self.pending {
            return None;
        }
        self.last_emit.and_then(|last| last.checked_add(self.interval))
    }

    /// Returns true, and clears the hold, when a held update is due at `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(due) if now >= due => {
                self.pending = false;
                self.last_emit = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Drop any held update.
    pub const fn cancel(&mut self) {
        self.pending = false;
    }
}
