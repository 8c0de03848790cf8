//! Millisecond deadline helper for the wait family.

use std::time::{Duration, Instant};

/// A deadline derived from a millisecond timeout. Zero means "no
/// deadline": waits run until ready.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub(crate) fn after_ms(timeout_ms: u64) -> Self {
        let at = if timeout_ms == 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_millis(timeout_ms))
        };
        Self { at }
    }

    pub(crate) fn expired(&self) -> bool {
        match self.at {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }

    /// Time left, or `None` when there is no deadline.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }
}
