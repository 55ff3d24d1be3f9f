//! Busy backoff state of one driver pass

use std::time::Duration;

/// Exponential wait applied while the remote reports it is busy
///
/// The first busy response waits the base duration; every further busy response
/// without an intervening reset doubles the wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusyBackoff {
    base: Duration,
    wait: Duration,
    already_waited: bool,
}

impl BusyBackoff {
    /// Create a backoff starting at `base`
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            wait: base,
            already_waited: false,
        }
    }

    /// Wait that the next busy response would cause, without advancing
    pub fn current_wait(&self) -> Duration {
        self.wait
    }

    /// Whether a busy wait has happened since the last reset
    pub fn already_waited(&self) -> bool {
        self.already_waited
    }

    /// Return to the base wait
    pub fn reset(&mut self) {
        self.wait = self.base;
        self.already_waited = false;
    }

    /// Advance for a busy response and return how long to sleep
    pub fn next_wait(&mut self) -> Duration {
        if self.already_waited {
            self.wait = self.wait.saturating_mul(2);
        }
        self.already_waited = true;
        self.wait
    }
}
