//! Crawl timing constants

use std::time::Duration;

/// Base wait after the remote reports it is busy.
/// Doubled on every consecutive busy response within one driver pass.
pub const BUSY_BASE_WAIT: Duration = Duration::from_secs(30);

/// Length of one cooldown unit. Progress is logged after each unit.
pub const COOLDOWN_INTERVAL: Duration = Duration::from_secs(60);

/// Number of cooldown units waited before the last attempt on busy entries (one hour total)
pub const COOLDOWN_INTERVALS: u32 = 60;

/// Maximum number of HTTP-level retries for catalog metadata requests.
/// Artifact downloads are never retried at the HTTP level; the pass sequence retries them.
pub const MAX_HTTP_RETRIES: u32 = 5;

/// Initial backoff delay in milliseconds for catalog metadata requests
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Maximum backoff delay in milliseconds for catalog metadata requests
pub const MAX_BACKOFF_MS: u64 = 30000; // 30 seconds

/// Calculate exponential backoff delay for HTTP-level retries
pub fn calculate_backoff(retry_count: u32) -> Duration {
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(retry_count));
    let delay_ms = delay_ms.min(MAX_BACKOFF_MS);
    Duration::from_millis(delay_ms)
}

/// Waits used by the download driver and the cooldown pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlTiming {
    /// Base busy wait
    pub busy_base_wait: Duration,
    /// Length of one cooldown unit
    pub cooldown_interval: Duration,
    /// Number of cooldown units
    pub cooldown_intervals: u32,
}

impl Default for CrawlTiming {
    fn default() -> Self {
        Self {
            busy_base_wait: BUSY_BASE_WAIT,
            cooldown_interval: COOLDOWN_INTERVAL,
            cooldown_intervals: COOLDOWN_INTERVALS,
        }
    }
}

impl CrawlTiming {
    /// Timing without any waits, for benchmarks and dry runs against local stubs
    pub fn immediate() -> Self {
        Self {
            busy_base_wait: Duration::ZERO,
            cooldown_interval: Duration::ZERO,
            cooldown_intervals: 0,
        }
    }

    /// Total cooldown duration
    pub fn cooldown_total(&self) -> Duration {
        self.cooldown_interval * self.cooldown_intervals
    }
}
