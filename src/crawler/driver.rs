//! Download driver
//!
//! Attempts every entry of one pass in order and sorts each into exactly one of:
//! skipped as duplicate, downloaded, busy, queued for retry or dropped.
//! Busy responses put the driver to sleep with an exponential wait before it
//! moves on to the next entry.

use super::backoff::BusyBackoff;
use super::config::CrawlTiming;
use crate::catalog::{CatalogSource, DownloadOutcome};
use crate::shutdown::ShutdownCoordinator;
use crate::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Stage of the crawl a driver invocation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// First attempt, one invocation per listing
    Listing,
    /// Second attempt on entries that hit a busy remote
    BusyBacklog,
    /// Last attempt on entries still busy, after the cooldown
    Cooldown,
    /// Last chance for every queued retry; nothing is requeued
    FinalSweep,
}

impl Pass {
    /// Label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::BusyBacklog => "busy_backlog",
            Self::Cooldown => "cooldown",
            Self::FinalSweep => "final_sweep",
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one driver invocation
#[derive(Debug, Clone)]
pub struct PassReport {
    /// Pass this report belongs to
    pub pass: Pass,
    /// Entries queued for another attempt
    pub retry: Vec<Entry>,
    /// Entries that hit a busy remote
    pub busy: Vec<Entry>,
    /// Packages downloaded by this invocation
    pub downloaded: HashSet<String>,
    /// Entries dropped because retries were disabled
    pub dropped: Vec<Entry>,
    /// Last failure seen per package
    pub failures: HashMap<String, String>,
    /// Entries skipped because they were already downloaded
    pub skipped: usize,
    /// Download calls made
    pub attempted: usize,
    /// Busy waits in the order they were slept
    pub busy_waits: Vec<Duration>,
    /// Backoff wait in effect when the pass started
    pub initial_wait: Duration,
    /// Entries not attempted because shutdown was requested
    pub unattempted: Vec<Entry>,
    /// The pass stopped early because shutdown was requested
    pub interrupted: bool,
}

impl PassReport {
    fn new(pass: Pass, initial_wait: Duration) -> Self {
        Self {
            pass,
            retry: Vec::new(),
            busy: Vec::new(),
            downloaded: HashSet::new(),
            dropped: Vec::new(),
            failures: HashMap::new(),
            skipped: 0,
            attempted: 0,
            busy_waits: Vec::new(),
            initial_wait,
            unattempted: Vec::new(),
            interrupted: false,
        }
    }
}

/// Sequential downloader for one pass over a list of entries
pub struct DownloadDriver<'a> {
    source: &'a dyn CatalogSource,
    shutdown: &'a ShutdownCoordinator,
    timing: CrawlTiming,
}

impl<'a> DownloadDriver<'a> {
    /// Create a driver over `source`
    pub fn new(
        source: &'a dyn CatalogSource,
        shutdown: &'a ShutdownCoordinator,
        timing: CrawlTiming,
    ) -> Self {
        Self {
            source,
            shutdown,
            timing,
        }
    }

    /// Attempt every entry once, in order
    ///
    /// Entries already in `downloaded`, or downloaded earlier in this call, are
    /// skipped. With `retry_enabled` false a retry request is terminal; request
    /// errors are still queued. Backoff starts at the base wait on every call.
    pub async fn attempt_all(
        &self,
        pass: Pass,
        entries: &[Entry],
        downloaded: &HashSet<String>,
        retry_enabled: bool,
    ) -> PassReport {
        let mut backoff = BusyBackoff::new(self.timing.busy_base_wait);
        let mut report = PassReport::new(pass, backoff.current_wait());

        for (index, entry) in entries.iter().enumerate() {
            if self.shutdown.is_shutdown_requested() {
                report.unattempted = entries[index..].to_vec();
                report.interrupted = true;
                break;
            }

            let package = entry.package_name();
            if downloaded.contains(package) || report.downloaded.contains(package) {
                debug!(package, "Already downloaded, skipping");
                report.skipped += 1;
                continue;
            }

            report.attempted += 1;
            let outcome = self.source.download(entry).await;
            crate::metrics::record_download_outcome(pass.label(), outcome.label());

            match outcome {
                DownloadOutcome::Success => {
                    debug!(package, "Downloaded");
                    report.failures.remove(package);
                    report.downloaded.insert(package.to_string());
                    backoff.reset();
                }
                DownloadOutcome::Busy => {
                    report.busy.push(entry.clone());
                    report
                        .failures
                        .insert(package.to_string(), "remote busy".to_string());
                    let wait = backoff.next_wait();
                    info!(
                        package,
                        wait_secs = wait.as_secs(),
                        "Remote busy, backing off"
                    );
                    crate::metrics::record_busy_wait(wait);
                    report.busy_waits.push(wait);
                    if !self.shutdown.sleep(wait).await {
                        info!(package, "Backoff interrupted by shutdown");
                    }
                }
                DownloadOutcome::RetryRequested => {
                    backoff.reset();
                    report
                        .failures
                        .insert(package.to_string(), "retry requested".to_string());
                    if retry_enabled {
                        warn!(package, "Retry requested, queued for a later pass");
                        report.retry.push(entry.clone());
                    } else {
                        error!(package, "Retry requested but retries are exhausted, dropping");
                        report.dropped.push(entry.clone());
                    }
                }
                DownloadOutcome::RequestError(message) => {
                    error!(package, error = %message, "Download failed");
                    report.failures.insert(package.to_string(), message);
                    report.retry.push(entry.clone());
                }
            }
        }

        info!(
            pass = %pass,
            attempted = report.attempted,
            succeeded = report.downloaded.len(),
            retry_queued = report.retry.len(),
            busy = report.busy.len(),
            skipped = report.skipped,
            "Pass finished"
        );
        report
    }
}
