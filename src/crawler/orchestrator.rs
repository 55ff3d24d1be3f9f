//! Crawl orchestrator
//!
//! Runs the fixed pass sequence:
//!
//! 1. discovery
//! 2. one download pass per listing
//! 3. busy-backlog pass
//! 4. cooldown, then one more attempt on entries still busy
//! 5. final sweep over every queued retry, with retries disabled
//!
//! Shutdown is honoured between entries and during every wait; an interrupted
//! run skips the remaining passes and reports what it did not get to.

use super::config::CrawlTiming;
use super::discovery::{discover, Discovery, DiscoveryStats};
use super::driver::{DownloadDriver, Pass, PassReport};
use super::CrawlError;
use crate::catalog::CatalogSource;
use crate::output::{CsvOutcomeWriter, OutcomeRecord, OutputWriter};
use crate::shutdown::SharedShutdown;
use crate::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};

/// Why a package was given up on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropRecord {
    /// Last failure seen for the package
    pub reason: String,
    /// Still busy after the cooldown pass
    pub abandoned_busy: bool,
}

/// Counters of one driver pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    /// Pass kind
    pub pass: Pass,
    /// Listing name for per-listing passes
    pub listing: Option<String>,
    /// Download calls made
    pub attempted: usize,
    /// Packages downloaded
    pub succeeded: usize,
    /// Entries queued for retry
    pub retry_queued: usize,
    /// Entries that hit a busy remote
    pub busy: usize,
    /// Entries skipped as already downloaded
    pub skipped: usize,
    /// Backoff wait in effect when the pass started
    pub initial_wait: Duration,
    /// Busy waits slept during the pass
    pub busy_waits: Vec<Duration>,
}

impl PassSummary {
    fn from_report(report: &PassReport, listing: Option<&str>) -> Self {
        Self {
            pass: report.pass,
            listing: listing.map(str::to_string),
            attempted: report.attempted,
            succeeded: report.downloaded.len(),
            retry_queued: report.retry.len(),
            busy: report.busy.len(),
            skipped: report.skipped,
            initial_wait: report.initial_wait,
            busy_waits: report.busy_waits.clone(),
        }
    }
}

/// Result of a crawl run
#[derive(Debug, Clone, Default)]
pub struct CrawlSummary {
    /// Distinct packages found during discovery
    pub discovered: HashSet<String>,
    /// Packages downloaded during the run
    pub downloaded: HashSet<String>,
    /// Packages given up on, with the last failure seen
    pub dropped: BTreeMap<String, DropRecord>,
    /// Packages never resolved because the run was interrupted
    pub unattempted: BTreeSet<String>,
    /// Packages that entered the final sweep, in order
    pub final_sweep: Vec<String>,
    /// Whether the cooldown escalation ran
    pub cooldown_triggered: bool,
    /// Per-pass counters in execution order
    pub passes: Vec<PassSummary>,
    /// Discovery counters
    pub discovery: DiscoveryStats,
    /// The run stopped early because shutdown was requested
    pub interrupted: bool,
}

impl CrawlSummary {
    /// Packages still busy after the cooldown pass
    pub fn abandoned(&self) -> impl Iterator<Item = &str> {
        self.dropped
            .iter()
            .filter(|(_, record)| record.abandoned_busy)
            .map(|(package, _)| package.as_str())
    }

    /// Summaries of all passes of the given kind
    pub fn passes_of(&self, pass: Pass) -> impl Iterator<Item = &PassSummary> {
        self.passes.iter().filter(move |summary| summary.pass == pass)
    }

    /// One report row per discovered package, sorted by package name
    pub fn outcome_records(&self) -> Vec<OutcomeRecord> {
        let mut packages: Vec<&String> = self.discovered.iter().collect();
        packages.sort();

        packages
            .into_iter()
            .map(|package| {
                let (outcome, reason) = if self.downloaded.contains(package) {
                    ("downloaded", String::new())
                } else if let Some(record) = self.dropped.get(package) {
                    let outcome = if record.abandoned_busy {
                        "abandoned_busy"
                    } else {
                        "dropped"
                    };
                    (outcome, record.reason.clone())
                } else {
                    ("unattempted", String::new())
                };
                OutcomeRecord {
                    package_name: package.clone(),
                    outcome: outcome.to_string(),
                    reason,
                }
            })
            .collect()
    }

    /// Write the outcome report as CSV. Returns the number of rows written.
    pub fn write_report(&self, path: &Path) -> Result<u64, CrawlError> {
        let mut writer = CsvOutcomeWriter::new(path)?;
        writer.write_records(&self.outcome_records())?;
        let written = writer.records_written();
        writer.close()?;
        Ok(written)
    }
}

/// Result of a metadata-only crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataSummary {
    /// Discovery counters
    pub discovery: DiscoveryStats,
    /// Metadata files written
    pub written: usize,
    /// Metadata writes that failed
    pub failed: usize,
    /// The run stopped early because shutdown was requested
    pub interrupted: bool,
}

/// Ordered backlog holding each package at most once
#[derive(Default)]
struct Backlog {
    entries: Vec<Entry>,
    queued: HashSet<String>,
}

impl Backlog {
    fn extend(&mut self, entries: impl IntoIterator<Item = Entry>) {
        for entry in entries {
            if self.queued.insert(entry.package_name.clone()) {
                self.entries.push(entry);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn take(&mut self) -> Vec<Entry> {
        self.queued.clear();
        std::mem::take(&mut self.entries)
    }
}

/// Mutable state threaded through the passes of one run
#[derive(Default)]
struct RunState {
    downloaded: HashSet<String>,
    failures: HashMap<String, String>,
    retry_backlog: Backlog,
    busy_backlog: Backlog,
    dropped: BTreeMap<String, DropRecord>,
    passes: Vec<PassSummary>,
    interrupted: bool,
}

impl RunState {
    /// Merge successes and failures of a pass and hand back its report
    fn absorb(&mut self, report: PassReport, listing: Option<&str>) -> PassReport {
        self.passes.push(PassSummary::from_report(&report, listing));
        for (package, reason) in &report.failures {
            self.failures.insert(package.clone(), reason.clone());
        }
        self.downloaded.extend(report.downloaded.iter().cloned());
        self.interrupted |= report.interrupted;
        report
    }

    fn drop_entries<'e>(&mut self, entries: impl IntoIterator<Item = &'e Entry>, abandoned: bool) {
        for entry in entries {
            let reason = self
                .failures
                .get(entry.package_name())
                .cloned()
                .unwrap_or_default();
            self.dropped.insert(
                entry.package_name.clone(),
                DropRecord {
                    reason,
                    abandoned_busy: abandoned,
                },
            );
        }
    }
}

/// Drives a full crawl of one catalog source
pub struct Crawler {
    source: Box<dyn CatalogSource>,
    shutdown: SharedShutdown,
    timing: CrawlTiming,
}

impl Crawler {
    /// Create a crawler with the default busy backoff and cooldown timing
    pub fn new(source: Box<dyn CatalogSource>, shutdown: SharedShutdown) -> Self {
        Self {
            source,
            shutdown,
            timing: CrawlTiming::default(),
        }
    }

    /// Override backoff and cooldown timing
    pub fn with_timing(mut self, timing: CrawlTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Catalog source being crawled
    pub fn source(&self) -> &dyn CatalogSource {
        self.source.as_ref()
    }

    /// Discover every listing and download every entry
    ///
    /// Succeeds once the pass sequence completes, however many entries were
    /// dropped along the way.
    ///
    /// # Errors
    /// Returns [`CrawlError::Categories`] if the catalog's categories cannot be listed.
    pub async fn run(&self) -> Result<CrawlSummary, CrawlError> {
        let span = info_span!("crawl", store = %self.source.store());
        self.run_passes().instrument(span).await
    }

    async fn run_passes(&self) -> Result<CrawlSummary, CrawlError> {
        info!("Starting crawl");
        let discovery = discover(self.source.as_ref(), &self.shutdown).await?;
        let mut state = RunState {
            interrupted: discovery.interrupted,
            ..RunState::default()
        };
        let driver = DownloadDriver::new(self.source.as_ref(), &self.shutdown, self.timing);
        let mut final_sweep = Vec::new();
        let mut cooldown_triggered = false;

        if !state.interrupted {
            self.download_listings(&driver, &discovery, &mut state).await;
        }

        let mut still_busy = Vec::new();
        if !state.interrupted && !state.busy_backlog.is_empty() {
            let busy_backlog = state.busy_backlog.take();
            info!(entries = busy_backlog.len(), "Retrying busy backlog");
            let report = driver
                .attempt_all(Pass::BusyBacklog, &busy_backlog, &state.downloaded, true)
                .await;
            let report = state.absorb(report, None);
            state.retry_backlog.extend(report.retry);
            still_busy = report.busy;
        }

        if !state.interrupted && !still_busy.is_empty() {
            cooldown_triggered = true;
            if self.cooldown(still_busy.len()).await {
                let report = driver
                    .attempt_all(Pass::Cooldown, &still_busy, &state.downloaded, true)
                    .await;
                let report = state.absorb(report, None);
                state.retry_backlog.extend(report.retry);
                for entry in &report.busy {
                    warn!(package = %entry.package_name, "Still busy after cooldown, abandoning");
                }
                state.drop_entries(&report.busy, true);
                crate::metrics::record_dropped("abandoned_busy", report.busy.len());
            } else {
                state.interrupted = true;
            }
        }

        if !state.interrupted && !state.retry_backlog.is_empty() {
            let retry_backlog = state.retry_backlog.take();
            info!(entries = retry_backlog.len(), "Final sweep over retry backlog");
            final_sweep = retry_backlog
                .iter()
                .map(|entry| entry.package_name.clone())
                .collect();
            let report = driver
                .attempt_all(Pass::FinalSweep, &retry_backlog, &state.downloaded, false)
                .await;
            let report = state.absorb(report, None);
            let lost = report.retry.len() + report.busy.len() + report.dropped.len();
            state.drop_entries(
                report
                    .retry
                    .iter()
                    .chain(report.busy.iter())
                    .chain(report.dropped.iter()),
                false,
            );
            crate::metrics::record_dropped("final_sweep", lost);
        }

        Ok(Self::finish(discovery, state, final_sweep, cooldown_triggered))
    }

    /// Step 2: one driver invocation per listing against the cumulative downloaded set
    async fn download_listings(
        &self,
        driver: &DownloadDriver<'_>,
        discovery: &Discovery,
        state: &mut RunState,
    ) {
        for listing in &discovery.listings {
            let span = info_span!("listing", name = %listing.name());
            let report = driver
                .attempt_all(Pass::Listing, listing.entries(), &state.downloaded, true)
                .instrument(span)
                .await;
            let report = state.absorb(report, Some(listing.name()));
            state.retry_backlog.extend(report.retry);
            state.busy_backlog.extend(report.busy);
            if state.interrupted {
                break;
            }
        }
    }

    /// Wait out the cooldown. Returns `false` if shutdown interrupted it.
    async fn cooldown(&self, busy_entries: usize) -> bool {
        let total = self.timing.cooldown_total();
        warn!(
            entries = busy_entries,
            minutes = total.as_secs() / 60,
            "Remote still busy, cooling down before the last attempt"
        );
        crate::metrics::record_cooldown();

        let intervals = self.timing.cooldown_intervals;
        for unit in 1..=intervals {
            if !self.shutdown.sleep(self.timing.cooldown_interval).await {
                info!(elapsed = unit - 1, total = intervals, "Cooldown interrupted by shutdown");
                return false;
            }
            info!(elapsed = unit, total = intervals, "Cooldown progress");
        }
        true
    }

    fn finish(
        discovery: Discovery,
        state: RunState,
        final_sweep: Vec<String>,
        cooldown_triggered: bool,
    ) -> CrawlSummary {
        let discovered = discovery.unique_packages();
        let RunState {
            downloaded,
            failures,
            mut dropped,
            interrupted,
            passes,
            ..
        } = state;

        dropped.retain(|package, _| !downloaded.contains(package));

        let mut unattempted = BTreeSet::new();
        for package in &discovered {
            if downloaded.contains(package) || dropped.contains_key(package) {
                continue;
            }
            if interrupted {
                unattempted.insert(package.clone());
            } else {
                dropped.insert(
                    package.clone(),
                    DropRecord {
                        reason: failures.get(package).cloned().unwrap_or_default(),
                        abandoned_busy: false,
                    },
                );
            }
        }

        let summary = CrawlSummary {
            discovered,
            downloaded,
            dropped,
            unattempted,
            final_sweep,
            cooldown_triggered,
            passes,
            discovery: discovery.stats,
            interrupted,
        };

        if summary.interrupted {
            warn!(
                downloaded = summary.downloaded.len(),
                unattempted = summary.unattempted.len(),
                "Crawl interrupted"
            );
        } else {
            info!(
                discovered = summary.discovered.len(),
                downloaded = summary.downloaded.len(),
                dropped = summary.dropped.len(),
                abandoned = summary.abandoned().count(),
                "Crawl complete"
            );
        }
        summary
    }

    /// Discover every listing and persist entry metadata instead of downloading
    ///
    /// Each entry is tagged with its listing's subcategory before it is written.
    /// Write failures are logged and counted.
    ///
    /// # Errors
    /// Returns [`CrawlError::Categories`] if the catalog's categories cannot be listed.
    pub async fn crawl_metadata(&self) -> Result<MetadataSummary, CrawlError> {
        let span = info_span!("crawl_metadata", store = %self.source.store());
        self.write_all_metadata().instrument(span).await
    }

    async fn write_all_metadata(&self) -> Result<MetadataSummary, CrawlError> {
        info!("Starting metadata crawl");
        let discovery = discover(self.source.as_ref(), &self.shutdown).await?;
        let mut summary = MetadataSummary {
            interrupted: discovery.interrupted,
            ..MetadataSummary::default()
        };

        'listings: for listing in &discovery.listings {
            for entry in listing {
                if self.shutdown.is_shutdown_requested() {
                    summary.interrupted = true;
                    break 'listings;
                }
                let tagged = entry.with_category(listing.subcategory());
                match self.source.write_metadata(&tagged).await {
                    Ok(()) => {
                        summary.written += 1;
                        crate::metrics::record_metadata_write(true);
                    }
                    Err(e) => {
                        warn!(
                            package = %entry.package_name,
                            error = %e,
                            "Failed to write metadata"
                        );
                        summary.failed += 1;
                        crate::metrics::record_metadata_write(false);
                    }
                }
            }
            info!(listing = %listing.name(), entries = listing.len(), "Listing metadata written");
        }

        summary.discovery = discovery.stats;
        info!(
            written = summary.written,
            failed = summary.failed,
            interrupted = summary.interrupted,
            "Metadata crawl complete"
        );
        Ok(summary)
    }
}
