//! Crawl progress metrics
//!
//! Counters and histograms are emitted through the `metrics` facade. Without an
//! installed recorder the macros are no-ops, so the engine records unconditionally
//! and the binary decides whether to expose a Prometheus endpoint.
//!
//! ## Metrics
//!
//! - `crawl_entries_discovered_total` / `crawl_listings_discovered_total`
//! - `crawl_download_outcomes_total{pass, outcome}`
//! - `crawl_busy_wait_seconds` (histogram)
//! - `crawl_cooldowns_total`
//! - `crawl_entries_dropped_total{reason}`
//! - `crawl_metadata_writes_total{result}`

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: later calls are ignored once an exporter is installed.
///
/// # Errors
/// Returns an error if the exporter cannot be installed (e.g. the address is in use).
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "crawl_entries_discovered_total",
        Unit::Count,
        "Entries found during discovery, before deduplication"
    );
    describe_counter!(
        "crawl_listings_discovered_total",
        Unit::Count,
        "Listings grown to exhaustion during discovery"
    );
    describe_counter!(
        "crawl_download_outcomes_total",
        Unit::Count,
        "Download attempts by pass and outcome"
    );
    describe_histogram!(
        "crawl_busy_wait_seconds",
        Unit::Seconds,
        "Backoff waits caused by busy responses"
    );
    describe_counter!(
        "crawl_cooldowns_total",
        Unit::Count,
        "Cooldown escalations triggered by sustained busy responses"
    );
    describe_counter!(
        "crawl_entries_dropped_total",
        Unit::Count,
        "Entries given up on for the run"
    );
    describe_counter!(
        "crawl_metadata_writes_total",
        Unit::Count,
        "Metadata files written in metadata-only mode"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Record discovery totals
pub fn record_discovery(store: &str, listings: usize, raw_entries: usize) {
    counter!("crawl_listings_discovered_total", "store" => store.to_string())
        .increment(listings as u64);
    counter!("crawl_entries_discovered_total", "store" => store.to_string())
        .increment(raw_entries as u64);
}

/// Record the outcome of one download attempt
pub fn record_download_outcome(pass: &'static str, outcome: &'static str) {
    counter!("crawl_download_outcomes_total", "pass" => pass, "outcome" => outcome).increment(1);
}

/// Record a busy backoff wait
pub fn record_busy_wait(wait: Duration) {
    histogram!("crawl_busy_wait_seconds").record(wait.as_secs_f64());
}

/// Record a cooldown escalation
pub fn record_cooldown() {
    counter!("crawl_cooldowns_total").increment(1);
}

/// Record entries given up on for the run
pub fn record_dropped(reason: &'static str, count: usize) {
    if count > 0 {
        counter!("crawl_entries_dropped_total", "reason" => reason).increment(count as u64);
    }
}

/// Record the result of a metadata write
pub fn record_metadata_write(success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!("crawl_metadata_writes_total", "result" => result).increment(1);
}
