//! Integration tests for the download driver: dedup, backoff and classification

use crate::common::{entries, init_test_tracing, StubCatalog};
use catalog_crawler::crawler::{CrawlTiming, DownloadDriver, Pass};
use catalog_crawler::shutdown::ShutdownCoordinator;
use catalog_crawler::DownloadOutcome;
use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().map(|s| Duration::from_secs(*s)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_entry_downloaded_at_most_once() {
    init_test_tracing();
    let stub = StubCatalog::new();
    let log = stub.log();
    let shutdown = ShutdownCoordinator::new();
    let driver = DownloadDriver::new(&stub, &shutdown, CrawlTiming::default());

    let already: HashSet<String> = ["p0".to_string()].into();
    let report = driver
        .attempt_all(Pass::Listing, &entries(&["p0", "p1", "p2", "p1"]), &already, true)
        .await;

    assert_eq!(log.downloads(), vec!["p1", "p2"]);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.attempted, 2);
    assert_eq!(
        report.downloaded,
        HashSet::from(["p1".to_string(), "p2".to_string()])
    );
    assert!(report.retry.is_empty());
    assert!(report.busy.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_busy_doubles_wait_and_success_resets() {
    let stub = StubCatalog::new()
        .script("p1", vec![DownloadOutcome::Busy])
        .script("p2", vec![DownloadOutcome::Busy])
        .script("p3", vec![DownloadOutcome::Busy])
        .script("p5", vec![DownloadOutcome::Busy]);
    let log = stub.log();
    let shutdown = ShutdownCoordinator::new();
    let driver = DownloadDriver::new(&stub, &shutdown, CrawlTiming::default());

    let report = driver
        .attempt_all(
            Pass::Listing,
            &entries(&["p1", "p2", "p3", "p4", "p5"]),
            &HashSet::new(),
            true,
        )
        .await;

    assert_eq!(report.busy_waits, secs(&[30, 60, 120, 30]));
    assert_eq!(report.busy.len(), 4);
    assert_eq!(report.downloaded, HashSet::from(["p4".to_string()]));

    // The driver really sleeps between attempts
    let p1 = log.download_times("p1")[0];
    let p2 = log.download_times("p2")[0];
    let p3 = log.download_times("p3")[0];
    assert!(p2 - p1 >= Duration::from_secs(30));
    assert!(p3 - p2 >= Duration::from_secs(60));
    assert!(p3 - p2 < Duration::from_secs(61));
}

#[tokio::test(start_paused = true)]
async fn test_retry_requested_resets_backoff() {
    let stub = StubCatalog::new()
        .script("p1", vec![DownloadOutcome::Busy])
        .script("p2", vec![DownloadOutcome::RetryRequested])
        .script("p3", vec![DownloadOutcome::Busy]);
    let shutdown = ShutdownCoordinator::new();
    let driver = DownloadDriver::new(&stub, &shutdown, CrawlTiming::default());

    let report = driver
        .attempt_all(Pass::Listing, &entries(&["p1", "p2", "p3"]), &HashSet::new(), true)
        .await;

    assert_eq!(report.busy_waits, secs(&[30, 30]));
    assert_eq!(report.retry.len(), 1);
    assert_eq!(report.retry[0].package_name, "p2");
}

#[tokio::test(start_paused = true)]
async fn test_request_error_leaves_backoff_untouched() {
    let stub = StubCatalog::new()
        .script("p1", vec![DownloadOutcome::Busy])
        .script("p2", vec![DownloadOutcome::RequestError("boom".to_string())])
        .script("p3", vec![DownloadOutcome::Busy]);
    let shutdown = ShutdownCoordinator::new();
    let driver = DownloadDriver::new(&stub, &shutdown, CrawlTiming::default());

    let report = driver
        .attempt_all(Pass::Listing, &entries(&["p1", "p2", "p3"]), &HashSet::new(), true)
        .await;

    assert_eq!(report.busy_waits, secs(&[30, 60]));
    assert_eq!(report.failures.get("p2").map(String::as_str), Some("boom"));
}

#[tokio::test(start_paused = true)]
async fn test_retry_disabled_drops_retry_requests_but_queues_request_errors() {
    let stub = StubCatalog::new()
        .script("p1", vec![DownloadOutcome::RetryRequested])
        .script("p2", vec![DownloadOutcome::RequestError("404".to_string())]);
    let shutdown = ShutdownCoordinator::new();
    let driver = DownloadDriver::new(&stub, &shutdown, CrawlTiming::default());

    let report = driver
        .attempt_all(Pass::FinalSweep, &entries(&["p1", "p2"]), &HashSet::new(), false)
        .await;

    let retry: Vec<&str> = report.retry.iter().map(|e| e.package_name.as_str()).collect();
    let dropped: Vec<&str> = report.dropped.iter().map(|e| e.package_name.as_str()).collect();
    assert_eq!(retry, vec!["p2"]);
    assert_eq!(dropped, vec!["p1"]);
}

/// Collects formatted log output so tests can assert on levels
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn lines_at(&self, level: &str) -> Vec<String> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| line.contains(level))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test(start_paused = true)]
async fn test_dropped_and_failed_downloads_log_at_error() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let stub = StubCatalog::new()
        .script("p1", vec![DownloadOutcome::RetryRequested])
        .script("p2", vec![DownloadOutcome::RequestError("404".to_string())]);
    let shutdown = ShutdownCoordinator::new();
    let driver = DownloadDriver::new(&stub, &shutdown, CrawlTiming::default());

    driver
        .attempt_all(Pass::FinalSweep, &entries(&["p1", "p2"]), &HashSet::new(), false)
        .await;

    let errors = logs.lines_at("ERROR");
    assert_eq!(errors.len(), 2, "{errors:?}");
    assert!(errors[0].contains("retries are exhausted") && errors[0].contains("p1"));
    assert!(errors[1].contains("Download failed") && errors[1].contains("404"));
    assert!(logs.lines_at("WARN").iter().all(|line| !line.contains("Download failed")));
}

#[tokio::test(start_paused = true)]
async fn test_every_entry_classified_exactly_once() {
    let stub = StubCatalog::new()
        .script("busy", vec![DownloadOutcome::Busy])
        .script("retry", vec![DownloadOutcome::RetryRequested])
        .script("error", vec![DownloadOutcome::RequestError("x".to_string())]);
    let shutdown = ShutdownCoordinator::new();
    let driver = DownloadDriver::new(&stub, &shutdown, CrawlTiming::default());
    let input = entries(&["ok", "busy", "retry", "error", "ok", "done"]);
    let already: HashSet<String> = ["done".to_string()].into();

    let report = driver
        .attempt_all(Pass::Listing, &input, &already, true)
        .await;

    let total = report.skipped
        + report.downloaded.len()
        + report.busy.len()
        + report.retry.len()
        + report.dropped.len();
    assert_eq!(total, input.len());
    assert_eq!(report.attempted, 4);
    assert_eq!(report.initial_wait, Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_pass_leaves_everything_unattempted() {
    let stub = StubCatalog::new();
    let log = stub.log();
    let shutdown = ShutdownCoordinator::new();
    shutdown.request_shutdown();
    let driver = DownloadDriver::new(&stub, &shutdown, CrawlTiming::default());

    let report = driver
        .attempt_all(Pass::Listing, &entries(&["p1", "p2"]), &HashSet::new(), true)
        .await;

    assert!(report.interrupted);
    assert_eq!(report.unattempted.len(), 2);
    assert!(log.downloads().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cuts_busy_wait_short() {
    let stub = StubCatalog::new().script("p1", vec![DownloadOutcome::Busy]);
    let log = stub.log();
    let shutdown = Arc::new(ShutdownCoordinator::new());
    let trigger = Arc::clone(&shutdown);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.request_shutdown();
    });
    let driver = DownloadDriver::new(&stub, &shutdown, CrawlTiming::default());

    let start = tokio::time::Instant::now();
    let report = driver
        .attempt_all(Pass::Listing, &entries(&["p1", "p2", "p3"]), &HashSet::new(), true)
        .await;

    assert!(start.elapsed() < Duration::from_secs(30));
    assert!(report.interrupted);
    assert_eq!(log.downloads(), vec!["p1"]);
    let unattempted: Vec<&str> = report
        .unattempted
        .iter()
        .map(|e| e.package_name.as_str())
        .collect();
    assert_eq!(unattempted, vec!["p2", "p3"]);
}
