//! End-to-end crawl scenarios against a scripted catalog

use crate::common::{init_test_tracing, StubCatalog};
use catalog_crawler::crawler::{CrawlError, Crawler, Pass};
use catalog_crawler::shutdown::ShutdownCoordinator;
use catalog_crawler::DownloadOutcome;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use DownloadOutcome::{Busy, RequestError, RetryRequested, Success};

fn set(names: &[&str]) -> HashSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn crawler(stub: StubCatalog) -> Crawler {
    Crawler::new(Box::new(stub), ShutdownCoordinator::shared())
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_listings_download_each_package_once() {
    init_test_tracing();
    let stub = StubCatalog::new()
        .listing("A", "a1", &[&["p1", "p2", "p3"]])
        .listing("B", "b1", &[&["p2", "p4"]]);
    let log = stub.log();

    let summary = crawler(stub).run().await.unwrap();

    assert_eq!(summary.discovered, set(&["p1", "p2", "p3", "p4"]));
    assert_eq!(summary.downloaded, set(&["p1", "p2", "p3", "p4"]));
    assert_eq!(log.download_count("p2"), 1);
    assert_eq!(log.downloads().len(), 4);
    assert!(summary.dropped.is_empty());
    assert!(summary.final_sweep.is_empty());
    assert!(!summary.cooldown_triggered);
    assert_eq!(summary.passes_of(Pass::Listing).count(), 2);
    assert_eq!(summary.passes_of(Pass::BusyBacklog).count(), 0);
    assert_eq!(summary.passes_of(Pass::FinalSweep).count(), 0);
    assert_eq!(summary.discovery.raw_entries, 5);
    assert_eq!(summary.discovery.unique_entries, 4);

    let second = summary.passes_of(Pass::Listing).nth(1).unwrap();
    assert_eq!(second.listing.as_deref(), Some("b1"));
    assert_eq!(second.skipped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_busy_once_recovers_in_busy_backlog_pass() {
    let stub = StubCatalog::new()
        .listing("A", "a1", &[&["p1", "p2"]])
        .script("p1", vec![Busy, Success]);
    let log = stub.log();

    let summary = crawler(stub).run().await.unwrap();

    assert!(summary.downloaded.contains("p1"));
    assert!(!summary.dropped.contains_key("p1"));
    assert_eq!(log.download_count("p1"), 2);
    assert!(!summary.cooldown_triggered);

    let busy_pass = summary.passes_of(Pass::BusyBacklog).next().unwrap();
    assert_eq!(busy_pass.initial_wait, Duration::from_secs(30));
    assert_eq!(busy_pass.succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_starts_at_base_in_every_pass() {
    let stub = StubCatalog::new()
        .listing("A", "a1", &[&["p1", "p2"]])
        .script("p1", vec![Busy, Busy, Success])
        .script("p2", vec![Busy]);

    let summary = crawler(stub).run().await.unwrap();

    let listing = summary.passes_of(Pass::Listing).next().unwrap();
    assert_eq!(
        listing.busy_waits,
        vec![Duration::from_secs(30), Duration::from_secs(60)]
    );
    let busy_pass = summary.passes_of(Pass::BusyBacklog).next().unwrap();
    assert_eq!(busy_pass.busy_waits, vec![Duration::from_secs(30)]);
    assert_eq!(summary.downloaded, set(&["p1", "p2"]));
}

#[tokio::test(start_paused = true)]
async fn test_sustained_busy_triggers_cooldown_then_abandons() {
    let stub = StubCatalog::new()
        .listing("A", "a1", &[&["p5", "p6"]])
        .script("p5", vec![Busy, Busy, Busy]);
    let log = stub.log();

    let summary = crawler(stub).run().await.unwrap();

    assert!(summary.cooldown_triggered);
    assert_eq!(log.download_count("p5"), 3);
    let times = log.download_times("p5");
    assert!(times[2] - times[1] >= Duration::from_secs(3600));

    assert_eq!(summary.abandoned().collect::<Vec<_>>(), vec!["p5"]);
    assert!(summary.dropped["p5"].abandoned_busy);
    assert!(!summary.final_sweep.contains(&"p5".to_string()));
    assert_eq!(summary.passes_of(Pass::FinalSweep).count(), 0);
    assert!(summary.downloaded.contains("p6"));
}

#[tokio::test(start_paused = true)]
async fn test_entry_recovering_after_cooldown_is_downloaded() {
    let stub = StubCatalog::new()
        .listing("A", "a1", &[&["p5"]])
        .script("p5", vec![Busy, Busy, Success]);

    let summary = crawler(stub).run().await.unwrap();

    assert!(summary.cooldown_triggered);
    assert_eq!(summary.downloaded, set(&["p5"]));
    assert!(summary.dropped.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retry_lists_of_busy_and_cooldown_passes_reach_final_sweep() {
    let stub = StubCatalog::new()
        .listing("A", "a1", &[&["p1", "p2"]])
        .script("p1", vec![Busy, RetryRequested, Success])
        .script("p2", vec![Busy, Busy, RequestError("reset".to_string()), Success]);

    let summary = crawler(stub).run().await.unwrap();

    assert!(summary.cooldown_triggered);
    assert_eq!(summary.final_sweep, vec!["p1", "p2"]);
    assert_eq!(summary.downloaded, set(&["p1", "p2"]));
}

#[tokio::test(start_paused = true)]
async fn test_no_package_vanishes_silently() {
    let stub = StubCatalog::new()
        .listing("A", "a1", &[&["p1", "p2", "p3"], &["p4"]])
        .listing("B", "b1", &[&["p5", "p6", "p1"]])
        .script("p2", vec![RetryRequested, RetryRequested])
        .script("p3", vec![RequestError("timeout".to_string()), Success])
        .script("p4", vec![Busy, Busy, Busy])
        .script("p5", vec![RequestError("a".to_string()), RequestError("b".to_string())])
        .script("p6", vec![RetryRequested, Success]);

    let summary = crawler(stub).run().await.unwrap();

    let resolved: HashSet<String> = summary
        .downloaded
        .iter()
        .chain(summary.dropped.keys())
        .cloned()
        .collect();
    assert_eq!(resolved, summary.discovered);
    assert!(summary.unattempted.is_empty());

    assert_eq!(summary.downloaded, set(&["p1", "p3", "p6"]));
    assert_eq!(summary.dropped["p2"].reason, "retry requested");
    assert!(!summary.dropped["p2"].abandoned_busy);
    assert_eq!(summary.dropped["p5"].reason, "b");
    assert!(summary.dropped["p4"].abandoned_busy);

    let records = summary.outcome_records();
    let outcomes: Vec<(&str, &str)> = records
        .iter()
        .map(|r| (r.package_name.as_str(), r.outcome.as_str()))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ("p1", "downloaded"),
            ("p2", "dropped"),
            ("p3", "downloaded"),
            ("p4", "abandoned_busy"),
            ("p5", "dropped"),
            ("p6", "downloaded"),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_busy_in_one_listing_success_in_another() {
    let stub = StubCatalog::new()
        .listing("A", "a1", &[&["p2"]])
        .listing("B", "b1", &[&["p2"]])
        .script("p2", vec![Busy]);
    let log = stub.log();

    let summary = crawler(stub).run().await.unwrap();

    assert_eq!(log.download_count("p2"), 2);
    let busy_pass = summary.passes_of(Pass::BusyBacklog).next().unwrap();
    assert_eq!(busy_pass.skipped, 1);
    assert_eq!(busy_pass.attempted, 0);
    assert_eq!(summary.downloaded, set(&["p2"]));
}

#[tokio::test(start_paused = true)]
async fn test_entry_busy_in_two_listings_is_queued_once() {
    let stub = StubCatalog::new()
        .listing("A", "a1", &[&["p2"]])
        .listing("B", "b1", &[&["p2"]])
        .script("p2", vec![Busy, Busy, Busy, Busy, Busy]);
    let log = stub.log();

    let summary = crawler(stub).run().await.unwrap();

    let busy_pass = summary.passes_of(Pass::BusyBacklog).next().unwrap();
    assert_eq!(busy_pass.attempted, 1);
    assert_eq!(busy_pass.busy, 1);
    assert_eq!(busy_pass.busy_waits, vec![Duration::from_secs(30)]);
    let cooldown = summary.passes_of(Pass::Cooldown).next().unwrap();
    assert_eq!(cooldown.attempted, 1);
    // Two listing attempts, one busy-backlog attempt, one after the cooldown
    assert_eq!(log.download_count("p2"), 4);
    assert_eq!(summary.abandoned().collect::<Vec<_>>(), vec!["p2"]);
}

#[tokio::test(start_paused = true)]
async fn test_entry_failing_in_two_listings_is_swept_once() {
    let stub = StubCatalog::new()
        .listing("A", "a1", &[&["p3"]])
        .listing("B", "b1", &[&["p3"]])
        .script(
            "p3",
            vec![
                RequestError("reset".to_string()),
                RequestError("reset".to_string()),
                Success,
            ],
        );
    let log = stub.log();

    let summary = crawler(stub).run().await.unwrap();

    assert_eq!(summary.final_sweep, vec!["p3"]);
    let sweep = summary.passes_of(Pass::FinalSweep).next().unwrap();
    assert_eq!(sweep.attempted, 1);
    assert_eq!(log.download_count("p3"), 3);
    assert_eq!(summary.downloaded, set(&["p3"]));
}

#[tokio::test(start_paused = true)]
async fn test_category_failure_ends_run() {
    let stub = StubCatalog::new()
        .listing("A", "a1", &[&["p1"]])
        .fail_categories();
    let log = stub.log();

    let err = crawler(stub).run().await.unwrap_err();

    assert!(matches!(err, CrawlError::Categories(_)));
    assert!(log.downloads().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_cooldown_skips_remaining_passes() {
    let stub = StubCatalog::new()
        .listing("A", "a1", &[&["p1", "p5"]])
        .script("p1", vec![RequestError("later".to_string())])
        .script("p5", vec![Busy, Busy]);
    let log = stub.log();
    let shutdown = ShutdownCoordinator::shared();
    let trigger = Arc::clone(&shutdown);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(600)).await;
        trigger.request_shutdown();
    });

    let summary = Crawler::new(Box::new(stub), shutdown).run().await.unwrap();

    assert!(summary.interrupted);
    assert!(summary.cooldown_triggered);
    assert_eq!(log.download_count("p5"), 2);
    assert_eq!(log.download_count("p1"), 1);
    assert_eq!(summary.passes_of(Pass::Cooldown).count(), 0);
    assert_eq!(summary.passes_of(Pass::FinalSweep).count(), 0);
    assert_eq!(
        summary.unattempted.iter().cloned().collect::<Vec<_>>(),
        vec!["p1", "p5"]
    );

    let records = summary.outcome_records();
    assert!(records.iter().all(|r| r.outcome == "unattempted"));
}
