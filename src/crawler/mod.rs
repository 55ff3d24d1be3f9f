//! Discovery and download engine
//!
//! The engine is store-agnostic: it only sees a [`CatalogSource`](crate::catalog::CatalogSource)
//! and the closed outcome enums it returns.
//!
//! - [`listing`] grows one listing to exhaustion
//! - [`discovery`] walks the catalog tree and collects every listing
//! - [`driver`] attempts a list of entries once, with busy backoff
//! - [`orchestrator`] sequences the passes of a run

pub mod backoff;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod listing;
pub mod orchestrator;

pub use backoff::BusyBackoff;
pub use config::CrawlTiming;
pub use discovery::{discover, Discovery, DiscoveryStats};
pub use driver::{DownloadDriver, Pass, PassReport};
pub use listing::grow_to_exhaustion;
pub use orchestrator::{CrawlSummary, Crawler, DropRecord, MetadataSummary, PassSummary};

use crate::catalog::CatalogError;
use crate::output::OutputError;

/// Failures that end a crawl run
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// The catalog's top-level categories could not be listed
    #[error("failed to enumerate categories: {0}")]
    Categories(#[source] CatalogError),

    /// The outcome report could not be written
    #[error("failed to write outcome report: {0}")]
    Report(#[from] OutputError),
}
