//! # Catalog Crawler Library
//!
//! Discovers and downloads application packages from paginated app store catalogs.
//! The library copes with rate limiting, transient errors and entries that show up
//! under several overlapping listings.
//!
//! ## Features
//!
//! - **Pluggable Catalogs**: every store sits behind the [`catalog::CatalogSource`] trait
//! - **Full Enumeration**: category → subcategory → listing, paginated to exhaustion
//! - **Deduplication**: an entry is downloaded at most once per run
//! - **Tiered Retry**: per-listing pass, busy-backlog pass, cooldown pass, final sweep
//! - **Busy Backoff**: exponential waits while the remote reports overload
//! - **Metadata Mode**: persist entry metadata without downloading payloads
//!
//! ## Quick Start
//!
//! ```no_run
//! use catalog_crawler::catalog::{create_source, SourceOptions};
//! use catalog_crawler::crawler::Crawler;
//! use catalog_crawler::registry::StoreRegistry;
//! use catalog_crawler::shutdown::ShutdownCoordinator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = StoreRegistry::load()?;
//! let store = registry.get("fdroid")?;
//! let source = create_source(store, SourceOptions::new("/tmp/crawl"))?;
//!
//! let crawler = Crawler::new(source, ShutdownCoordinator::shared());
//! let summary = crawler.run().await?;
//! println!("downloaded {} of {}", summary.downloaded.len(), summary.discovered.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`catalog`] - Catalog source contract and the concrete store backends
//! - [`crawler`] - Discovery planner, download driver and crawl orchestrator
//! - [`registry`] - Registry of supported stores
//! - [`output`] - Artifact layout, metadata files and outcome reports
//! - [`metrics`] - Prometheus metrics for crawl progress
//! - [`shutdown`] - Cooperative cancellation

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// CLI command implementations
pub mod cli;

/// Catalog sources
pub mod catalog;

/// Discovery and download engine
pub mod crawler;

/// Crawl metrics
pub mod metrics;

/// Artifact and report output
pub mod output;

/// Store registry
pub mod registry;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

pub use catalog::{CatalogSource, DownloadOutcome, Listing, PageOutcome};

/// Top-level grouping of a catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    /// Source-specific identifier
    pub id: String,
    /// Display name
    pub name: String,
}

impl Category {
    /// Create a category
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Second-level grouping; each subcategory owns one paginated listing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subcategory {
    /// Source-specific identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Identifier of the parent category
    pub category_id: String,
}

impl Subcategory {
    /// Create a subcategory under `category`
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: &Category) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category_id: category.id.clone(),
        }
    }
}

impl fmt::Display for Subcategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// One catalog item
///
/// `package_name` is globally unique within a store and is the only field the
/// engine interprets. Everything else belongs to the source that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique package identifier (e.g. "org.fdroid.fdroid")
    pub package_name: String,
    /// Display title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Version code of the artifact the source will download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_code: Option<u64>,
    /// Direct artifact URL, when the source knows it up front
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// Expected SHA-256 of the artifact (lowercase hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Artifact size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Subcategory context, attached by metadata-only discovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Subcategory>,
    /// Free-form source metadata
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl Entry {
    /// Create an entry carrying only its package name
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            title: None,
            version_code: None,
            download_url: None,
            sha256: None,
            size: None,
            category: None,
            details: serde_json::Value::Null,
        }
    }

    /// Unique identifier of this entry
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Copy of this entry with its subcategory context attached
    pub fn with_category(&self, subcategory: &Subcategory) -> Self {
        let mut entry = self.clone();
        entry.category = Some(subcategory.clone());
        entry
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.title, self.version_code) {
            (Some(title), Some(code)) => write!(f, "{} ({title}, v{code})", self.package_name),
            (Some(title), None) => write!(f, "{} ({title})", self.package_name),
            _ => write!(f, "{}", self.package_name),
        }
    }
}
