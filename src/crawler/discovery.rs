//! Discovery planner
//!
//! Walks category → subcategory → listing and grows every listing to exhaustion.
//! Listings are returned in discovery order; the same package may appear in
//! several of them.

use super::listing::grow_to_exhaustion;
use super::CrawlError;
use crate::catalog::{CatalogSource, Listing};
use crate::shutdown::ShutdownCoordinator;
use crate::Subcategory;
use std::collections::HashSet;
use tracing::{info, warn};

/// Counters collected while discovering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    /// Categories enumerated
    pub categories: usize,
    /// Subcategories enumerated across all categories
    pub subcategories: usize,
    /// Categories whose subcategories could not be listed
    pub failed_categories: usize,
    /// Subcategories without a listing, or whose first page failed
    pub skipped_subcategories: usize,
    /// Listings discarded because paging failed part way
    pub failed_listings: usize,
    /// Sum of all listing sizes
    pub raw_entries: usize,
    /// Distinct package names across all listings
    pub unique_entries: usize,
}

/// Result of discovery
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Exhausted listings in discovery order
    pub listings: Vec<Listing>,
    /// Discovery counters
    pub stats: DiscoveryStats,
    /// Discovery stopped early because shutdown was requested
    pub interrupted: bool,
}

impl Discovery {
    /// Distinct package names across all listings
    pub fn unique_packages(&self) -> HashSet<String> {
        self.listings
            .iter()
            .flat_map(|listing| listing.iter())
            .map(|entry| entry.package_name.clone())
            .collect()
    }
}

/// Enumerate every listing of `source` and grow each to exhaustion
///
/// # Errors
/// Returns [`CrawlError::Categories`] if the top-level categories cannot be listed.
/// Every other failure skips the affected category, subcategory or page.
pub async fn discover(
    source: &dyn CatalogSource,
    shutdown: &ShutdownCoordinator,
) -> Result<Discovery, CrawlError> {
    let categories = source
        .categories()
        .await
        .map_err(CrawlError::Categories)?;

    let mut discovery = Discovery::default();
    discovery.stats.categories = categories.len();

    let mut subcategories: Vec<Subcategory> = Vec::new();
    for category in &categories {
        if shutdown.is_shutdown_requested() {
            discovery.interrupted = true;
            break;
        }
        match source.subcategories(category).await {
            Ok(subs) => subcategories.extend(subs),
            Err(e) => {
                warn!(category = %category.name, error = %e, "Skipping category");
                discovery.stats.failed_categories += 1;
            }
        }
    }
    discovery.stats.subcategories = subcategories.len();
    info!(
        categories = categories.len(),
        subcategories = subcategories.len(),
        "Enumerated catalog tree"
    );

    for subcategory in &subcategories {
        if discovery.interrupted || shutdown.is_shutdown_requested() {
            discovery.interrupted = true;
            break;
        }

        let mut listing = match source.discover_apps(subcategory).await {
            Ok(Some(listing)) if !listing.is_empty() => listing,
            Ok(_) => {
                discovery.stats.skipped_subcategories += 1;
                continue;
            }
            Err(e) => {
                warn!(subcategory = %subcategory.name, error = %e, "Skipping subcategory");
                discovery.stats.skipped_subcategories += 1;
                continue;
            }
        };

        if let Err(e) = grow_to_exhaustion(source, &mut listing).await {
            warn!(
                listing = %listing.name(),
                fetched = listing.len(),
                error = %e,
                "Paging failed, discarding listing"
            );
            discovery.stats.failed_listings += 1;
            continue;
        }
        info!(listing = %listing.name(), entries = listing.len(), "Listing discovered");
        discovery.stats.raw_entries += listing.len();
        discovery.listings.push(listing);
    }

    discovery.stats.unique_entries = discovery.unique_packages().len();
    info!(
        listings = discovery.listings.len(),
        raw_entries = discovery.stats.raw_entries,
        unique_entries = discovery.stats.unique_entries,
        "Discovery complete"
    );
    crate::metrics::record_discovery(
        source.store(),
        discovery.listings.len(),
        discovery.stats.raw_entries,
    );

    Ok(discovery)
}
