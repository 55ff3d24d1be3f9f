//! Listing accumulator

use crate::catalog::{CatalogError, CatalogSource, Listing, PageOutcome};
use tracing::debug;

/// Grow `listing` page by page until the source reports exhaustion
///
/// Returns the number of pages appended. On exhaustion the listing is frozen.
/// A paging failure stops growth and is returned; entries fetched before the
/// failure stay in the listing.
pub async fn grow_to_exhaustion(
    source: &dyn CatalogSource,
    listing: &mut Listing,
) -> Result<usize, CatalogError> {
    let mut pages = 0;
    loop {
        match source.more(listing).await {
            PageOutcome::Grew(added) => {
                pages += 1;
                debug!(
                    listing = %listing.name(),
                    added,
                    total = listing.len(),
                    "Listing grew"
                );
            }
            PageOutcome::Exhausted => {
                listing.mark_exhausted();
                debug!(listing = %listing.name(), entries = listing.len(), "Listing exhausted");
                return Ok(pages);
            }
            PageOutcome::Failed(e) => return Err(e),
        }
    }
}
