//! F-Droid repository source
//!
//! F-Droid publishes its whole catalog as a single `index-v1.json`. The index is
//! fetched once per run and then served to the engine in pages so that F-Droid
//! goes through the same discovery path as remotely paginated stores.
//!
//! F-Droid has a flat category list; each category maps to exactly one
//! subcategory of the same name.

use super::fdroid_parser::FdroidIndex;
use super::http::{verify_apk, CatalogHttpClient};
use super::{
    CatalogError, CatalogResult, CatalogSource, DownloadOutcome, Listing, PageOutcome,
    SourceOptions,
};
use crate::output::{MetadataWriter, StoreLayout};
use crate::{Category, Entry, Subcategory};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const INDEX_PATH: &str = "index-v1.json";

/// Catalog source backed by an F-Droid repository
pub struct FdroidSource {
    store: String,
    http: CatalogHttpClient,
    layout: StoreLayout,
    metadata: MetadataWriter,
    page_size: usize,
    index: OnceCell<Arc<FdroidIndex>>,
}

impl FdroidSource {
    /// Create a source for the repository at `base_url`
    pub fn new(store: &str, base_url: String, options: SourceOptions) -> CatalogResult<Self> {
        let layout = StoreLayout::new(&options.base_dir, store);
        Ok(Self {
            store: store.to_string(),
            http: CatalogHttpClient::new(base_url, None, options.max_retries)?,
            metadata: MetadataWriter::new(layout.clone()),
            layout,
            page_size: options.page_size,
            index: OnceCell::new(),
        })
    }

    /// Create a source over an already parsed index
    pub fn with_index(
        store: &str,
        base_url: String,
        options: SourceOptions,
        index: FdroidIndex,
    ) -> CatalogResult<Self> {
        let source = Self::new(store, base_url, options)?;
        source
            .index
            .set(Arc::new(index))
            .map_err(|_| CatalogError::ParseError("index already loaded".to_string()))?;
        Ok(source)
    }

    async fn index(&self) -> CatalogResult<Arc<FdroidIndex>> {
        self.index
            .get_or_try_init(|| async {
                info!("Fetching F-Droid index from {}", self.http.url(INDEX_PATH));
                let raw: serde_json::Value = self.http.get_json(INDEX_PATH, &[]).await?;
                let index = FdroidIndex::from_value(raw, self.http.base_url())?;
                info!(
                    categories = index.category_names().len(),
                    "F-Droid index loaded"
                );
                Ok::<_, CatalogError>(Arc::new(index))
            })
            .await
            .cloned()
    }
}

fn parse_cursor(cursor: &str) -> Result<usize, CatalogError> {
    cursor
        .parse()
        .map_err(|_| CatalogError::ParseError(format!("invalid listing cursor '{cursor}'")))
}

#[async_trait]
impl CatalogSource for FdroidSource {
    fn store(&self) -> &str {
        &self.store
    }

    async fn categories(&self) -> CatalogResult<Vec<Category>> {
        let index = self.index().await?;
        Ok(index
            .category_names()
            .into_iter()
            .map(|name| Category::new(name.clone(), name))
            .collect())
    }

    async fn subcategories(&self, category: &Category) -> CatalogResult<Vec<Subcategory>> {
        Ok(vec![Subcategory::new(
            category.id.clone(),
            category.name.clone(),
            category,
        )])
    }

    async fn discover_apps(&self, subcategory: &Subcategory) -> CatalogResult<Option<Listing>> {
        let index = self.index().await?;
        let (entries, next) = index.page(&subcategory.id, 0, self.page_size);
        if entries.is_empty() {
            return Ok(None);
        }
        Ok(Some(Listing::new(
            subcategory.name.clone(),
            subcategory.clone(),
            entries,
            next.map(|n| n.to_string()),
        )))
    }

    async fn more(&self, listing: &mut Listing) -> PageOutcome {
        let Some(cursor) = listing.cursor() else {
            return PageOutcome::Exhausted;
        };
        let offset = match parse_cursor(cursor) {
            Ok(offset) => offset,
            Err(e) => return PageOutcome::Failed(e),
        };
        let index = match self.index().await {
            Ok(index) => index,
            Err(e) => return PageOutcome::Failed(e),
        };

        let (entries, next) = index.page(&listing.subcategory().id, offset, self.page_size);
        if entries.is_empty() {
            return PageOutcome::Exhausted;
        }
        PageOutcome::Grew(listing.append_page(entries, next.map(|n| n.to_string())))
    }

    async fn download(&self, entry: &Entry) -> DownloadOutcome {
        let Some(url) = entry.download_url.as_deref() else {
            return DownloadOutcome::RequestError(format!(
                "{} has no published package",
                entry.package_name
            ));
        };

        let dest = self.layout.apk_path(&entry.package_name);
        let outcome = self
            .http
            .download_to_file(url, &dest, entry.sha256.as_deref())
            .await;
        if outcome != DownloadOutcome::Success {
            return outcome;
        }

        let check_path = dest.clone();
        match tokio::task::spawn_blocking(move || verify_apk(&check_path)).await {
            Ok(Ok(())) => {
                debug!(package = %entry.package_name, path = %dest.display(), "APK stored");
                DownloadOutcome::Success
            }
            Ok(Err(reason)) => {
                let _ = tokio::fs::remove_file(&dest).await;
                DownloadOutcome::RequestError(reason)
            }
            Err(e) => DownloadOutcome::RequestError(format!("APK validation task failed: {e}")),
        }
    }

    async fn write_metadata(&self, entry: &Entry) -> CatalogResult<()> {
        self.metadata.write(entry).await?;
        Ok(())
    }
}
