//! Authenticated REST catalog source
//!
//! Speaks a small JSON protocol:
//!
//! | request | response |
//! |---|---|
//! | `GET /categories` | `[{"id", "name"}]` |
//! | `GET /categories/{id}/subcategories` | `[{"id", "name"}]` |
//! | `GET /subcategories/{id}/entries?limit=N[&cursor=C]` | `{"name"?, "entries": [Entry], "next_cursor"?}` |
//! | `GET /entries/{package}/download` | artifact bytes |
//!
//! Every request carries the bearer token from the credentials file.

use super::http::CatalogHttpClient;
use super::{
    CatalogResult, CatalogSource, Credentials, DownloadOutcome, Listing, PageOutcome,
    SourceOptions,
};
use crate::output::{MetadataWriter, StoreLayout};
use crate::{Category, Entry, Subcategory};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct NamedItem {
    id: String,
    name: String,
}

/// One page of a subcategory listing
#[derive(Debug, Deserialize)]
struct EntryPage {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    entries: Vec<Entry>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Catalog source for token-authenticated REST catalogs
pub struct RestCatalogSource {
    store: String,
    http: CatalogHttpClient,
    layout: StoreLayout,
    metadata: MetadataWriter,
    page_size: usize,
}

impl RestCatalogSource {
    /// Create a source for the catalog API at `base_url`
    pub fn new(
        store: &str,
        base_url: String,
        credentials: Credentials,
        options: SourceOptions,
    ) -> CatalogResult<Self> {
        let layout = StoreLayout::new(&options.base_dir, store);
        Ok(Self {
            store: store.to_string(),
            http: CatalogHttpClient::new(base_url, Some(credentials.token), options.max_retries)?,
            metadata: MetadataWriter::new(layout.clone()),
            layout,
            page_size: options.page_size,
        })
    }

    async fn fetch_page(
        &self,
        subcategory: &Subcategory,
        cursor: Option<&str>,
    ) -> CatalogResult<EntryPage> {
        let path = entries_path(&subcategory.id);
        let mut params = vec![("limit", self.page_size.to_string())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        self.http.get_json(&path, &params).await
    }
}

fn subcategories_path(category_id: &str) -> String {
    format!("categories/{}/subcategories", urlencoding::encode(category_id))
}

fn entries_path(subcategory_id: &str) -> String {
    format!("subcategories/{}/entries", urlencoding::encode(subcategory_id))
}

fn download_path(package_name: &str) -> String {
    format!("entries/{}/download", urlencoding::encode(package_name))
}

#[async_trait]
impl CatalogSource for RestCatalogSource {
    fn store(&self) -> &str {
        &self.store
    }

    async fn categories(&self) -> CatalogResult<Vec<Category>> {
        let items: Vec<NamedItem> = self.http.get_json("categories", &[]).await?;
        Ok(items
            .into_iter()
            .map(|item| Category::new(item.id, item.name))
            .collect())
    }

    async fn subcategories(&self, category: &Category) -> CatalogResult<Vec<Subcategory>> {
        let path = subcategories_path(&category.id);
        let items: Vec<NamedItem> = self.http.get_json(&path, &[]).await?;
        Ok(items
            .into_iter()
            .map(|item| Subcategory::new(item.id, item.name, category))
            .collect())
    }

    async fn discover_apps(&self, subcategory: &Subcategory) -> CatalogResult<Option<Listing>> {
        let page = self.fetch_page(subcategory, None).await?;
        if page.entries.is_empty() {
            return Ok(None);
        }
        let name = page.name.unwrap_or_else(|| subcategory.name.clone());
        Ok(Some(Listing::new(
            name,
            subcategory.clone(),
            page.entries,
            page.next_cursor,
        )))
    }

    async fn more(&self, listing: &mut Listing) -> PageOutcome {
        let Some(cursor) = listing.cursor().map(str::to_string) else {
            return PageOutcome::Exhausted;
        };
        match self.fetch_page(listing.subcategory(), Some(&cursor)).await {
            Ok(page) if page.entries.is_empty() => PageOutcome::Exhausted,
            Ok(page) => PageOutcome::Grew(listing.append_page(page.entries, page.next_cursor)),
            Err(e) => PageOutcome::Failed(e),
        }
    }

    async fn download(&self, entry: &Entry) -> DownloadOutcome {
        let url = entry
            .download_url
            .clone()
            .unwrap_or_else(|| self.http.url(&download_path(&entry.package_name)));
        let dest = self.layout.apk_path(&entry.package_name);
        debug!(package = %entry.package_name, url = %url, "Downloading");
        self.http
            .download_to_file(&url, &dest, entry.sha256.as_deref())
            .await
    }

    async fn write_metadata(&self, entry: &Entry) -> CatalogResult<()> {
        self.metadata.write(entry).await?;
        Ok(())
    }
}
