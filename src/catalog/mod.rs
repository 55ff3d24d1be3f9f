//! Catalog source contract and store backends
//!
//! The crawl engine only ever talks to a [`CatalogSource`]. Each remote store
//! (F-Droid, authenticated REST catalogs, ...) implements the trait and owns
//! everything store-specific: page parsing, authentication, artifact storage.
//!
//! Outcomes of paging and downloading are closed enums ([`PageOutcome`],
//! [`DownloadOutcome`]) so the engine's classification is checked exhaustively.

use crate::registry::{StoreEntry, StoreKind};
use crate::{Category, Entry, Subcategory};
use async_trait::async_trait;
use std::path::PathBuf;

pub mod credentials;
pub mod fdroid;
pub mod fdroid_parser;
pub mod http;
pub mod rest;

pub use credentials::Credentials;

/// Default number of entries requested per listing page
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Catalog source errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network error
    #[error("network error: {0}")]
    NetworkError(String),

    /// Rate limit exceeded while fetching catalog metadata
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// Local filesystem error
    #[error("IO error: {0}")]
    IoError(String),

    /// A store that requires credentials was configured without them
    #[error("store '{0}' requires a credentials file")]
    MissingCredentials(String),

    /// Credentials file could not be read or parsed
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Store has no usable base URL
    #[error("store '{0}' has no base URL configured")]
    MissingBaseUrl(String),

    /// Output error while persisting metadata
    #[error("output error: {0}")]
    OutputError(#[from] crate::output::OutputError),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Result of asking a listing for its next page
#[derive(Debug)]
pub enum PageOutcome {
    /// The listing grew by this many entries
    Grew(usize),
    /// No further pages exist
    Exhausted,
    /// Paging failed; the listing cannot grow further
    Failed(CatalogError),
}

/// Result of downloading a single entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Artifact stored
    Success,
    /// Remote is overloaded; back off before continuing
    Busy,
    /// Remote acknowledged a transient failure and asked for a retry
    RetryRequested,
    /// Unclassified failure
    RequestError(String),
}

impl DownloadOutcome {
    /// Short label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Busy => "busy",
            Self::RetryRequested => "retry_requested",
            Self::RequestError(_) => "request_error",
        }
    }
}

/// Paginated collection of entries belonging to one subcategory
///
/// Created by [`CatalogSource::discover_apps`], grown in place by
/// [`CatalogSource::more`] and frozen once the source reports exhaustion.
#[derive(Debug, Clone)]
pub struct Listing {
    name: String,
    subcategory: Subcategory,
    entries: Vec<Entry>,
    cursor: Option<String>,
    pages: usize,
    exhausted: bool,
}

impl Listing {
    /// Create a listing from its first page
    ///
    /// `cursor` is the source's continuation token; `None` means the first page
    /// was also the last one.
    pub fn new(
        name: impl Into<String>,
        subcategory: Subcategory,
        entries: Vec<Entry>,
        cursor: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            subcategory,
            entries,
            cursor,
            pages: 1,
            exhausted: false,
        }
    }

    /// Listing name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subcategory this listing belongs to
    pub fn subcategory(&self) -> &Subcategory {
        &self.subcategory
    }

    /// Continuation token for the next page, if any
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Number of entries collected so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the listing holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of pages appended so far (including the first)
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Whether the source has signalled that no further pages exist
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Entries in listing order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Iterate over the entries in listing order
    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    /// Append a page and move the cursor. Returns the number of entries added.
    pub fn append_page(&mut self, entries: Vec<Entry>, next_cursor: Option<String>) -> usize {
        debug_assert!(!self.exhausted, "listing {} grown after exhaustion", self.name);
        let added = entries.len();
        self.entries.extend(entries);
        self.cursor = next_cursor;
        self.pages += 1;
        added
    }

    /// Freeze the listing
    pub fn mark_exhausted(&mut self) {
        self.exhausted = true;
        self.cursor = None;
    }
}

impl<'a> IntoIterator for &'a Listing {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Capability set the crawl engine requires from a remote store
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Store name used in logs, metrics and storage paths
    fn store(&self) -> &str;

    /// Enumerate top-level categories
    async fn categories(&self) -> CatalogResult<Vec<Category>>;

    /// Enumerate the subcategories of `category`
    async fn subcategories(&self, category: &Category) -> CatalogResult<Vec<Subcategory>>;

    /// Fetch the first page of a subcategory's listing
    ///
    /// Returns `Ok(None)` when the subcategory has no entries at all.
    async fn discover_apps(&self, subcategory: &Subcategory) -> CatalogResult<Option<Listing>>;

    /// Fetch the next page of `listing` and append it in place
    async fn more(&self, listing: &mut Listing) -> PageOutcome;

    /// Download the artifact behind `entry`
    async fn download(&self, entry: &Entry) -> DownloadOutcome;

    /// Persist the metadata of `entry`
    async fn write_metadata(&self, entry: &Entry) -> CatalogResult<()>;
}

/// Options shared by all store backends
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Base directory for artifacts and metadata
    pub base_dir: PathBuf,
    /// Path to a TOML credentials file
    pub credentials: Option<PathBuf>,
    /// Override of the store's base URL
    pub base_url: Option<String>,
    /// Entries requested per listing page
    pub page_size: usize,
    /// HTTP-level retries for catalog metadata requests
    pub max_retries: u32,
}

impl SourceOptions {
    /// Options with defaults for everything except the base directory
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            credentials: None,
            base_url: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_retries: crate::crawler::config::MAX_HTTP_RETRIES,
        }
    }

    /// Set the credentials file
    pub fn with_credentials(mut self, path: Option<PathBuf>) -> Self {
        self.credentials = path;
        self
    }

    /// Override the store's base URL
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set HTTP-level retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Create the catalog source for a registered store
///
/// Configuration preconditions (credentials, base URL) are checked here, before
/// any network activity takes place.
///
/// # Errors
/// Returns [`CatalogError::MissingCredentials`] if the store requires a credentials
/// file and none was given, or the credentials error if it cannot be loaded.
pub fn create_source(
    store: &StoreEntry,
    options: SourceOptions,
) -> CatalogResult<Box<dyn CatalogSource>> {
    let credentials = match &options.credentials {
        Some(path) => Some(Credentials::load(path)?),
        None if store.requires_credentials => {
            return Err(CatalogError::MissingCredentials(store.name.clone()));
        }
        None => None,
    };

    let base_url = options
        .base_url
        .clone()
        .or_else(|| credentials.as_ref().and_then(|c| c.base_url.clone()))
        .or_else(|| store.default_base_url.clone())
        .ok_or_else(|| CatalogError::MissingBaseUrl(store.name.clone()))?;

    match store.kind {
        StoreKind::Fdroid => Ok(Box::new(fdroid::FdroidSource::new(
            &store.name,
            base_url,
            options,
        )?)),
        StoreKind::Rest => {
            let credentials =
                credentials.ok_or_else(|| CatalogError::MissingCredentials(store.name.clone()))?;
            Ok(Box::new(rest::RestCatalogSource::new(
                &store.name,
                base_url,
                credentials,
                options,
            )?))
        }
    }
}
