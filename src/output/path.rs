//! Storage layout under the crawl base directory
//!
//! ```text
//! <base_dir>/
//!   logs/<timestamp>.log
//!   apks/<store>/<package>.apk
//!   metadata/<store>/<subcategory>/<package>.json
//! ```
//!
//! Every path component coming from a remote catalog is sanitized so that a
//! hostile package or category name cannot escape the base directory.

use crate::Entry;
use std::path::{Path, PathBuf};

const LOGS_DIR: &str = "logs";
const APKS_DIR: &str = "apks";
const METADATA_DIR: &str = "metadata";
const UNCATEGORIZED_DIR: &str = "uncategorized";

/// Path builder for one store's artifacts
#[derive(Debug, Clone)]
pub struct StoreLayout {
    base_dir: PathBuf,
    store: String,
}

impl StoreLayout {
    /// Layout for `store` rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>, store: &str) -> Self {
        Self {
            base_dir: base_dir.into(),
            store: sanitize_component(&store.to_lowercase()),
        }
    }

    /// Base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory holding log files
    pub fn logs_dir(base_dir: &Path) -> PathBuf {
        base_dir.join(LOGS_DIR)
    }

    /// Directory holding this store's artifacts
    pub fn apk_dir(&self) -> PathBuf {
        self.base_dir.join(APKS_DIR).join(&self.store)
    }

    /// Artifact path for a package
    pub fn apk_path(&self, package_name: &str) -> PathBuf {
        self.apk_dir()
            .join(format!("{}.apk", sanitize_component(package_name)))
    }

    /// Metadata path for an entry, grouped by its attached subcategory
    pub fn metadata_path(&self, entry: &Entry) -> PathBuf {
        let group = entry
            .category
            .as_ref()
            .map(|sub| sanitize_component(&sub.id))
            .unwrap_or_else(|| UNCATEGORIZED_DIR.to_string());

        self.base_dir
            .join(METADATA_DIR)
            .join(&self.store)
            .join(group)
            .join(format!("{}.json", sanitize_component(&entry.package_name)))
    }
}

/// Sanitize a single path component
///
/// Replaces directory separators and `:` with `_` and neutralises `..`.
/// An empty result becomes `_`.
pub fn sanitize_component(name: &str) -> String {
    let cleaned = name
        .trim()
        .replace("..", "__")
        .replace(['/', '\\', ':'], "_");
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
