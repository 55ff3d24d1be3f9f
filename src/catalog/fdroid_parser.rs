//! F-Droid repository index parsing
//!
//! Parses `index-v1.json` into a [`FdroidIndex`] grouping entries by category.
//! Only the fields the crawler needs are decoded; everything else is ignored.

use super::{CatalogError, CatalogResult};
use crate::Entry;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

/// Category used for apps that declare none
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Deserialize)]
struct RawIndex {
    #[serde(default)]
    apps: Vec<RawApp>,
    #[serde(default)]
    packages: HashMap<String, Vec<RawPackage>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawApp {
    package_name: String,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    suggested_version_code: Option<Value>,
    #[serde(default)]
    localized: Option<HashMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPackage {
    apk_name: String,
    #[serde(default)]
    version_code: Option<u64>,
    #[serde(default)]
    version_name: Option<String>,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    hash_type: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

/// Parsed repository index: entries grouped by category, both sorted
#[derive(Debug, Clone, Default)]
pub struct FdroidIndex {
    categories: BTreeMap<String, Vec<Entry>>,
}

impl FdroidIndex {
    /// Parse an `index-v1.json` document
    ///
    /// `repo_url` is used to build artifact URLs (`<repo_url>/<apkName>`).
    ///
    /// # Errors
    /// Returns [`CatalogError::ParseError`] if the document is not a valid index.
    pub fn parse(json: &str, repo_url: &str) -> CatalogResult<Self> {
        let raw: RawIndex = serde_json::from_str(json)
            .map_err(|e| CatalogError::ParseError(format!("invalid F-Droid index: {e}")))?;
        Ok(Self::from_raw(raw, repo_url))
    }

    /// Build an index from an already decoded JSON document
    pub fn from_value(value: Value, repo_url: &str) -> CatalogResult<Self> {
        let raw: RawIndex = serde_json::from_value(value)
            .map_err(|e| CatalogError::ParseError(format!("invalid F-Droid index: {e}")))?;
        Ok(Self::from_raw(raw, repo_url))
    }

    fn from_raw(raw: RawIndex, repo_url: &str) -> Self {
        let repo_url = repo_url.trim_end_matches('/');
        let mut categories: BTreeMap<String, Vec<Entry>> = BTreeMap::new();

        for app in raw.apps {
            let packages = raw
                .packages
                .get(&app.package_name)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let entry = build_entry(&app, packages, repo_url);

            if app.categories.is_empty() {
                categories
                    .entry(UNCATEGORIZED.to_string())
                    .or_default()
                    .push(entry);
            } else {
                for category in &app.categories {
                    categories
                        .entry(category.clone())
                        .or_default()
                        .push(entry.clone());
                }
            }
        }

        for entries in categories.values_mut() {
            entries.sort_by(|a, b| a.package_name.cmp(&b.package_name));
        }

        Self { categories }
    }

    /// Category names in sorted order
    pub fn category_names(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    /// Entries of a category in package-name order
    pub fn entries(&self, category: &str) -> &[Entry] {
        self.categories
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// One page of a category's entries starting at `offset`
    ///
    /// Returns the page and the offset of the next page, if any.
    pub fn page(&self, category: &str, offset: usize, limit: usize) -> (Vec<Entry>, Option<usize>) {
        let entries = self.entries(category);
        if offset >= entries.len() {
            return (Vec::new(), None);
        }
        let end = (offset + limit.max(1)).min(entries.len());
        let next = (end < entries.len()).then_some(end);
        (entries[offset..end].to_vec(), next)
    }
}

fn version_code(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Pick the package matching the suggested version, or the newest one
fn select_package<'a>(
    packages: &'a [RawPackage],
    suggested: Option<u64>,
) -> Option<&'a RawPackage> {
    suggested
        .and_then(|code| packages.iter().find(|p| p.version_code == Some(code)))
        .or_else(|| packages.iter().max_by_key(|p| p.version_code.unwrap_or(0)))
}

fn localized_text(app: &RawApp, field: &str) -> Option<String> {
    let localized = app.localized.as_ref()?;
    localized
        .get("en-US")
        .or_else(|| localized.values().next())
        .and_then(|loc| loc.get(field))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn build_entry(app: &RawApp, packages: &[RawPackage], repo_url: &str) -> Entry {
    let suggested = app.suggested_version_code.as_ref().and_then(version_code);
    let package = select_package(packages, suggested);

    let mut entry = Entry::new(&app.package_name);
    entry.title = app.name.clone().or_else(|| localized_text(app, "name"));

    if let Some(package) = package {
        entry.version_code = package.version_code;
        entry.download_url = Some(format!("{repo_url}/{}", package.apk_name));
        entry.size = package.size;
        // Older index entries may carry other digests; only sha256 is verifiable.
        let is_sha256 = package
            .hash_type
            .as_deref()
            .map_or(true, |t| t.eq_ignore_ascii_case("sha256"));
        if is_sha256 {
            entry.sha256 = package.hash.as_ref().map(|h| h.to_lowercase());
        }
    }

    entry.details = json!({
        "summary": app.summary.clone().or_else(|| localized_text(app, "summary")),
        "license": app.license,
        "categories": app.categories,
        "version_name": package.and_then(|p| p.version_name.clone()),
    });

    entry
}
