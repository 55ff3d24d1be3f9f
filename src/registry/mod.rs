//! Registry of supported stores
//!
//! The registry is embedded at compile time and lists every store the crawler
//! can be pointed at, with the backend it uses and its configuration needs.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Embedded registry data
const REGISTRY_JSON: &str = include_str!("stores.json");

/// Global registry instance (loaded once)
static REGISTRY: Lazy<Result<StoreRegistry, RegistryError>> =
    Lazy::new(|| StoreRegistry::from_json(REGISTRY_JSON));

/// Backend implementation used for a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// F-Droid repository index
    Fdroid,
    /// Token-authenticated REST catalog
    Rest,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fdroid => write!(f, "fdroid"),
            Self::Rest => write!(f, "rest"),
        }
    }
}

/// A single store in the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEntry {
    /// Canonical store name, also used in storage paths
    pub name: String,
    /// Alternative names accepted on the command line
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Backend implementation
    pub kind: StoreKind,
    /// Base URL used when none is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_base_url: Option<String>,
    /// Whether a credentials file is mandatory
    #[serde(default)]
    pub requires_credentials: bool,
    /// Human readable description
    pub description: String,
}

impl StoreEntry {
    /// Whether `name` refers to this store (case-insensitive, aliases included)
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(name))
    }
}

/// Raw registry structure for deserialization
#[derive(Debug, Deserialize)]
struct RawRegistry {
    schema_version: String,
    stores: Vec<StoreEntry>,
}

/// Registry of supported stores
#[derive(Debug, Clone)]
pub struct StoreRegistry {
    schema_version: String,
    stores: BTreeMap<String, StoreEntry>,
}

impl StoreRegistry {
    /// Load the embedded registry
    ///
    /// The registry is parsed once and cached for the life of the process.
    pub fn load() -> Result<&'static Self, RegistryError> {
        REGISTRY.as_ref().map_err(Clone::clone)
    }

    /// Parse registry from JSON string
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let raw: RawRegistry = serde_json::from_str(json)
            .map_err(|e| RegistryError::ParseError(format!("Failed to parse registry: {e}")))?;

        let mut stores = BTreeMap::new();
        for store in raw.stores {
            let key = store.name.to_lowercase();
            if stores.contains_key(&key) {
                return Err(RegistryError::ParseError(format!(
                    "duplicate store '{}'",
                    store.name
                )));
            }
            stores.insert(key, store);
        }

        Ok(Self {
            schema_version: raw.schema_version,
            stores,
        })
    }

    /// Registry schema version
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Look up a store by name or alias
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownStore`] listing the known stores.
    pub fn get(&self, name: &str) -> Result<&StoreEntry, RegistryError> {
        self.stores
            .get(&name.to_lowercase())
            .or_else(|| self.stores.values().find(|store| store.matches(name)))
            .ok_or_else(|| RegistryError::UnknownStore {
                name: name.to_string(),
                known: self.names().join(", "),
            })
    }

    /// All stores sorted by name
    pub fn list_all(&self) -> Vec<&StoreEntry> {
        self.stores.values().collect()
    }

    /// Canonical names of all stores, sorted
    pub fn names(&self) -> Vec<&str> {
        self.stores.values().map(|store| store.name.as_str()).collect()
    }
}

/// Errors that can occur when working with the registry
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// Failed to parse registry JSON
    #[error("registry parse error: {0}")]
    ParseError(String),

    /// Store not found in registry
    #[error("unknown store '{name}' (known stores: {known})")]
    UnknownStore {
        /// Requested name
        name: String,
        /// Comma separated list of known stores
        known: String,
    },
}
