//! Credentials file loading
//!
//! Stores that require authentication read a small TOML file:
//!
//! ```toml
//! token = "secret-api-token"
//! base_url = "https://catalog.example.com/api"   # optional
//! ```

use super::{CatalogError, CatalogResult};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Authentication material for a catalog source
#[derive(Clone, Deserialize)]
pub struct Credentials {
    /// Bearer token sent with every request
    pub token: String,
    /// Base URL of the catalog API, overriding the registry default
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Credentials {
    /// Load credentials from a TOML file
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidCredentials`] when the file is missing,
    /// malformed or carries an empty token.
    pub fn load(path: &Path) -> CatalogResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CatalogError::InvalidCredentials(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&contents)
    }

    /// Parse credentials from TOML text
    pub fn parse(contents: &str) -> CatalogResult<Self> {
        let credentials: Credentials = toml::from_str(contents)
            .map_err(|e| CatalogError::InvalidCredentials(e.to_string()))?;

        if credentials.token.trim().is_empty() {
            return Err(CatalogError::InvalidCredentials(
                "token must not be empty".to_string(),
            ));
        }

        Ok(credentials)
    }
}

// Keep the token out of debug logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}
