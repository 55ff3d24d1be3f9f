//! CLI error types and conversions

use crate::catalog::CatalogError;
use crate::crawler::CrawlError;
use crate::output::OutputError;
use crate::registry::RegistryError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Registry error
    #[error("registry error: {0}")]
    RegistryError(#[from] RegistryError),

    /// Catalog source error
    #[error("catalog error: {0}")]
    CatalogError(#[from] CatalogError),

    /// Crawl error
    #[error("crawl error: {0}")]
    CrawlError(#[from] CrawlError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
