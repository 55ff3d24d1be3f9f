//! CLI command implementations

use clap::{Parser, Subcommand};

pub mod crawl;
pub mod error;
pub mod stores;

pub use crawl::{CrawlArgs, LogFile};
pub use error::CliError;
pub use stores::StoresCommand;

/// Catalog crawler CLI
#[derive(Parser, Debug)]
#[command(name = "catalog-crawler")]
#[command(about = "Crawl an app store catalog for packages and metadata", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Maximum number of retries for catalog metadata requests (default: 5, range: 0-20)
    #[arg(
        long,
        global = true,
        default_value = "5",
        value_parser = clap::value_parser!(u32).range(0..=20)
    )]
    pub max_retries: u32,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl a store: download every package, or only its metadata with --meta
    Crawl(CrawlArgs),

    /// Inspect the supported stores
    Stores(StoresCommand),
}
