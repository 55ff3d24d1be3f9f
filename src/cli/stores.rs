//! CLI command for listing supported stores

use crate::registry::{StoreEntry, StoreRegistry};
use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

/// Stores subcommand
#[derive(Debug, Args)]
pub struct StoresCommand {
    #[command(subcommand)]
    action: StoresAction,
}

/// Stores actions
#[derive(Debug, clap::Subcommand)]
enum StoresAction {
    /// List all supported stores
    List {
        /// Output format
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },
}

/// Output format for the stores command
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

impl StoresCommand {
    /// Execute the stores command
    pub fn execute(&self) -> Result<()> {
        match &self.action {
            StoresAction::List { format } => {
                let registry = StoreRegistry::load()?;
                println!("{}", render_store_list(&registry.list_all(), *format)?);
                Ok(())
            }
        }
    }
}

/// Render the store list in the requested format
pub fn render_store_list(stores: &[&StoreEntry], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = stores
                .iter()
                .map(|store| {
                    json!({
                        "name": store.name,
                        "aliases": store.aliases,
                        "kind": store.kind.to_string(),
                        "default_base_url": store.default_base_url,
                        "requires_credentials": store.requires_credentials,
                        "description": store.description,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&rows).context("Failed to serialize stores to JSON")
        }
        OutputFormat::Human => {
            let mut out = format!("Found {} stores:\n", stores.len());
            for store in stores {
                let credentials = if store.requires_credentials {
                    "credentials required"
                } else {
                    "no credentials"
                };
                out.push_str(&format!(
                    "\n{} | {} | {} | {}\n    {}",
                    store.name,
                    store.kind,
                    store.default_base_url.as_deref().unwrap_or("-"),
                    credentials,
                    store.description
                ));
            }
            Ok(out)
        }
    }
}
