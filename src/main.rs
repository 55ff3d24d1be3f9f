//! Main entry point for the catalog-crawler CLI

use catalog_crawler::cli::{Cli, Commands, LogFile};
use catalog_crawler::shutdown::ShutdownCoordinator;
use clap::Parser;
use std::fs::File;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing with optional JSON formatting and an optional log file
///
/// `LOG_FORMAT=json` switches console output to JSON. The log file always gets
/// plain text without ANSI colours.
fn init_tracing(log_file: Option<File>) {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("catalog_crawler=info"));

    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if json_format {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Crawls log to <basedir>/logs as well; set the file up before anything is logged
    let log_setup = match &cli.command {
        Commands::Crawl(args) => Some(args.prepare_log_file()),
        Commands::Stores(_) => None,
    };
    let (log_file, setup_error) = match log_setup {
        Some(Ok(LogFile { path, file })) => (Some((path, file)), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };
    let log_path = log_file.as_ref().map(|(path, _)| path.clone());
    init_tracing(log_file.map(|(_, file)| file));

    if let Some(e) = setup_error {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
    if let Some(path) = log_path {
        info!("Logging to {}", path.display());
    }

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - finishing current entry and stopping...");
                shutdown.request_shutdown();
            }
        }
    });

    let result = match &cli.command {
        Commands::Crawl(args) => args
            .execute(cli.max_retries, shutdown.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Stores(stores_cmd) => stores_cmd.execute(),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }
}
