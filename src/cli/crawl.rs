//! Crawl command implementation

use crate::catalog::{create_source, SourceOptions, DEFAULT_PAGE_SIZE};
use crate::crawler::Crawler;
use crate::output::StoreLayout;
use crate::registry::StoreRegistry;
use crate::shutdown::SharedShutdown;
use chrono::Local;
use clap::Args;
use std::fs::File;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::CliError;

/// Largest page size accepted on the command line
const MAX_PAGE_SIZE: usize = 1000;

/// Parse and validate the listing page size
fn parse_page_size(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("page size must be at least 1".to_string());
    }
    if value > MAX_PAGE_SIZE {
        return Err(format!("page size {value} exceeds maximum of {MAX_PAGE_SIZE}"));
    }
    Ok(value)
}

/// Expand a `--basedir` value
///
/// No value means the home directory. `~` and `~/...` are expanded against
/// `home`; other relative paths are resolved against `cwd`.
pub fn expand_base_dir(
    raw: Option<&str>,
    home: Option<&Path>,
    cwd: &Path,
) -> Result<PathBuf, CliError> {
    let home_dir = || {
        home.map(Path::to_path_buf).ok_or_else(|| {
            CliError::ConfigurationError(
                "cannot determine the home directory; pass --basedir".to_string(),
            )
        })
    };

    match raw {
        None | Some("~") => home_dir(),
        Some(path) if path.starts_with("~/") => Ok(home_dir()?.join(&path[2..])),
        Some(path) if Path::new(path).is_absolute() => Ok(PathBuf::from(path)),
        Some(path) => Ok(cwd.join(path)),
    }
}

/// Open log file of a crawl run
#[derive(Debug)]
pub struct LogFile {
    /// Location of the log file
    pub path: PathBuf,
    /// Handle the file log layer writes to
    pub file: File,
}

/// Create `<base_dir>/logs/<timestamp>.log`
pub fn create_log_file(base_dir: &Path) -> Result<LogFile, CliError> {
    let logs_dir = StoreLayout::logs_dir(base_dir);
    std::fs::create_dir_all(&logs_dir).map_err(|e| {
        CliError::ConfigurationError(format!(
            "failed to create log directory {}: {e}",
            logs_dir.display()
        ))
    })?;

    let name = format!("{}.log", Local::now().format("%Y-%m-%dT%H-%M-%S%.3f"));
    let path = logs_dir.join(name);
    let file = File::create(&path).map_err(|e| {
        CliError::ConfigurationError(format!(
            "failed to create log file {}: {e}",
            path.display()
        ))
    })?;
    Ok(LogFile { path, file })
}

/// Crawl command arguments
#[derive(Args, Debug, Clone)]
pub struct CrawlArgs {
    /// Store to crawl (see `stores list`)
    #[arg(long)]
    pub store: String,

    /// Persist entry metadata instead of downloading packages
    #[arg(long, default_value_t = false)]
    pub meta: bool,

    /// Base directory for logs, packages and metadata (default: home directory)
    #[arg(long)]
    pub basedir: Option<String>,

    /// Credentials file in TOML format (`token`, optional `base_url`)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Override the store's base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Entries requested per listing page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, value_parser = parse_page_size)]
    pub page_size: usize,

    /// Write a CSV report of per-package outcomes to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Expose Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl CrawlArgs {
    /// Resolved base directory
    pub fn resolve_base_dir(&self) -> Result<PathBuf, CliError> {
        let cwd = std::env::current_dir().map_err(|e| {
            CliError::ConfigurationError(format!("cannot read the working directory: {e}"))
        })?;
        expand_base_dir(self.basedir.as_deref(), dirs::home_dir().as_deref(), &cwd)
    }

    /// Create the run's log file under the base directory
    pub fn prepare_log_file(&self) -> Result<LogFile, CliError> {
        create_log_file(&self.resolve_base_dir()?)
    }

    /// Source options for this invocation
    pub fn source_options(&self, base_dir: PathBuf, max_retries: u32) -> SourceOptions {
        SourceOptions::new(base_dir)
            .with_credentials(self.credentials.clone())
            .with_base_url(self.base_url.clone())
            .with_page_size(self.page_size)
            .with_max_retries(max_retries)
    }

    /// Execute the crawl command
    ///
    /// Configuration is validated before any network activity: an unknown
    /// store or missing credentials fail here.
    pub async fn execute(
        &self,
        max_retries: u32,
        shutdown: SharedShutdown,
    ) -> Result<(), CliError> {
        let base_dir = self.resolve_base_dir()?;
        let registry = StoreRegistry::load()?;
        let store = registry.get(&self.store)?;
        info!(
            store = %store.name,
            base_dir = %base_dir.display(),
            meta = self.meta,
            "Crawl configured"
        );

        let source = create_source(store, self.source_options(base_dir, max_retries))?;

        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr)
                .await
                .map_err(|e| CliError::ConfigurationError(format!("metrics: {e}")))?;
        }

        let crawler = Crawler::new(source, shutdown);

        if self.meta {
            let summary = crawler.crawl_metadata().await?;
            info!(
                written = summary.written,
                failed = summary.failed,
                "Metadata crawl finished"
            );
            if summary.interrupted {
                warn!("Metadata crawl was interrupted before all listings were written");
            }
            return Ok(());
        }

        let summary = crawler.run().await?;
        if let Some(path) = &self.report {
            let rows = summary.write_report(path)?;
            info!(path = %path.display(), rows, "Outcome report written");
        }
        info!(
            discovered = summary.discovered.len(),
            downloaded = summary.downloaded.len(),
            dropped = summary.dropped.len(),
            unattempted = summary.unattempted.len(),
            "Crawl finished"
        );
        Ok(())
    }
}
