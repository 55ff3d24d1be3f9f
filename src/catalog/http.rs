//! HTTP client shared by the store backends
//!
//! Provides:
//! - JSON GET requests with retry and exponential backoff for catalog metadata
//! - Streaming artifact downloads classified into [`DownloadOutcome`]s
//! - SHA-256 and APK validation of downloaded artifacts
//!
//! Catalog metadata requests (categories, listing pages) are retried here because
//! they are cheap and idempotent. Artifact downloads are never retried at this
//! level; the crawl engine owns download retries.

use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{CatalogError, CatalogResult, DownloadOutcome};
use crate::crawler::config::calculate_backoff;

/// HTTP connect timeout (seconds) - time to establish TCP connection
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP read timeout (seconds) - maximum idle time between body chunks
const HTTP_READ_TIMEOUT_SECS: u64 = 60;

/// Entry every APK archive must contain
const APK_MANIFEST: &str = "AndroidManifest.xml";

/// Build the HTTP client used by a store backend
///
/// Only connect and read timeouts are set: artifacts can be large, so an
/// overall request timeout would cut off healthy slow transfers.
pub fn build_http_client() -> CatalogResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .read_timeout(Duration::from_secs(HTTP_READ_TIMEOUT_SECS))
        .user_agent(concat!("catalog-crawler/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CatalogError::HttpError(format!("failed to build HTTP client: {e}")))
}

/// Classify an HTTP status of an artifact download
///
/// Returns `None` for success statuses.
pub fn classify_status(status: StatusCode) -> Option<DownloadOutcome> {
    if status.is_success() {
        return None;
    }
    match status.as_u16() {
        429 | 503 => Some(DownloadOutcome::Busy),
        408 | 500 | 502 | 504 => Some(DownloadOutcome::RetryRequested),
        code => Some(DownloadOutcome::RequestError(format!(
            "unexpected HTTP status {code}"
        ))),
    }
}

/// Check that the file at `path` is an APK (a zip archive with a manifest)
pub fn verify_apk(path: &Path) -> Result<(), String> {
    let file = std::fs::File::open(path).map_err(|e| format!("cannot open artifact: {e}"))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| format!("artifact is not a zip archive: {e}"))?;
    archive
        .by_name(APK_MANIFEST)
        .map(|_| ())
        .map_err(|_| format!("artifact has no {APK_MANIFEST}"))
}

/// HTTP client bound to one catalog base URL
#[derive(Clone)]
pub struct CatalogHttpClient {
    client: Client,
    base_url: String,
    bearer: Option<String>,
    max_retries: u32,
}

impl CatalogHttpClient {
    /// Create a client for `base_url`
    pub fn new(
        base_url: impl Into<String>,
        bearer: Option<String>,
        max_retries: u32,
    ) -> CatalogResult<Self> {
        let base_url: String = base_url.into();
        Ok(Self {
            client: build_http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer,
            max_retries,
        })
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Configured retry count for metadata requests
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Absolute URL for a path relative to the base URL
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// GET a JSON document, retrying network errors, 429 and 5xx responses
    ///
    /// # Errors
    /// Returns the last error once retries are exhausted, or immediately on
    /// 4xx client errors and undecodable bodies.
    pub async fn get_json<T>(&self, path: &str, params: &[(&str, String)]) -> CatalogResult<T>
    where
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            debug!("GET {} (attempt {}/{})", url, attempt + 1, self.max_retries + 1);

            let response = match self.request(&url).query(params).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(
                        "Network error on attempt {}/{}: {}",
                        attempt + 1,
                        self.max_retries + 1,
                        e
                    );
                    last_error = Some(CatalogError::NetworkError(e.to_string()));
                    if attempt < self.max_retries {
                        tokio::time::sleep(calculate_backoff(attempt)).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                warn!(
                    "{} returned {} on attempt {}/{}",
                    url,
                    status,
                    attempt + 1,
                    self.max_retries + 1
                );
                last_error = Some(if status == StatusCode::TOO_MANY_REQUESTS {
                    CatalogError::RateLimitExceeded
                } else {
                    CatalogError::HttpError(format!("server error: {status}"))
                });
                if attempt < self.max_retries {
                    tokio::time::sleep(calculate_backoff(attempt)).await;
                    continue;
                }
                break;
            }

            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown error".to_string());
                return Err(CatalogError::HttpError(format!(
                    "client error {status}: {body}"
                )));
            }

            return response
                .json::<T>()
                .await
                .map_err(|e| CatalogError::ParseError(format!("failed to decode {url}: {e}")));
        }

        Err(last_error
            .unwrap_or_else(|| CatalogError::NetworkError("all retries exhausted".to_string())))
    }

    /// Stream an artifact to `dest`
    ///
    /// The body is written to a `.part` sibling and only renamed into place once
    /// it is complete and, when `expected_sha256` is given, verified.
    pub async fn download_to_file(
        &self,
        url: &str,
        dest: &Path,
        expected_sha256: Option<&str>,
    ) -> DownloadOutcome {
        let response = match self.request(url).send().await {
            Ok(resp) => resp,
            Err(e) => return DownloadOutcome::RequestError(format!("{url}: {e}")),
        };

        if let Some(outcome) = classify_status(response.status()) {
            debug!("{} answered {}", url, response.status());
            return outcome;
        }

        if let Some(parent) = dest.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return DownloadOutcome::RequestError(format!(
                    "cannot create {}: {e}",
                    parent.display()
                ));
            }
        }

        let part = dest.with_extension("part");
        let mut file = match tokio::fs::File::create(&part).await {
            Ok(f) => f,
            Err(e) => {
                return DownloadOutcome::RequestError(format!(
                    "cannot create {}: {e}",
                    part.display()
                ))
            }
        };

        let mut hasher = Sha256::new();
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&part).await;
                    return DownloadOutcome::RequestError(format!("transfer of {url} failed: {e}"));
                }
            };
            hasher.update(&chunk);
            written += chunk.len() as u64;
            if let Err(e) = file.write_all(&chunk).await {
                let _ = tokio::fs::remove_file(&part).await;
                return DownloadOutcome::RequestError(format!("write failed: {e}"));
            }
        }
        if let Err(e) = file.flush().await {
            let _ = tokio::fs::remove_file(&part).await;
            return DownloadOutcome::RequestError(format!("flush failed: {e}"));
        }
        drop(file);

        if let Some(expected) = expected_sha256 {
            let actual = format!("{:x}", hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                let _ = tokio::fs::remove_file(&part).await;
                return DownloadOutcome::RequestError(format!(
                    "checksum mismatch: expected {expected}, got {actual}"
                ));
            }
        }

        if let Err(e) = tokio::fs::rename(&part, dest).await {
            return DownloadOutcome::RequestError(format!(
                "cannot move artifact into {}: {e}",
                dest.display()
            ));
        }

        debug!("Stored {} bytes at {}", written, dest.display());
        DownloadOutcome::Success
    }
}
