//! JSON metadata files for catalog entries

use super::{OutputError, OutputResult, StoreLayout};
use crate::Entry;
use std::path::PathBuf;
use tracing::debug;

/// Writes one pretty-printed JSON document per entry
#[derive(Debug, Clone)]
pub struct MetadataWriter {
    layout: StoreLayout,
}

impl MetadataWriter {
    /// Create a writer using `layout` for file placement
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Persist `entry`, replacing any previous file for the same package
    ///
    /// The document is written to a temporary sibling and renamed into place so
    /// readers never observe a half-written file.
    pub async fn write(&self, entry: &Entry) -> OutputResult<PathBuf> {
        let path = self.layout.metadata_path(entry);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OutputError::IoError(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let json = serde_json::to_vec_pretty(entry)
            .map_err(|e| OutputError::SerializationError(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await.map_err(|e| {
            OutputError::IoError(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            OutputError::IoError(format!("Failed to move {}: {e}", path.display()))
        })?;

        debug!(package = %entry.package_name, path = %path.display(), "Metadata written");
        Ok(path)
    }
}
