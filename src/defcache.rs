//! Binary definition cache
//!
//! Parsing a definition file is expensive, so a serialized snapshot is kept
//! under a per-application-version cache subdirectory. Each record carries a
//! format version and a staleness token: the maximum modification time over
//! the definition file and all of its inherited files at the time the record
//! was written. A newer source file, a format mismatch or an unreadable
//! record all count as a cache miss; corrupt records are deleted so they
//! cannot cause repeated failures.

use crate::container::ContainerMetadata;
use crate::error::Result;
use crate::resources::{atomic_write, file_safe_id, ResourceLocator};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

/// Bumped whenever the record layout changes; older records are discarded
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Cached snapshot of a parsed definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedDefinition {
    pub format_version: u32,
    /// Max mtime (Unix seconds) over the definition file and its inherited
    /// files when this record was written
    pub stale_token: u64,
    pub metadata: ContainerMetadata,
    /// Serialized definition payload
    pub payload: String,
}

/// Store of cached definitions for one application version
pub struct DefinitionCache {
    dir: PathBuf,
}

impl DefinitionCache {
    pub fn new(locator: &ResourceLocator, app_version: &str) -> Self {
        DefinitionCache {
            dir: locator.definition_cache_dir(app_version),
        }
    }

    fn record_path(&self, definition_id: &str) -> PathBuf {
        self.dir.join(file_safe_id(definition_id))
    }

    /// Load the cached snapshot for a definition, validating freshness
    /// against the source file and every inherited file. Returns `None` on
    /// any miss condition.
    pub fn load(
        &self,
        definition_id: &str,
        source_path: &Path,
        inherited_files: &[PathBuf],
    ) -> Option<CachedDefinition> {
        let path = self.record_path(definition_id);
        let bytes = fs::read(&path).ok()?;

        let record: CachedDefinition = match bincode::deserialize(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    "Discarding corrupt definition cache for {}: {}",
                    definition_id, e
                );
                let _ = fs::remove_file(&path);
                return None;
            }
        };

        if record.format_version != CACHE_FORMAT_VERSION {
            debug!(
                "Definition cache for {} has format version {}, expected {}",
                definition_id, record.format_version, CACHE_FORMAT_VERSION
            );
            let _ = fs::remove_file(&path);
            return None;
        }

        let current = stale_token(source_path, inherited_files)?;
        if current > record.stale_token {
            debug!(
                "Definition file {} is newer than cache, ignoring cached version",
                source_path.display()
            );
            return None;
        }

        Some(record)
    }

    /// Write a snapshot for a definition. A partially written record is
    /// removed rather than left behind.
    pub fn store(
        &self,
        definition_id: &str,
        metadata: ContainerMetadata,
        payload: String,
        source_path: &Path,
        inherited_files: &[PathBuf],
    ) -> Result<()> {
        let Some(token) = stale_token(source_path, inherited_files) else {
            debug!(
                "Not caching definition {}: source mtime unavailable",
                definition_id
            );
            return Ok(());
        };

        let record = CachedDefinition {
            format_version: CACHE_FORMAT_VERSION,
            stale_token: token,
            metadata,
            payload,
        };

        fs::create_dir_all(&self.dir)?;
        let path = self.record_path(definition_id);
        let bytes = bincode::serialize(&record)?;
        if let Err(e) = atomic_write(&path, &bytes) {
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Max mtime over the source file and its inherited files, or `None` if any
/// of them cannot be inspected
fn stale_token(source_path: &Path, inherited_files: &[PathBuf]) -> Option<u64> {
    let mut token = mtime_secs(source_path)?;
    for path in inherited_files {
        token = token.max(mtime_secs(path)?);
    }
    Some(token)
}

fn mtime_secs(path: &Path) -> Option<u64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(modified.duration_since(UNIX_EPOCH).ok()?.as_secs())
}
