//! Storage locations for persisted containers
//!
//! The locator owns the config and cache base directories and hands out
//! per-category storage paths, lock-file paths and the per-application-version
//! definition cache directory. Constructed by the application and injected
//! into the registry.

use crate::container::ContainerKind;
use crate::error::Result;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::fs;
use std::path::{Path, PathBuf};

/// Fixed name of the cross-process lock files
pub const LOCK_FILE_NAME: &str = "canister.lock";

/// Resource category a saved container file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    Definitions,
    Instances,
    Stacks,
}

impl ResourceCategory {
    pub fn for_kind(kind: ContainerKind) -> Self {
        match kind {
            ContainerKind::Definition => ResourceCategory::Definitions,
            ContainerKind::Instance => ResourceCategory::Instances,
            ContainerKind::Stack => ResourceCategory::Stacks,
        }
    }

    fn dir_name(&self) -> &'static str {
        match self {
            ResourceCategory::Definitions => "definitions",
            ResourceCategory::Instances => "instances",
            ResourceCategory::Stacks => "stacks",
        }
    }
}

/// Resolves on-disk paths for the registry
#[derive(Debug, Clone)]
pub struct ResourceLocator {
    config_dir: PathBuf,
    cache_dir: PathBuf,
}

impl ResourceLocator {
    pub fn new(config_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        ResourceLocator {
            config_dir: config_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Storage directory for a category, created on first use
    pub fn storage_path(&self, category: ResourceCategory) -> Result<PathBuf> {
        let path = self.config_dir.join(category.dir_name());
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Lock file guarding the config directory
    pub fn config_lock_path(&self) -> PathBuf {
        self.config_dir.join(LOCK_FILE_NAME)
    }

    /// Lock file guarding the cache directory
    pub fn cache_lock_path(&self) -> PathBuf {
        self.cache_dir.join(LOCK_FILE_NAME)
    }

    /// Binary definition cache directory for one application version
    pub fn definition_cache_dir(&self, app_version: &str) -> PathBuf {
        self.cache_dir.join("definitions").join(app_version)
    }
}

/// Encode a container id into a filesystem-safe file name component
pub fn file_safe_id(id: &str) -> String {
    utf8_percent_encode(id, NON_ALPHANUMERIC).to_string()
}

/// Write a file atomically: write to a sibling temp file, then rename over
/// the target so readers never observe a partial file.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, data)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}
