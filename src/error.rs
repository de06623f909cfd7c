use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Container {0} is known by metadata but has not been materialized")]
    MissingContainer(String),

    #[error("Timed out waiting for lock file {path} after {waited_secs} seconds")]
    LockTimeout { path: PathBuf, waited_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Definition cache encoding error: {0}")]
    CacheEncoding(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
