//! Error taxonomy shared by every component. Library code returns `CoreError`
//! and never panics; the binaries convert to `anyhow` at their boundary.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("state directory not initialized at {0}")]
    NotInitialized(PathBuf),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("embedder unavailable: {0}")]
    EmbedderUnavailable(String),

    #[error("store error: {0}")]
    StoreError(String),

    #[error("invalid query: {0}")]
    QueryInvalid(String),

    #[error("no index present")]
    NoIndex,

    #[error("scan error: {0}")]
    ScanError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
