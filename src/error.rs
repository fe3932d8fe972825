use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration file error: {0}")]
    ConfigFile(String),

    #[error("Failed to fetch release metadata: {0}")]
    MetadataFetch(String),

    #[error("Upstream rate limit exhausted")]
    RateLimited,

    #[error("Failed to download asset: {0}")]
    Download(String),

    #[error("Invalid manifest at {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("Unsafe path component: {0}")]
    UnsafePath(String),

    #[error("Launcher '{0}' is not configured")]
    UnknownLauncher(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Http(#[from] attohttpc::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, MirrorError>;
