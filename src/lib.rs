//! Palimpsest: a historical web content archiver
//!
//! This crate resolves, fetches, and rewrites snapshots from a remote
//! historical-content index. The pipeline has four stages (discovery,
//! ingestion, transformation, and indexing), driven either directly in
//! batch mode or through named message channels and a pool of worker loops.

pub mod config;
pub mod coords;
pub mod discovery;
pub mod ingestion;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod storage;
pub mod transform;
pub mod util;

use thiserror::Error;

/// Main error type for Palimpsest operations
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Download failed for {url} after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u32 },

    #[error("Failed to decode content for {url}")]
    Decode { url: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Not an archive-coordinate URL: {0}")]
    NotArchiveCoordinate(String),
}

/// Result type alias for Palimpsest operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use coords::{build_archive_url, extract_domain, normalize_url, parse_archive_url};
pub use models::{
    FetchedBlob, ProcessingStats, QueueEnvelope, RewrittenDocument, SnapshotRecord, SnapshotStatus,
};
pub use pipeline::Archiver;
