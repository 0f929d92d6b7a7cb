//! Storage trait seams and the shared path convention

use crate::models::RewrittenDocument;
use crate::util::{parse_timestamp, sanitize_filename};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the storage collaborators
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Persists rewritten documents
///
/// `store` returns a store-assigned document id, later used to associate
/// the document with its search-index entry.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn store(&self, document: &RewrittenDocument) -> StorageResult<i64>;
}

/// Makes stored documents searchable by their extracted text
///
/// `index` returns whether the document was accepted; rejection is not an
/// error, it means the index chose to skip the document.
#[async_trait::async_trait]
pub trait SearchIndex: Send + Sync {
    async fn index(&self, doc_id: i64, document: &RewrittenDocument) -> StorageResult<bool>;
}

/// Relative path a document is stored under
///
/// Partitioned by capture date so one directory never accumulates an entire
/// archive: `content/YYYY/MM/DD/<timestamp>_<sanitized original url>.html`.
pub fn archive_path(document: &RewrittenDocument) -> StorageResult<PathBuf> {
    let instant = parse_timestamp(&document.timestamp)
        .map_err(|_| StorageError::InvalidDocument(format!("bad timestamp: {}", document.timestamp)))?;

    let filename = sanitize_filename(&format!(
        "{}_{}.html",
        document.timestamp, document.original_url
    ));

    Ok(PathBuf::from("content")
        .join(instant.format("%Y").to_string())
        .join(instant.format("%m").to_string())
        .join(instant.format("%d").to_string())
        .join(filename))
}
