//! Filesystem-backed document store

use super::traits::{archive_path, DocumentStore, StorageResult};
use crate::models::RewrittenDocument;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

/// Metadata sidecar written next to each document
#[derive(Serialize)]
struct DocumentMeta<'a> {
    id: i64,
    url: &'a str,
    original_url: &'a str,
    timestamp: &'a str,
    metadata: &'a std::collections::HashMap<String, String>,
    links: &'a [String],
    transformed_at: chrono::DateTime<chrono::Utc>,
}

/// Stores documents as HTML files under a date-partitioned tree
///
/// Each document gets two files: the rewritten HTML at its archive path and
/// a `.json` sidecar carrying the id, URLs, extracted metadata, and links.
/// Ids are assigned from a process-local counter.
pub struct FsStore {
    root: PathBuf,
    next_id: AtomicI64,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path a document would be stored at
    pub fn document_path(&self, document: &RewrittenDocument) -> StorageResult<PathBuf> {
        Ok(self.root.join(archive_path(document)?))
    }
}

#[async_trait::async_trait]
impl DocumentStore for FsStore {
    async fn store(&self, document: &RewrittenDocument) -> StorageResult<i64> {
        let path = self.document_path(document)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let meta = DocumentMeta {
            id,
            url: &document.url,
            original_url: &document.original_url,
            timestamp: &document.timestamp,
            metadata: &document.metadata,
            links: &document.links,
            transformed_at: document.transformed_at,
        };

        tokio::fs::write(&path, document.content.as_bytes()).await?;
        tokio::fs::write(
            path.with_extension("html.json"),
            serde_json::to_vec_pretty(&meta)?,
        )
        .await?;

        tracing::debug!("Stored document {} at {}", id, path.display());
        Ok(id)
    }
}
