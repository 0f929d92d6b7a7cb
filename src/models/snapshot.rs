/// Snapshot record and per-pass pipeline artifacts
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Processing status of a snapshot as it moves through the pipeline
///
/// Statuses only move forward; the exceptions are the terminal `Failed` and
/// `Skipped` states, which any stage may enter directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    /// Known to the system but not yet resolved
    Pending,

    /// Resolved to an archive coordinate by the discovery stage
    Discovered,

    /// Download in progress
    Downloading,

    /// Raw bytes fetched successfully
    Downloaded,

    /// Link rewriting / extraction in progress
    Transforming,

    /// Rewritten document produced
    Transformed,

    /// Handoff to the storage collaborator in progress
    Indexing,

    /// Stored and indexed; terminal success
    Indexed,

    /// Permanent failure; terminal
    Failed,

    /// Rejected by a resource limit; terminal, never retried
    Skipped,
}

impl SnapshotStatus {
    /// Returns true if no further processing will happen for this pass
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Indexed | Self::Failed | Self::Skipped)
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Indexed)
    }

    /// String representation used in payloads and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Discovered => "discovered",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Transforming => "transforming",
            Self::Transformed => "transformed",
            Self::Indexing => "indexing",
            Self::Indexed => "indexed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Parses a status from its string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "discovered" => Some(Self::Discovered),
            "downloading" => Some(Self::Downloading),
            "downloaded" => Some(Self::Downloaded),
            "transforming" => Some(Self::Transforming),
            "transformed" => Some(Self::Transformed),
            "indexing" => Some(Self::Indexing),
            "indexed" => Some(Self::Indexed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single snapshot of a URL at a point in time
///
/// Created by the discovery resolver and mutated in place (status field) by
/// each stage as it processes the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Archive-coordinate URL used to fetch the snapshot
    pub url: String,

    /// The URL as it existed when captured
    pub original_url: String,

    /// Capture instant, always exactly 14 digits (YYYYMMDDhhmmss)
    pub timestamp: String,

    /// MIME type reported by the index, if any
    pub mime_type: Option<String>,

    /// HTTP status code at capture time
    pub status_code: Option<u16>,

    /// Content digest reported by the index
    pub digest: Option<String>,

    /// Content length in bytes reported by the index
    pub length: Option<u64>,

    /// Current processing status
    pub status: SnapshotStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SnapshotRecord {
    /// Creates a freshly discovered record
    pub fn new(url: String, original_url: String, timestamp: String) -> Self {
        let now = Utc::now();
        Self {
            url,
            original_url,
            timestamp,
            mime_type: None,
            status_code: None,
            digest: None,
            length: None,
            status: SnapshotStatus::Discovered,
            created_at: now,
            updated_at: now,
        }
    }

    /// Updates the processing status, bumping the update timestamp
    pub fn set_status(&mut self, status: SnapshotStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Raw bytes fetched for a snapshot
///
/// Ephemeral: consumed immediately by the transformer, never persisted on
/// its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedBlob {
    /// Archive-coordinate URL of the snapshot this blob belongs to
    pub url: String,

    /// Raw response body
    pub content: Vec<u8>,

    /// Response headers
    pub headers: HashMap<String, String>,

    /// Declared character encoding, if the response carried one
    pub encoding: Option<String>,

    pub downloaded_at: DateTime<Utc>,
}

/// A rewritten document plus everything extracted from it
///
/// Ownership of durable persistence passes to the storage collaborator once
/// this is produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewrittenDocument {
    /// Archive-coordinate URL of the source snapshot
    pub url: String,

    /// Original URL of the source snapshot
    pub original_url: String,

    /// Capture timestamp of the source snapshot
    pub timestamp: String,

    /// The document with embedded references rewritten
    pub content: String,

    /// Visible text with whitespace collapsed
    pub text_content: String,

    /// Title, meta name/property pairs, and page language
    pub metadata: HashMap<String, String>,

    /// Deduplicated resource references present after rewriting
    pub links: Vec<String>,

    pub transformed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            SnapshotStatus::Pending,
            SnapshotStatus::Discovered,
            SnapshotStatus::Downloading,
            SnapshotStatus::Downloaded,
            SnapshotStatus::Transforming,
            SnapshotStatus::Transformed,
            SnapshotStatus::Indexing,
            SnapshotStatus::Indexed,
            SnapshotStatus::Failed,
            SnapshotStatus::Skipped,
        ] {
            assert_eq!(SnapshotStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SnapshotStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(SnapshotStatus::Indexed.is_terminal());
        assert!(SnapshotStatus::Failed.is_terminal());
        assert!(SnapshotStatus::Skipped.is_terminal());
        assert!(!SnapshotStatus::Discovered.is_terminal());
        assert!(!SnapshotStatus::Downloading.is_terminal());
    }

    #[test]
    fn test_set_status_bumps_updated_at() {
        let mut record = SnapshotRecord::new(
            "https://web.archive.org/web/20090430060114/http://example.com/".to_string(),
            "http://example.com/".to_string(),
            "20090430060114".to_string(),
        );
        let before = record.updated_at;
        record.set_status(SnapshotStatus::Downloading);
        assert_eq!(record.status, SnapshotStatus::Downloading);
        assert!(record.updated_at >= before);
    }
}
