//! Data models for the archiving pipeline
//!
//! Defines the snapshot record that flows through every stage, the ephemeral
//! per-pass artifacts (fetched blob, rewritten document), the queue envelope,
//! and per-run processing statistics.

mod envelope;
mod snapshot;
mod stats;

pub use envelope::QueueEnvelope;
pub use snapshot::{FetchedBlob, RewrittenDocument, SnapshotRecord, SnapshotStatus};
pub use stats::ProcessingStats;
