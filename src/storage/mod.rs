//! Storage collaborators for the indexing stage
//!
//! Rewritten documents are handed off through two trait seams: a
//! `DocumentStore` that persists document content and metadata, and a
//! `SearchIndex` that makes the extracted text searchable. The default
//! implementations are a date-partitioned filesystem store and an in-process
//! text index.

mod fs_store;
mod memory_index;
mod traits;

pub use fs_store::FsStore;
pub use memory_index::MemoryIndex;
pub use traits::{archive_path, DocumentStore, SearchIndex, StorageError, StorageResult};
