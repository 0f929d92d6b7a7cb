//! In-process search index

use super::traits::{SearchIndex, StorageResult};
use crate::models::RewrittenDocument;
use std::collections::HashMap;
use std::sync::Mutex;

struct IndexEntry {
    url: String,
    title: Option<String>,
    text: String,
}

/// Case-insensitive substring index over extracted document text
///
/// Documents with no extracted text are skipped rather than indexed empty.
pub struct MemoryIndex {
    entries: Mutex<HashMap<i64, IndexEntry>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns ids of documents whose text or title contains the query
    pub fn search(&self, query: &str) -> Vec<i64> {
        let query = query.to_lowercase();
        let entries = self.entries.lock().expect("index lock poisoned");

        let mut hits: Vec<i64> = entries
            .iter()
            .filter(|(_, entry)| {
                entry.text.to_lowercase().contains(&query)
                    || entry
                        .title
                        .as_ref()
                        .is_some_and(|t| t.to_lowercase().contains(&query))
            })
            .map(|(id, _)| *id)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// URL of an indexed document
    pub fn url_for(&self, doc_id: i64) -> Option<String> {
        self.entries
            .lock()
            .expect("index lock poisoned")
            .get(&doc_id)
            .map(|entry| entry.url.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("index lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SearchIndex for MemoryIndex {
    async fn index(&self, doc_id: i64, document: &RewrittenDocument) -> StorageResult<bool> {
        if document.text_content.trim().is_empty() {
            tracing::debug!("Skipping empty-text document {}", document.url);
            return Ok(false);
        }

        self.entries.lock().expect("index lock poisoned").insert(
            doc_id,
            IndexEntry {
                url: document.url.clone(),
                title: document.metadata.get("title").cloned(),
                text: document.text_content.clone(),
            },
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn doc(text: &str, title: Option<&str>) -> RewrittenDocument {
        let mut metadata = HashMap::new();
        if let Some(title) = title {
            metadata.insert("title".to_string(), title.to_string());
        }
        RewrittenDocument {
            url: "https://web.archive.org/web/20090430060114/http://example.com/".to_string(),
            original_url: "http://example.com/".to_string(),
            timestamp: "20090430060114".to_string(),
            content: String::new(),
            text_content: text.to_string(),
            metadata,
            links: Vec::new(),
            transformed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_index_and_search() {
        let index = MemoryIndex::new();
        assert!(index
            .index(1, &doc("the quick brown fox", Some("Foxes")))
            .await
            .unwrap());
        assert!(index.index(2, &doc("slow turtles", None)).await.unwrap());

        assert_eq!(index.search("QUICK"), vec![1]);
        assert_eq!(index.search("foxes"), vec![1]); // title match
        assert_eq!(index.search("s"), vec![1, 2]);
        assert!(index.search("absent").is_empty());
    }

    #[tokio::test]
    async fn test_empty_text_not_indexed() {
        let index = MemoryIndex::new();
        assert!(!index.index(1, &doc("   ", None)).await.unwrap());
        assert!(index.is_empty());
    }
}
