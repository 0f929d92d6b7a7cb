//! Discovery resolver - stage 1 of the pipeline
//!
//! Turns a URL (or an archive-coordinate URL) into an ordered list of
//! snapshot records. Archive-coordinate URLs resolve locally with no network
//! call; anything else is looked up in the remote snapshot index. Lookup is
//! best effort: any transport or parse error yields an empty list, never an
//! error to the caller.

use crate::config::DiscoveryConfig;
use crate::coords::{build_archive_url, parse_archive_url};
use crate::models::SnapshotRecord;
use futures_util::future::join_all;
use reqwest::Client;
use std::collections::HashSet;

/// Field list requested from the snapshot index, in row order
const INDEX_FIELDS: &str = "timestamp,original,mimetype,statuscode,digest,length";

/// Resolves URLs to snapshot records via the remote snapshot index
pub struct SnapshotResolver {
    client: Client,
    config: DiscoveryConfig,
    /// Base URL of the content host, used to build archive coordinates
    snapshot_base_url: String,
}

impl SnapshotResolver {
    /// Creates a resolver sharing the process-wide HTTP client
    pub fn new(client: Client, config: DiscoveryConfig, snapshot_base_url: String) -> Self {
        Self {
            client,
            config,
            snapshot_base_url,
        }
    }

    /// Finds all snapshots for a URL
    ///
    /// If `url` is already an archive coordinate, a single record is built
    /// from its components without touching the network. Otherwise the
    /// snapshot index is queried and its rows parsed, filtered, and
    /// deduplicated.
    pub async fn find_snapshots(&self, url: &str) -> Vec<SnapshotRecord> {
        if let Some(coord) = parse_archive_url(url) {
            tracing::debug!("Resolved archive coordinate locally: {}", url);
            return vec![SnapshotRecord::new(
                url.to_string(),
                coord.original_url,
                coord.timestamp,
            )];
        }

        self.query_index(url).await
    }

    /// Discovers snapshots for multiple URLs concurrently
    ///
    /// A failure for one URL (already surfaced as an empty list) never
    /// aborts the batch.
    pub async fn batch_discover(&self, urls: &[String]) -> Vec<SnapshotRecord> {
        let lookups = urls.iter().map(|url| self.find_snapshots(url));
        join_all(lookups).await.into_iter().flatten().collect()
    }

    /// Queries the snapshot index for all captures of an original URL
    async fn query_index(&self, url: &str) -> Vec<SnapshotRecord> {
        tracing::info!("Querying snapshot index for: {}", url);

        match self.fetch_index_rows(url).await {
            Ok(rows) => {
                let records = self.parse_index_rows(rows);
                tracing::info!("Found {} snapshots for {}", records.len(), url);
                records
            }
            Err(e) => {
                tracing::error!("Index query failed for {}: {}", url, e);
                Vec::new()
            }
        }
    }

    async fn fetch_index_rows(&self, url: &str) -> crate::Result<Vec<Vec<String>>> {
        let mut request = self.client.get(&self.config.index_url).query(&[
            ("url", url),
            ("output", "json"),
            ("fl", INDEX_FIELDS),
        ]);

        // A trailing slash means "this page and everything under it"
        if url.ends_with('/') {
            request = request.query(&[("matchType", "prefix")]);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Parses index rows into snapshot records
    ///
    /// Drops a literal header row, skips rows with fewer than six fields or
    /// a non-numeric status, keeps only allowed status codes (an empty
    /// allow-set keeps everything), and optionally deduplicates by digest
    /// preserving first-seen order.
    fn parse_index_rows(&self, rows: Vec<Vec<String>>) -> Vec<SnapshotRecord> {
        let mut records = Vec::new();
        let mut seen_digests: HashSet<String> = HashSet::new();

        let mut rows = rows.into_iter();
        let mut first = rows.next();
        if matches!(&first, Some(row) if row.first().map(String::as_str) == Some("timestamp")) {
            first = rows.next();
        }

        for row in first.into_iter().chain(rows) {
            if row.len() < 6 {
                tracing::debug!("Skipping short index row: {:?}", row);
                continue;
            }

            let timestamp = &row[0];
            let original = &row[1];
            let mimetype = &row[2];
            let statuscode = &row[3];
            let digest = &row[4];
            let length = &row[5];

            if timestamp.len() != 14 || !timestamp.chars().all(|c| c.is_ascii_digit()) {
                tracing::warn!("Skipping index row with malformed timestamp: {}", timestamp);
                continue;
            }

            let status_code: u16 = match statuscode.parse() {
                Ok(code) => code,
                Err(_) => continue,
            };

            if !self.config.allowed_status_codes.is_empty()
                && !self.config.allowed_status_codes.contains(&status_code)
            {
                continue;
            }

            if self.config.deduplicate && !seen_digests.insert(digest.clone()) {
                continue;
            }

            let url = build_archive_url(&self.snapshot_base_url, timestamp, original);
            let mut record = SnapshotRecord::new(url, original.clone(), timestamp.clone());
            record.mime_type = Some(mimetype.clone());
            record.status_code = Some(status_code);
            record.digest = Some(digest.clone());
            record.length = length.parse().ok();

            records.push(record);
        }

        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SnapshotStatus;

    fn test_resolver() -> SnapshotResolver {
        SnapshotResolver::new(
            Client::new(),
            DiscoveryConfig::default(),
            "https://web.archive.org/web".to_string(),
        )
    }

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_archive_coordinate_resolves_without_network() {
        // The index URL is unroutable, so any network call would fail
        let resolver = SnapshotResolver::new(
            Client::new(),
            DiscoveryConfig {
                index_url: "http://127.0.0.1:1/cdx".to_string(),
                ..DiscoveryConfig::default()
            },
            "https://web.archive.org/web".to_string(),
        );

        let records = resolver
            .find_snapshots("https://web.archive.org/web/20090430060114/http://example.com/")
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, "20090430060114");
        assert_eq!(records[0].original_url, "http://example.com/");
        assert_eq!(records[0].status, SnapshotStatus::Discovered);
    }

    #[test]
    fn test_parse_rows_in_order() {
        let resolver = test_resolver();
        let rows = vec![
            row(&["20090430060114", "http://example.com/", "text/html", "200", "AAA", "1000"]),
            row(&["20100101000000", "http://example.com/a", "text/html", "301", "BBB", "2000"]),
        ];

        let records = resolver.parse_index_rows(rows);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, "20090430060114");
        assert_eq!(records[1].timestamp, "20100101000000");
        assert_eq!(
            records[0].url,
            "https://web.archive.org/web/20090430060114/http://example.com/"
        );
        assert_eq!(records[1].status_code, Some(301));
        assert_eq!(records[1].length, Some(2000));
    }

    #[test]
    fn test_parse_rows_drops_header() {
        let resolver = test_resolver();
        let rows = vec![
            row(&["timestamp", "original", "mimetype", "statuscode", "digest", "length"]),
            row(&["20090430060114", "http://example.com/", "text/html", "200", "AAA", "1000"]),
        ];

        let records = resolver.parse_index_rows(rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].digest.as_deref(), Some("AAA"));
    }

    #[test]
    fn test_parse_rows_skips_short_and_non_numeric() {
        let resolver = test_resolver();
        let rows = vec![
            row(&["20090430060114", "http://example.com/"]),
            row(&["20090430060114", "http://example.com/", "text/html", "-", "AAA", "1000"]),
            row(&["20100101000000", "http://example.com/b", "text/html", "200", "BBB", "500"]),
        ];

        let records = resolver.parse_index_rows(rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].original_url, "http://example.com/b");
    }

    #[test]
    fn test_parse_rows_filters_status_codes() {
        let resolver = test_resolver();
        let rows = vec![
            row(&["20090430060114", "http://example.com/", "text/html", "404", "AAA", "1000"]),
            row(&["20100101000000", "http://example.com/", "text/html", "200", "BBB", "1000"]),
        ];

        let records = resolver.parse_index_rows(rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status_code, Some(200));
    }

    #[test]
    fn test_empty_allow_set_keeps_everything() {
        let mut resolver = test_resolver();
        resolver.config.allowed_status_codes = vec![];
        let rows = vec![
            row(&["20090430060114", "http://example.com/", "text/html", "404", "AAA", "1000"]),
            row(&["20100101000000", "http://example.com/", "text/html", "503", "BBB", "1000"]),
        ];

        assert_eq!(resolver.parse_index_rows(rows).len(), 2);
    }

    #[test]
    fn test_parse_rows_deduplicates_by_digest() {
        let resolver = test_resolver();
        let rows = vec![
            row(&["20090430060114", "http://example.com/", "text/html", "200", "SAME", "1000"]),
            row(&["20100101000000", "http://example.com/", "text/html", "200", "SAME", "1000"]),
            row(&["20110101000000", "http://example.com/", "text/html", "200", "OTHER", "900"]),
        ];

        let records = resolver.parse_index_rows(rows);
        assert_eq!(records.len(), 2);
        // First-seen row survives
        assert_eq!(records[0].timestamp, "20090430060114");
        assert_eq!(records[0].digest.as_deref(), Some("SAME"));
        assert_eq!(records[1].digest.as_deref(), Some("OTHER"));
    }

    #[test]
    fn test_dedup_disabled_keeps_duplicates() {
        let mut resolver = test_resolver();
        resolver.config.deduplicate = false;
        let rows = vec![
            row(&["20090430060114", "http://example.com/", "text/html", "200", "SAME", "1000"]),
            row(&["20100101000000", "http://example.com/", "text/html", "200", "SAME", "1000"]),
        ];

        assert_eq!(resolver.parse_index_rows(rows).len(), 2);
    }

    #[test]
    fn test_malformed_timestamp_skipped() {
        let resolver = test_resolver();
        let rows = vec![row(&["2009", "http://example.com/", "text/html", "200", "AAA", "10"])];
        assert!(resolver.parse_index_rows(rows).is_empty());
    }
}
