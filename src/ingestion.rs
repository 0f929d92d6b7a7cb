//! Ingestion fetcher - stage 2 of the pipeline
//!
//! Downloads raw bytes for a snapshot record under two independent
//! backpressure mechanisms: a process-wide token-refill rate limiter and a
//! bounded concurrency gate for batch fan-out. Each attempt is wrapped in an
//! exponential-backoff retry loop; oversize content is classified skipped and
//! never retried, and digest mismatches are logged but non-fatal.

use crate::config::{ArchiveConfig, IngestionConfig, ProcessingConfig};
use crate::models::{FetchedBlob, SnapshotRecord, SnapshotStatus};
use crate::util::sha1_hex;
use crate::ArchiveError;
use chrono::Utc;
use futures_util::{stream, StreamExt};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

/// Builds the shared HTTP client with the identifying user agent
pub fn build_http_client(user_agent: &str, timeout_secs: u64) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Process-wide token-refill rate limiter
///
/// Starts with `requests_per_second` tokens; a background task refills one
/// token per interval up to that cap. `acquire` consumes a token, suspending
/// the caller when none are available.
pub struct RateLimiter {
    tokens: Arc<Semaphore>,
}

impl RateLimiter {
    /// Creates a limiter allowing `requests_per_second` acquisitions per
    /// second, process-wide
    ///
    /// Must be called from within a tokio runtime; the refill task runs for
    /// the life of the process.
    pub fn new(requests_per_second: u32) -> Self {
        let cap = requests_per_second.max(1) as usize;
        let refill_interval = Duration::from_secs(1) / cap as u32;

        let tokens = Arc::new(Semaphore::new(cap));

        let refill = tokens.clone();
        tokio::spawn(async move {
            loop {
                sleep(refill_interval).await;
                if refill.available_permits() < cap {
                    refill.add_permits(1);
                }
            }
        });

        Self { tokens }
    }

    /// Consumes one token, waiting for the refill task if none are available
    pub async fn acquire(&self) {
        let permit = self
            .tokens
            .acquire()
            .await
            .expect("rate limiter semaphore never closes");
        // Consumed, not returned; the refill task replaces it
        permit.forget();
    }
}

/// Explicit retry policy applied around each download
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            initial_delay: Duration::from_millis(config.retry_delay_ms),
            multiplier: config.retry_backoff,
        }
    }

    /// Delay before retrying after the given zero-based failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay.mul_f64(self.multiplier.powi(attempt as i32))
    }
}

/// Outcome of a single download attempt
enum DownloadOutcome {
    Fetched(FetchedBlob),
    /// Declared or actual size exceeded the cap; not retryable
    Oversize(u64),
}

/// Downloads snapshot content from the archive host
pub struct Fetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    max_content_size: u64,
    verify_digest: bool,
}

impl Fetcher {
    pub fn new(
        client: Client,
        limiter: Arc<RateLimiter>,
        archive: &ArchiveConfig,
        ingestion: &IngestionConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            limiter,
            retry,
            max_content_size: archive.max_content_size_bytes(),
            verify_digest: ingestion.verify_digest,
        }
    }

    #[cfg(test)]
    fn with_max_content_size(mut self, bytes: u64) -> Self {
        self.max_content_size = bytes;
        self
    }

    /// Downloads the content for a snapshot record
    ///
    /// Sets status `Downloading` on entry, `Downloaded` on success,
    /// `Skipped` for oversize content, and `Failed` once retries are
    /// exhausted. Expected failures never surface as errors; absence plus
    /// the recorded status is the contract.
    pub async fn download(&self, record: &mut SnapshotRecord) -> Option<FetchedBlob> {
        record.set_status(SnapshotStatus::Downloading);
        tracing::info!("Downloading: {}", record.url);

        for attempt in 0..self.retry.max_attempts {
            self.limiter.acquire().await;

            match self.perform_download(record).await {
                Ok(DownloadOutcome::Fetched(blob)) => {
                    record.set_status(SnapshotStatus::Downloaded);
                    tracing::info!("Downloaded successfully: {}", record.url);
                    return Some(blob);
                }
                Ok(DownloadOutcome::Oversize(size)) => {
                    tracing::warn!(
                        "Content too large ({} bytes, cap {}), skipping: {}",
                        size,
                        self.max_content_size,
                        record.url
                    );
                    record.set_status(SnapshotStatus::Skipped);
                    return None;
                }
                Err(e) => {
                    tracing::warn!(
                        "Download attempt {}/{} failed for {}: {}",
                        attempt + 1,
                        self.retry.max_attempts,
                        record.url,
                        e
                    );
                    if attempt + 1 < self.retry.max_attempts {
                        sleep(self.retry.delay_for(attempt)).await;
                    }
                }
            }
        }

        tracing::error!(
            "Download failed for {} after {} attempts",
            record.url,
            self.retry.max_attempts
        );
        record.set_status(SnapshotStatus::Failed);
        None
    }

    /// One GET against the record's archive coordinate
    async fn perform_download(
        &self,
        record: &SnapshotRecord,
    ) -> crate::Result<DownloadOutcome> {
        let response = self
            .client
            .get(&record.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ArchiveError::Http {
                url: record.url.clone(),
                source: e,
            })?;

        // Pre-flight: reject on the declared length without reading the body
        if let Some(declared) = response.content_length() {
            if declared > self.max_content_size {
                return Ok(DownloadOutcome::Oversize(declared));
            }
        }

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();

        let encoding = headers
            .get("content-type")
            .and_then(|value| charset_from_content_type(value));

        let content = response
            .bytes()
            .await
            .map_err(|e| ArchiveError::Http {
                url: record.url.clone(),
                source: e,
            })?
            .to_vec();

        // Post-flight: the declared length can lie (or be absent)
        if content.len() as u64 > self.max_content_size {
            return Ok(DownloadOutcome::Oversize(content.len() as u64));
        }

        // Integrity check is advisory: a mismatch is logged, never fatal
        if self.verify_digest {
            if let Some(expected) = &record.digest {
                let actual = sha1_hex(&content);
                if !actual.eq_ignore_ascii_case(expected) {
                    tracing::warn!(
                        "Content digest mismatch for {}: expected {}, got {}",
                        record.url,
                        expected,
                        actual
                    );
                }
            }
        }

        Ok(DownloadOutcome::Fetched(FetchedBlob {
            url: record.url.clone(),
            content,
            headers,
            encoding,
            downloaded_at: Utc::now(),
        }))
    }

    /// Downloads many snapshots through a bounded concurrency gate
    ///
    /// Output order matches input order; a failed item becomes `None` at its
    /// position instead of aborting the batch.
    pub async fn batch_download(
        &self,
        records: &mut [SnapshotRecord],
        concurrency: usize,
    ) -> Vec<Option<FetchedBlob>> {
        stream::iter(records.iter_mut())
            .map(|record| self.download(record))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }
}

/// Strips NUL bytes from downloaded content before parsing
pub fn sanitize_content(content: &[u8]) -> Vec<u8> {
    content.iter().copied().filter(|&b| b != 0).collect()
}

/// Pulls the charset parameter out of a Content-Type header value
///
/// The parameter name is case-insensitive per the header grammar.
fn charset_from_content_type(value: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        if name.eq_ignore_ascii_case("charset") {
            Some(value.trim_matches('"').to_string())
        } else {
            None
        }
    })
}
