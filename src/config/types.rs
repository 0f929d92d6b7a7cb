use serde::Deserialize;

/// Main configuration structure for Palimpsest
///
/// Every section has defaults, so a partial (or empty) TOML file is valid.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub transformation: TransformationConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Archive-wide settings
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Root directory for stored artifacts
    #[serde(rename = "output-dir", default = "default_output_dir")]
    pub output_dir: String,

    /// Identifying header sent with every content request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum content size in megabytes; larger snapshots are skipped
    #[serde(rename = "max-content-size", default = "default_max_content_size")]
    pub max_content_size_mb: u64,
}

impl ArchiveConfig {
    /// Maximum content size in bytes
    pub fn max_content_size_bytes(&self) -> u64 {
        self.max_content_size_mb * 1024 * 1024
    }
}

/// Concurrency, rate-limiting, and retry settings shared by the pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    /// Number of queued-mode worker loops
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Process-wide cap on content requests per second
    #[serde(rename = "requests-per-second", default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Maximum simultaneous in-flight downloads
    #[serde(rename = "concurrent-downloads", default = "default_concurrent_downloads")]
    pub concurrent_downloads: u32,

    /// Download attempts before a snapshot is failed
    #[serde(rename = "retry-attempts", default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(rename = "retry-delay", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Multiplier applied to the delay after each failed attempt
    #[serde(rename = "retry-backoff", default = "default_retry_backoff")]
    pub retry_backoff: f64,

    /// Per-request timeout in seconds
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Discovery stage settings
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Snapshot index query endpoint
    #[serde(rename = "index-url", default = "default_index_url")]
    pub index_url: String,

    /// HTTP status codes worth archiving; an empty list allows everything
    #[serde(rename = "allowed-status-codes", default = "default_allowed_status_codes")]
    pub allowed_status_codes: Vec<u16>,

    /// Drop index rows whose digest was already seen
    #[serde(default = "default_true")]
    pub deduplicate: bool,
}

/// Ingestion stage settings
#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    /// Base URL of the snapshot content host, e.g. `https://web.archive.org/web`
    #[serde(rename = "snapshot-base-url", default = "default_snapshot_base_url")]
    pub snapshot_base_url: String,

    /// Recompute and compare the content digest after download
    #[serde(rename = "verify-digest", default = "default_true")]
    pub verify_digest: bool,
}

/// Transformation stage settings
#[derive(Debug, Clone, Deserialize)]
pub struct TransformationConfig {
    /// Rewrite embedded references to archive coordinates
    #[serde(rename = "rewrite-links", default = "default_true")]
    pub rewrite_links: bool,

    /// Emit `/<timestamp>/<url>` references instead of full coordinates
    #[serde(rename = "make-links-relative", default = "default_true")]
    pub make_links_relative: bool,

    /// Strip script elements from the rewritten document
    #[serde(rename = "remove-scripts", default)]
    pub remove_scripts: bool,

    /// Strip comment nodes from the rewritten document
    #[serde(rename = "remove-comments", default = "default_true")]
    pub remove_comments: bool,
}

/// Queue/worker coordinator settings
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Handler failures before an envelope is dead-lettered
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Envelope time-to-live in seconds; absent means no expiry
    #[serde(rename = "message-ttl", default = "default_message_ttl")]
    pub message_ttl_secs: Option<u64>,
}

fn default_output_dir() -> String {
    "./archive".to_string()
}

fn default_user_agent() -> String {
    format!("Palimpsest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_content_size() -> u64 {
    100
}

fn default_workers() -> u32 {
    4
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_concurrent_downloads() -> u32 {
    10
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_retry_backoff() -> f64 {
    2.0
}

fn default_request_timeout() -> u64 {
    30
}

fn default_index_url() -> String {
    "https://web.archive.org/cdx/search/cdx".to_string()
}

fn default_allowed_status_codes() -> Vec<u16> {
    vec![200, 301, 302]
}

fn default_snapshot_base_url() -> String {
    "https://web.archive.org/web".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_message_ttl() -> Option<u64> {
    Some(86400)
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            user_agent: default_user_agent(),
            max_content_size_mb: default_max_content_size(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            requests_per_second: default_requests_per_second(),
            concurrent_downloads: default_concurrent_downloads(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_backoff: default_retry_backoff(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            index_url: default_index_url(),
            allowed_status_codes: default_allowed_status_codes(),
            deduplicate: true,
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            snapshot_base_url: default_snapshot_base_url(),
            verify_digest: true,
        }
    }
}

impl Default for TransformationConfig {
    fn default() -> Self {
        Self {
            rewrite_links: true,
            make_links_relative: true,
            remove_scripts: false,
            remove_comments: true,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            message_ttl_secs: default_message_ttl(),
        }
    }
}
