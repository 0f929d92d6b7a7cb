//! Archive-coordinate parsing and URL normalization
//!
//! An archive coordinate is the composite address
//! `scheme://host/web/<timestamp>[<modifier>_]/<original-url>` used to fetch
//! a snapshot or to rewrite references to one.

use crate::UrlError;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Matches an archive-coordinate URL on any host: a `/web/` path segment,
/// a 14-digit timestamp, an optional modifier (e.g. `id_`, `if_`), and the
/// original URL as the remainder.
static ARCHIVE_COORDINATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[^/]+/web/(\d{14})(?:([a-z]{1,4})_)?/(.+)$")
        .expect("archive coordinate pattern is valid")
});

/// Components parsed out of an archive-coordinate URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveCoordinate {
    /// Capture timestamp, exactly 14 digits (YYYYMMDDhhmmss)
    pub timestamp: String,

    /// Snapshot modifier, if present (the `id_` in `/web/<ts>id_/...`)
    pub modifier: Option<String>,

    /// The original URL the snapshot captured
    pub original_url: String,
}

/// Parses an archive-coordinate URL into its components
///
/// Returns None when the URL does not match the archive-coordinate pattern,
/// i.e. when it should be treated as an original URL and sent to the index
/// query instead.
///
/// # Example
///
/// ```
/// use palimpsest::coords::parse_archive_url;
///
/// let coord =
///     parse_archive_url("https://web.archive.org/web/20090430060114/http://example.com/")
///         .unwrap();
/// assert_eq!(coord.timestamp, "20090430060114");
/// assert_eq!(coord.original_url, "http://example.com/");
/// ```
pub fn parse_archive_url(url: &str) -> Option<ArchiveCoordinate> {
    let captures = ARCHIVE_COORDINATE.captures(url)?;
    Some(ArchiveCoordinate {
        timestamp: captures[1].to_string(),
        modifier: captures.get(2).map(|m| m.as_str().to_string()),
        original_url: captures[3].to_string(),
    })
}

/// Builds an archive-coordinate URL from a snapshot host base
/// (e.g. `https://web.archive.org/web`), a timestamp, and the original URL
pub fn build_archive_url(base: &str, timestamp: &str, original_url: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), timestamp, original_url)
}

/// Normalizes a URL for consistent comparison
///
/// Strips trailing slashes, lowercases, and removes default ports. This is a
/// comparison key, not a resolvable URL; the pipeline always fetches the
/// as-discovered form.
pub fn normalize_url(url: &str) -> String {
    static DEFAULT_PORT: Lazy<Regex> =
        Lazy::new(|| Regex::new(r":(?:80|443)(/|$)").expect("default port pattern is valid"));

    let normalized = url.trim_end_matches('/').to_lowercase();
    DEFAULT_PORT.replace_all(&normalized, "$1").into_owned()
}

/// Extracts the host (with any non-default port) from a URL
pub fn extract_domain(url: &str) -> Result<String, UrlError> {
    let parsed = Url::parse(url).map_err(|e| UrlError::Parse(e.to_string()))?;
    let host = parsed.host_str().ok_or(UrlError::MissingHost)?;
    match parsed.port() {
        Some(port) => Ok(format!("{}:{}", host, port)),
        None => Ok(host.to_string()),
    }
}

/// Returns true if the string parses as an absolute URL with a host
pub fn is_valid_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => parsed.host_str().is_some(),
        Err(_) => false,
    }
}
