//! Utility primitives: content hashing, timestamp conversion, filename
//! sanitization, and byte formatting

use crate::ArchiveError;
use chrono::NaiveDateTime;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of the given bytes
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Hex-encoded SHA-1 of the given bytes
///
/// Used for snapshot digest verification; the index reports SHA-1 digests.
pub fn sha1_hex(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Parses a 14-digit snapshot timestamp (YYYYMMDDhhmmss) into a calendar
/// instant
pub fn parse_timestamp(timestamp: &str) -> Result<NaiveDateTime, ArchiveError> {
    if timestamp.len() != 14 || !timestamp.chars().all(|c| c.is_ascii_digit()) {
        return Err(ArchiveError::InvalidTimestamp(timestamp.to_string()));
    }
    NaiveDateTime::parse_from_str(timestamp, "%Y%m%d%H%M%S")
        .map_err(|_| ArchiveError::InvalidTimestamp(timestamp.to_string()))
}

/// Formats a calendar instant back into the 14-digit snapshot form
pub fn format_timestamp(instant: &NaiveDateTime) -> String {
    instant.format("%Y%m%d%H%M%S").to_string()
}

/// Sanitizes a filename for safe filesystem storage
///
/// Replaces characters that are invalid on common filesystems with `_` and
/// caps the length at 255 bytes, preserving the extension when it fits
/// inside the cap.
pub fn sanitize_filename(filename: &str) -> String {
    const MAX_BYTES: usize = 255;

    let mut sanitized: String = filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect();

    if sanitized.len() > MAX_BYTES {
        sanitized = match sanitized.rfind('.') {
            Some(dot) if dot > 0 && sanitized.len() - dot < MAX_BYTES => {
                let ext = &sanitized[dot..];
                let stem = truncate_to_char_boundary(&sanitized[..dot], MAX_BYTES - ext.len());
                format!("{}{}", stem, ext)
            }
            _ => truncate_to_char_boundary(&sanitized, MAX_BYTES).to_string(),
        };
    }

    sanitized
}

/// Cuts a string down to at most `max_bytes`, never splitting a character
fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Formats a byte count in human-readable form (e.g. `1.5 MB`)
pub fn format_bytes(size: u64) -> String {
    let mut size = size as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} PB", size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_sha256_hex() {
        // Known vector for the empty input
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(sha256_hex(b"abc").len(), 64);
    }

    #[test]
    fn test_sha1_hex() {
        assert_eq!(sha1_hex(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_parse_timestamp() {
        let instant = parse_timestamp("20090430060114").unwrap();
        assert_eq!(instant.year(), 2009);
        assert_eq!(instant.month(), 4);
        assert_eq!(instant.day(), 30);
        assert_eq!(instant.hour(), 6);
        assert_eq!(instant.minute(), 1);
        assert_eq!(instant.second(), 14);
    }

    #[test]
    fn test_parse_timestamp_rejects_malformed() {
        assert!(parse_timestamp("2009043006011").is_err()); // 13 digits
        assert!(parse_timestamp("200904300601145").is_err()); // 15 digits
        assert!(parse_timestamp("2009043006011x").is_err());
        assert!(parse_timestamp("20091340060114").is_err()); // month 13
    }

    #[test]
    fn test_timestamp_round_trip() {
        let instant = parse_timestamp("19991231235959").unwrap();
        assert_eq!(format_timestamp(&instant), "19991231235959");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?f.html"), "a_b_c_d_e_f.html");
        assert_eq!(sanitize_filename("plain.html"), "plain.html");
    }

    #[test]
    fn test_sanitize_filename_caps_length() {
        let long = format!("{}.html", "a".repeat(300));
        let sanitized = sanitize_filename(&long);
        assert!(sanitized.len() <= 255);
        assert!(sanitized.ends_with(".html"));
    }

    #[test]
    fn test_sanitize_filename_caps_multibyte_length_in_bytes() {
        // Two bytes per character; a char-counted cap would overshoot
        let long = format!("{}.html", "é".repeat(300));
        let sanitized = sanitize_filename(&long);
        assert!(sanitized.len() <= 255);
        assert!(sanitized.ends_with(".html"));
        // No character was split at the truncation point
        assert!(sanitized.chars().all(|c| c == 'é' || ".html".contains(c)));
    }

    #[test]
    fn test_sanitize_filename_oversize_extension_falls_back() {
        let long = format!("name.{}", "x".repeat(300));
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.len(), 255);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512.0 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(100 * 1024 * 1024), "100.0 MB");
    }
}
