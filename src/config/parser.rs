use crate::config::types::Config;
use crate::config::validation::validate;
use crate::util::sha256_hex;
use crate::ConfigError;
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    // Read the configuration file
    let content = std::fs::read_to_string(path)?;

    // Parse TOML; unspecified sections fall back to defaults
    let config: Config = toml::from_str(&content)?;

    // Validate the configuration
    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Used to tell whether the configuration changed between runs.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(sha256_hex(content.as_bytes()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Returns a commented starter configuration with every default spelled out
///
/// Backs the `init` subcommand.
pub fn default_config_toml() -> &'static str {
    r#"# Palimpsest configuration

[archive]
output-dir = "./archive"
user-agent = "Palimpsest/1.0.0"
# Megabytes; larger snapshots are skipped
max-content-size = 100

[processing]
workers = 4
requests-per-second = 5
concurrent-downloads = 10
retry-attempts = 3
# Milliseconds before the first retry
retry-delay = 5000
retry-backoff = 2.0
# Seconds
request-timeout = 30

[discovery]
index-url = "https://web.archive.org/cdx/search/cdx"
allowed-status-codes = [200, 301, 302]
deduplicate = true

[ingestion]
snapshot-base-url = "https://web.archive.org/web"
verify-digest = true

[transformation]
rewrite-links = true
make-links-relative = true
remove-scripts = false
remove-comments = true

[queue]
max-retries = 3
# Seconds; comment out for no expiry
message-ttl = 86400
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[archive]
output-dir = "./test-archive"
user-agent = "TestArchiver/1.0"
max-content-size = 50

[processing]
workers = 2
requests-per-second = 10

[discovery]
allowed-status-codes = [200]
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.archive.output_dir, "./test-archive");
        assert_eq!(config.archive.max_content_size_mb, 50);
        assert_eq!(config.processing.workers, 2);
        assert_eq!(config.processing.requests_per_second, 10);
        assert_eq!(config.discovery.allowed_status_codes, vec![200]);
        // Unspecified sections keep defaults
        assert!(config.transformation.rewrite_links);
        assert_eq!(config.queue.max_retries, 3);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = create_temp_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.processing.requests_per_second, 5);
        assert_eq!(config.discovery.allowed_status_codes, vec![200, 301, 302]);
        assert_eq!(config.archive.max_content_size_bytes(), 100 * 1024 * 1024);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let file = create_temp_config("[processing]\nworkers = 0\n");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_default_config_toml_parses_and_validates() {
        let file = create_temp_config(default_config_toml());
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.processing.workers, 4);
        assert!(config.queue.message_ttl_secs.is_some());
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        // Same content should produce same hash
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
