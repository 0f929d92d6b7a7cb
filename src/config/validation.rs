use crate::config::types::{
    ArchiveConfig, Config, DiscoveryConfig, IngestionConfig, ProcessingConfig, QueueConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_archive_config(&config.archive)?;
    validate_processing_config(&config.processing)?;
    validate_discovery_config(&config.discovery)?;
    validate_ingestion_config(&config.ingestion)?;
    validate_queue_config(&config.queue)?;
    Ok(())
}

/// Validates archive-wide settings
fn validate_archive_config(config: &ArchiveConfig) -> Result<(), ConfigError> {
    if config.output_dir.is_empty() {
        return Err(ConfigError::Validation(
            "output_dir cannot be empty".to_string(),
        ));
    }

    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.max_content_size_mb < 1 {
        return Err(ConfigError::Validation(format!(
            "max_content_size must be >= 1 MB, got {}",
            config.max_content_size_mb
        )));
    }

    Ok(())
}

/// Validates concurrency and retry settings
fn validate_processing_config(config: &ProcessingConfig) -> Result<(), ConfigError> {
    if config.workers < 1 {
        return Err(ConfigError::Validation(format!(
            "workers must be >= 1, got {}",
            config.workers
        )));
    }

    if config.requests_per_second < 1 || config.requests_per_second > 100 {
        return Err(ConfigError::Validation(format!(
            "requests_per_second must be between 1 and 100, got {}",
            config.requests_per_second
        )));
    }

    if config.concurrent_downloads < 1 || config.concurrent_downloads > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrent_downloads must be between 1 and 100, got {}",
            config.concurrent_downloads
        )));
    }

    if config.retry_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "retry_attempts must be >= 1, got {}",
            config.retry_attempts
        )));
    }

    if config.retry_backoff < 1.0 {
        return Err(ConfigError::Validation(format!(
            "retry_backoff must be >= 1.0, got {}",
            config.retry_backoff
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout must be >= 1s, got {}s",
            config.request_timeout_secs
        )));
    }

    Ok(())
}

/// Validates discovery stage settings
fn validate_discovery_config(config: &DiscoveryConfig) -> Result<(), ConfigError> {
    Url::parse(&config.index_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid index_url: {}", e)))?;

    for code in &config.allowed_status_codes {
        if *code < 100 || *code > 599 {
            return Err(ConfigError::Validation(format!(
                "allowed_status_codes entries must be between 100 and 599, got {}",
                code
            )));
        }
    }

    Ok(())
}

/// Validates ingestion stage settings
fn validate_ingestion_config(config: &IngestionConfig) -> Result<(), ConfigError> {
    Url::parse(&config.snapshot_base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid snapshot_base_url: {}", e))
    })?;

    Ok(())
}

/// Validates queue/worker settings
fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if let Some(ttl) = config.message_ttl_secs {
        if ttl < 1 {
            return Err(ConfigError::Validation(
                "message_ttl must be >= 1s when set".to_string(),
            ));
        }
    }

    Ok(())
}
