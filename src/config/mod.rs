//! Configuration module for Palimpsest
//!
//! Handles loading, parsing, and validating TOML configuration files. Every
//! setting has a default, so a partial file configures only what it names.

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ArchiveConfig, Config, DiscoveryConfig, IngestionConfig, ProcessingConfig, QueueConfig,
    TransformationConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, default_config_toml, load_config, load_config_with_hash};
