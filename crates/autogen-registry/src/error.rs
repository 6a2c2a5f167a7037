//! Error types for autogen-registry

use thiserror::Error;

/// Errors that can occur while fetching or publishing registry snapshots
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The upstream registry could not be reached or refused the request
    #[error("registry snapshot unavailable: {0}")]
    Unavailable(String),

    /// No snapshot has ever been published and a fresh fetch failed
    #[error("no inventory loaded ({reason}); refresh the registry snapshot and retry")]
    NoInventory { reason: String },

    /// Registry data was readable but not in the expected shape
    #[error("malformed registry data in {source_name}: {reason}")]
    Malformed { source_name: String, reason: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
