//! Error types for the asset analyzer

use thiserror::Error;

/// Result type alias for analyzer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while analyzing a page
///
/// Network failures while measuring an asset or fetching a container are
/// not errors: they degrade to `None` / "unknown" values at the resolver
/// and fingerprint boundaries. Only genuinely unexpected faults surface here.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to initialize the analyzer (HTTP client, runtime, ...)
    #[error("Analyzer initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load the page document
    #[error("Failed to load page: {0}")]
    LoadError(String),

    /// Asset discovery over the page snapshot failed
    #[error("Asset discovery failed: {0}")]
    DiscoveryError(String),

    /// Reading or writing the analysis history failed
    #[error("History error: {0}")]
    HistoryError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// JSON (de)serialization failed
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
