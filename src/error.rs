/// Unified error types for Tailnet Auth
use thiserror::Error;

/// Main error type for the identity resolver
#[derive(Error, Debug)]
pub enum TailnetError {
    /// Missing or invalid configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network, HTTP status or decode failure talking to the directory service
    #[error("Directory fetch error: {0}")]
    Fetch(String),

    /// Snapshot file read/write/decode failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for resolver operations
pub type TailnetResult<T> = Result<T, TailnetError>;
