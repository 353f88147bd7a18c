//! Error types for the Folio test harness

use thiserror::Error;

/// Result type alias using the harness Error
pub type Result<T> = std::result::Result<T, Error>;

/// Harness error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid external reference `{0}`: expected the form `module.name`")]
    InvalidReference(String),

    #[error("external reference not found: {module}.{name}")]
    NotFound { module: String, name: String },

    #[error("session token already registered: {0}")]
    SessionCollision(String),

    #[error("unknown session token: {0}")]
    SessionUnknown(String),

    #[error("browser test failed: {0}")]
    BrowserFailed(String),

    #[error("browser test timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("transaction scope already closed")]
    ScopeClosed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("internal error: {0}")]
    Internal(String),
}
