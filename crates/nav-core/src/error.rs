//! Engine error types.

use thiserror::Error;

/// Errors surfaced by the navigation engine.
///
/// Resolver-internal failures (bad user regex, dangling references, files that
/// vanish mid-scan) are swallowed at the point of use and never reach this
/// type. The one condition callers are expected to match on is `Cancelled`.
#[derive(Debug, Error)]
pub enum NavError {
    /// An in-flight scan was cancelled because its originating view was
    /// switched or torn down. Expected, not a failure.
    #[error("scan cancelled")]
    Cancelled,

    /// The consumer of a progressive scan went away before the scan finished.
    #[error("scan consumer dropped")]
    ConsumerGone,

    /// Settings document could not be parsed or migrated.
    #[error("settings error: {0}")]
    Settings(String),

    /// IO error from a host vault implementation.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type NavResult<T> = Result<T, NavError>;
