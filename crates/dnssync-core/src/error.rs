//! Error types for the DNS sync system
//!
//! One error enum is shared by the value model, the diff engine, the
//! stores, the providers and the zone state machine. The variant decides
//! how a failure surfaces: validation and conflict errors are returned to
//! the caller before any state transition, provider errors end up in a
//! zone's `status_reason`.

use thiserror::Error;

/// Result type alias for DNS sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DNS sync system
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input (bad domain name, unsupported zone type, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A required field was not supplied
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// Request conflicts with existing state (duplicate cache, VPC already in zone)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation not allowed in the zone's current status
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// Provider or zone type does not support the request
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Local row or remote object not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// More rows matched than the data model allows
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// DNS provider-related errors
    #[error("DNS provider error: {0}")]
    DnsProvider(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Store-related errors
    #[error("Store error: {0}")]
    Store(String),

    /// Task dispatch errors
    #[error("Task error: {0}")]
    Task(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a missing parameter error
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::MissingParameter(name.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an invalid status error
    pub fn invalid_status(msg: impl Into<String>) -> Self {
        Self::InvalidStatus(msg.into())
    }

    /// Create a "not supported" error
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a duplicate error
    pub fn duplicate(msg: impl Into<String>) -> Self {
        Self::Duplicate(msg.into())
    }

    /// Create a DNS provider error
    pub fn dns_provider(msg: impl Into<String>) -> Self {
        Self::DnsProvider(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a task error
    pub fn task(msg: impl Into<String>) -> Self {
        Self::Task(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error means the target is already gone
    ///
    /// Delete-oriented operations treat this as success.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        assert!(Error::not_found("record r1").is_not_found());
        assert!(!Error::provider("cloudflare", "HTTP 500").is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = Error::provider("cloudflare", "zone quota exceeded");
        assert_eq!(err.to_string(), "Provider error (cloudflare): zone quota exceeded");
        assert_eq!(Error::conflict("vpc-1 already in zone").to_string(), "Conflict: vpc-1 already in zone");
    }
}
