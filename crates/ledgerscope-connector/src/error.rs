//! Source error types
//!
//! Errors raised while talking to one of the three witnesses, with
//! transient/permanent classification for retry logic.

use thiserror::Error;

use crate::types::WitnessSource;

/// Error that can occur while reading from or writing to a witness.
#[derive(Debug, Error)]
pub enum SourceError {
    // Connectivity errors (transient)
    /// The witness could not be reached.
    #[error("{system} unreachable: {message}")]
    Unreachable {
        system: WitnessSource,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A call did not complete within its deadline.
    #[error("{system} call timed out after {timeout_ms} ms")]
    Timeout {
        system: WitnessSource,
        timeout_ms: u64,
    },

    // Definitive answers (permanent)
    /// The requested object does not exist in the witness.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// A versioned write lost a race with another writer.
    #[error("version conflict on {path}")]
    VersionConflict { path: String },

    /// The witness rejected our credentials.
    #[error("{system} rejected the supplied credentials")]
    AuthenticationFailed { system: WitnessSource },

    /// The witness returned data that could not be decoded.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    /// Connector configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Any other failed operation.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SourceError {
    /// Check if this error is transient and the operation should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::Unreachable { .. } | SourceError::Timeout { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Check if this error is a definitive absence.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            SourceError::Unreachable { .. } => "UNREACHABLE",
            SourceError::Timeout { .. } => "TIMEOUT",
            SourceError::NotFound { .. } => "NOT_FOUND",
            SourceError::VersionConflict { .. } => "VERSION_CONFLICT",
            SourceError::AuthenticationFailed { .. } => "AUTH_FAILED",
            SourceError::InvalidData { .. } => "INVALID_DATA",
            SourceError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            SourceError::OperationFailed { .. } => "OPERATION_FAILED",
        }
    }

    // Convenience constructors

    /// Create an unreachable error.
    pub fn unreachable(system: WitnessSource, message: impl Into<String>) -> Self {
        SourceError::Unreachable {
            system,
            message: message.into(),
            source: None,
        }
    }

    /// Create an unreachable error with source.
    pub fn unreachable_with_source(
        system: WitnessSource,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SourceError::Unreachable {
            system,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        SourceError::NotFound { what: what.into() }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        SourceError::InvalidData {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        SourceError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        SourceError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SourceError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::invalid_data(err.to_string())
    }
}

/// Result type for witness operations.
pub type SourceResult<T> = Result<T, SourceError>;
