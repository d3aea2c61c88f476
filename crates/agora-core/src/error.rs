use thiserror::Error;

/// Errors shared across the Agora platform crates.
///
/// Subsystem-specific failures carry their own error types; this covers the
/// cross-cutting cases, such as configuration loading and payload parsing.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn invalid_timestamp(timestamp: impl Into<String>) -> Self {
        Self::InvalidTimestamp(timestamp.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether the error is caused by bad input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidTimestamp(_) | Self::Json(_))
    }

    /// Error category for logging and monitoring.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidTimestamp(_) => ErrorCategory::Validation,
            Self::Json(_) => ErrorCategory::Serialization,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Serialization,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Serialization => write!(f, "serialization"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
