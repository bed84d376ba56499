use reqwest::StatusCode;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed configuration, recipient or query parameters
    #[error("Validation error: {0}")]
    Validation(String),

    /// Monthly send quota would be exceeded
    #[error("Send quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Stale concurrency token on a conditioned write
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Document or collection already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backing document store failed or is unreachable
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            AppError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            AppError::AlreadyExists(_) => "ALREADY_EXISTS",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error is a fatal system error rather than a caller mistake
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::StorageUnavailable(_) | AppError::Timeout(_) | AppError::Internal(_)
        )
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from bincode::Error
impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from sled::Error
impl From<sled::Error> for AppError {
    fn from(err: sled::Error) -> Self {
        AppError::StorageUnavailable(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Conversion from tokio::time::error::Elapsed
impl From<tokio::time::error::Elapsed> for AppError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AppError::Timeout(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::NotFound("test".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Validation("test".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::QuotaExceeded("test".to_string()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::ConcurrencyConflict("test".to_string()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::NotFound("test".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            AppError::QuotaExceeded("test".to_string()).error_code(),
            "QUOTA_EXCEEDED"
        );
        assert_eq!(
            AppError::StorageUnavailable("down".to_string()).error_code(),
            "STORAGE_UNAVAILABLE"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AppError::Timeout("store".to_string()).is_fatal());
        assert!(AppError::StorageUnavailable("down".to_string()).is_fatal());
        assert!(!AppError::Validation("bad".to_string()).is_fatal());
        assert!(!AppError::ConcurrencyConflict("stale".to_string()).is_fatal());
    }
}
