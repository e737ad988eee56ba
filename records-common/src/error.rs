//! Error types for the records API

use thiserror::Error;

/// Records API error types
#[derive(Error, Debug)]
pub enum Error {
    // Lookup Errors
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    // Input Errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Argument count mismatch: {0}")]
    ArgumentCountMismatch(String),

    #[error("Operation not supported: {0}")]
    OperationNotSupported(String),

    // Storage Errors
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Data integrity violation: {0}")]
    DataIntegrityViolation(String),

    #[error("Query timed out after {0}ms")]
    QueryTimeout(u64),

    #[error("Database error: {0}")]
    DatabaseError(String),

    // General Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for records API operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP status code for each error type
impl Error {
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidInput(_) | Self::JsonError(_) => 400,

            // 404 Not Found
            Self::TableNotFound(_)
            | Self::ColumnNotFound(_)
            | Self::RecordNotFound(_)
            | Self::RouteNotFound(_) => 404,

            // 405 Method Not Allowed
            Self::OperationNotSupported(_) => 405,

            // 409 Conflict
            Self::DuplicateKey(_) => 409,

            // 422 Unprocessable Entity
            Self::ArgumentCountMismatch(_) | Self::DataIntegrityViolation(_) => 422,

            // 500 Internal Server Error
            Self::DatabaseError(_)
            | Self::InternalError(_)
            | Self::ConfigError(_)
            | Self::IoError(_) => 500,

            // 504 Gateway Timeout
            Self::QueryTimeout(_) => 504,
        }
    }

    /// Error code for API responses
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TableNotFound(_) => "table_not_found",
            Self::ColumnNotFound(_) => "column_not_found",
            Self::RecordNotFound(_) => "record_not_found",
            Self::RouteNotFound(_) => "route_not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::ArgumentCountMismatch(_) => "argument_count_mismatch",
            Self::OperationNotSupported(_) => "operation_not_supported",
            Self::DuplicateKey(_) => "duplicate_key",
            Self::DataIntegrityViolation(_) => "data_integrity_violation",
            Self::QueryTimeout(_) => "query_timeout",
            Self::DatabaseError(_) => "database_error",
            Self::ConfigError(_) => "config_error",
            Self::InternalError(_) => "internal_error",
            Self::IoError(_) => "io_error",
            Self::JsonError(_) => "json_error",
        }
    }

    /// Whether the error came from a constraint the client can fix
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::DuplicateKey(_) | Self::DataIntegrityViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(Error::TableNotFound("posts".into()).status_code(), 404);
        assert_eq!(Error::RecordNotFound("7".into()).status_code(), 404);
        assert_eq!(Error::DuplicateKey("id".into()).status_code(), 409);
        assert_eq!(Error::DataIntegrityViolation("fk".into()).status_code(), 422);
        assert_eq!(Error::QueryTimeout(100).status_code(), 504);
        assert_eq!(Error::DatabaseError("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::DuplicateKey(String::new()).error_code(), "duplicate_key");
        assert_eq!(
            Error::DataIntegrityViolation(String::new()).error_code(),
            "data_integrity_violation"
        );
        assert!(Error::DuplicateKey(String::new()).is_integrity_failure());
        assert!(!Error::InternalError(String::new()).is_integrity_failure());
    }
}
