//! Common types for the records API

use serde::{Deserialize, Serialize};

use crate::error::Error;

// ============================================================================
// Record Types
// ============================================================================

/// A single row, keyed by column name
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Count reported when the total number of matching rows was not computed
pub const UNKNOWN_COUNT: i64 = -1;

/// Result of a list operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListDocument {
    pub records: Vec<Record>,
    /// Total matching rows, or `UNKNOWN_COUNT` when no page was requested
    #[serde(
        default = "unknown_count",
        skip_serializing_if = "is_unknown_count"
    )]
    pub results: i64,
}

impl ListDocument {
    pub fn new(records: Vec<Record>, results: i64) -> Self {
        Self { records, results }
    }

    /// Whether the total count was computed
    #[must_use]
    pub fn has_count(&self) -> bool {
        self.results != UNKNOWN_COUNT
    }
}

fn unknown_count() -> i64 {
    UNKNOWN_COUNT
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_unknown_count(count: &i64) -> bool {
    *count == UNKNOWN_COUNT
}

// ============================================================================
// Response Types
// ============================================================================

/// Standard API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<&Error> for ApiError {
    fn from(error: &Error) -> Self {
        Self::new(error.error_code(), error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error() {
        let error = ApiError::new("invalid_input", "Missing record body")
            .with_hint("Send a JSON object");
        assert_eq!(error.code, "invalid_input");
        assert!(error.hint.is_some());
    }

    #[test]
    fn test_api_error_from_error() {
        let error = ApiError::from(&Error::TableNotFound("ghosts".to_string()));
        assert_eq!(error.code, "table_not_found");
        assert_eq!(error.message, "Table not found: ghosts");
    }

    #[test]
    fn test_list_document_hides_unknown_count() {
        let document = ListDocument::new(vec![], UNKNOWN_COUNT);
        let json = serde_json::to_value(&document).unwrap();
        assert!(json.get("results").is_none());
        assert!(!document.has_count());

        let document = ListDocument::new(vec![], 25);
        let json = serde_json::to_value(&document).unwrap();
        assert_eq!(json["results"], 25);
    }
}
