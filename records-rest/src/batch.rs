//! Multi-id and multi-record requests
//!
//! A path segment like `1,2,3` addresses several records at once. Array
//! bodies pair with those ids by position. Items run one after another and
//! each keeps its own outcome.

use actix_web::http::StatusCode;
use serde_json::Value;

use records_common::error::{Error, Result};
use records_common::types::{ApiError, Record};

/// Split a comma-separated id segment
#[must_use]
pub fn split_ids(ids: &str) -> Vec<String> {
    ids.split(',').map(|id| id.trim().to_string()).collect()
}

/// Records of a body that is either one object or an array of objects
///
/// Returns the records and whether the body was an array.
///
/// # Errors
/// Returns `InvalidInput` when the body or an array element is not an object.
pub fn body_records(body: Value) -> Result<(Vec<Record>, bool)> {
    match body {
        Value::Object(record) => Ok((vec![record], false)),
        Value::Array(items) => {
            let records = items
                .into_iter()
                .map(|item| match item {
                    Value::Object(record) => Ok(record),
                    other => Err(Error::InvalidInput(format!(
                        "Expected an object, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((records, true))
        }
        other => Err(Error::InvalidInput(format!(
            "Expected an object or an array, got {other}"
        ))),
    }
}

/// Pair each id with its record
///
/// An object body needs exactly one id; an array body needs one id per
/// element.
///
/// # Errors
/// Returns `InvalidInput` for bodies that are not objects, and
/// `ArgumentCountMismatch` when the counts differ.
pub fn pair_ids(ids: &[String], body: Value) -> Result<Vec<(String, Record)>> {
    let (records, _) = body_records(body)?;
    if ids.len() != records.len() {
        return Err(Error::ArgumentCountMismatch(format!(
            "{} ids for {} records",
            ids.len(),
            records.len()
        )));
    }
    Ok(ids.iter().cloned().zip(records).collect())
}

/// Outcomes of the items of one request, in request order
#[derive(Debug, Default)]
pub struct BatchOutcome {
    items: Vec<Result<Value>>,
}

impl BatchOutcome {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: Result<Value>) {
        self.items.push(outcome);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether every item succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.items.iter().all(Result::is_ok)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.items.iter().filter_map(|item| item.as_ref().err())
    }

    /// The outcome of a one-item batch, or the batch itself
    ///
    /// # Errors
    /// Returns the batch unchanged when it does not hold exactly one item.
    pub fn into_single(mut self) -> std::result::Result<Result<Value>, Self> {
        if self.items.len() == 1 {
            if let Some(item) = self.items.pop() {
                return Ok(item);
            }
        }
        Err(self)
    }

    /// Status and body of the batch response
    ///
    /// Successful batches return the plain values. A batch with a failed
    /// item returns 424 and the values with each failure replaced by its
    /// error document.
    #[must_use]
    pub fn into_response(self) -> (StatusCode, Value) {
        let success = self.is_success();
        let body = self
            .items
            .into_iter()
            .map(|item| match item {
                Ok(value) => value,
                Err(error) => serde_json::to_value(ApiError::from(&error)).unwrap_or(Value::Null),
            })
            .collect();
        let status = if success {
            StatusCode::OK
        } else {
            StatusCode::FAILED_DEPENDENCY
        };
        (status, Value::Array(body))
    }
}

impl FromIterator<Result<Value>> for BatchOutcome {
    fn from_iter<I: IntoIterator<Item = Result<Value>>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_ids() {
        assert_eq!(split_ids("1, 2,3"), vec!["1", "2", "3"]);
        assert_eq!(split_ids("7"), vec!["7"]);
    }

    #[test]
    fn test_body_records() {
        let (records, many) = body_records(json!({"name": "Sammy"})).unwrap();
        assert_eq!(records.len(), 1);
        assert!(!many);

        let (records, many) = body_records(json!([{"a": 1}, {"a": 2}])).unwrap();
        assert_eq!(records.len(), 2);
        assert!(many);

        assert!(matches!(
            body_records(json!([{"a": 1}, 2])).unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert!(matches!(
            body_records(json!("text")).unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[test]
    fn test_pair_ids_counts_must_match() {
        let ids = split_ids("1,2");
        let pairs = pair_ids(&ids, json!([{"a": 1}, {"a": 2}])).unwrap();
        assert_eq!(pairs[1].0, "2");
        assert_eq!(pairs[1].1["a"], 2);

        assert!(matches!(
            pair_ids(&ids, json!({"a": 1})).unwrap_err(),
            Error::ArgumentCountMismatch(_)
        ));
    }

    #[test]
    fn test_failed_item_turns_status_to_424() {
        let outcome: BatchOutcome = vec![Ok(json!(1)), Ok(json!(1))].into_iter().collect();
        assert_eq!(outcome.into_response(), (StatusCode::OK, json!([1, 1])));

        let outcome: BatchOutcome = vec![
            Ok(json!(1)),
            Err(Error::RecordNotFound("sharks/9".to_string())),
        ]
        .into_iter()
        .collect();
        assert_eq!(outcome.errors().count(), 1);
        let (status, body) = outcome.into_response();
        assert_eq!(status.as_u16(), 424);
        assert_eq!(body[0], 1);
        assert_eq!(body[1]["code"], "record_not_found");
    }

    #[test]
    fn test_into_single() {
        let outcome: BatchOutcome = vec![Ok(json!(3))].into_iter().collect();
        assert_eq!(outcome.into_single().unwrap().unwrap(), json!(3));

        let outcome: BatchOutcome = vec![Ok(json!(1)), Ok(json!(2))].into_iter().collect();
        assert_eq!(outcome.into_single().unwrap_err().len(), 2);
    }
}
