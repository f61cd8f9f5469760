//! Interface to the external transport collaborator.
//!
//! The store never talks to a network itself; it consumes a `DataTransport`
//! implementation that fetches table and column payloads and issue reports,
//! and it receives inbound push notifications as `Notification` values.

use crate::column::Column;
use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One column of the table payload: descriptor plus its raw value array.
///
/// A column whose values have not been computed yet arrives with an empty
/// `values` array and is left out of the materialized column data.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnPayload {
    #[serde(flatten)]
    pub column: Column,
    #[serde(default)]
    pub values: Vec<JsonValue>,
}

/// Full table payload returned by `fetch_table`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    pub uid: String,
    #[serde(default)]
    pub filename: String,
    #[serde(alias = "generationID", default)]
    pub generation_id: u64,
    #[serde(default)]
    pub row_count: usize,
    pub columns: Vec<ColumnPayload>,
}

/// Structured failure reported by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct Problem {
    pub title: String,
    pub detail: String,
}

impl From<Problem> for TransportError {
    fn from(problem: Problem) -> Self {
        TransportError::Problem {
            title: problem.title,
            detail: problem.detail,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
}

/// A derived read-only annotation produced by the external analysis process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub description: String,
    #[serde(default)]
    pub rows: Vec<usize>,
    #[serde(default)]
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueReport {
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub running: bool,
}

/// Inbound push notification; each variant maps to one store entry point.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    Refresh,
    IssuesUpdated,
    ColumnsUpdated { keys: Vec<String> },
}

/// Async boundary to the data backend.
///
/// Implementations are expected to translate their own failures into
/// `TransportError`; the store converts these into `loading_error` state.
pub trait DataTransport {
    /// Fetch the whole table: descriptors plus raw values per column.
    fn fetch_table(
        &self,
    ) -> impl std::future::Future<Output = Result<TableDescriptor, TransportError>> + Send;

    /// Re-fetch the raw values of a single column. `generation_id` keys the
    /// backend's cache; values for a stale generation must not be served.
    fn fetch_column(
        &self,
        key: &str,
        generation_id: u64,
    ) -> impl std::future::Future<Output = Result<Vec<JsonValue>, TransportError>> + Send;

    /// Fetch the current issue report from the analysis process.
    fn fetch_issues(
        &self,
    ) -> impl std::future::Future<Output = Result<IssueReport, TransportError>> + Send;

    /// Ask the backend to open another table file.
    fn open_table(
        &self,
        path: &str,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;
    use serde_json::json;

    #[test]
    fn test_table_descriptor_deserializes() {
        let descriptor: TableDescriptor = serde_json::from_value(json!({
            "uid": "abc",
            "filename": "data.h5",
            "generationID": 4,
            "rowCount": 2,
            "columns": [
                {"key": "x", "type": "float", "values": [1.0, null]},
                {"key": "label", "type": "category", "tags": ["editable"], "values": [0, 1]},
            ],
        }))
        .unwrap();

        assert_eq!(descriptor.generation_id, 4);
        assert_eq!(descriptor.row_count, 2);
        assert_eq!(descriptor.columns.len(), 2);
        assert_eq!(descriptor.columns[0].column.kind, ColumnType::Float);
        assert_eq!(descriptor.columns[1].column.tags.len(), 1);
    }

    #[test]
    fn test_notification_tagged_decoding() {
        let n: Notification = serde_json::from_value(json!({"type": "Refresh"})).unwrap();
        assert!(matches!(n, Notification::Refresh));

        let n: Notification =
            serde_json::from_value(json!({"type": "ColumnsUpdated", "keys": ["a", "b"]}))
                .unwrap();
        match n {
            Notification::ColumnsUpdated { keys } => assert_eq!(keys, vec!["a", "b"]),
            other => panic!("unexpected notification {:?}", other),
        }
    }

    #[test]
    fn test_problem_converts_to_transport_error() {
        let problem: Problem = serde_json::from_value(
            json!({"title": "No table", "detail": "open a file first"}),
        )
        .unwrap();
        let err: TransportError = problem.into();
        assert_eq!(err.to_string(), "No table: open a file first");
    }
}
