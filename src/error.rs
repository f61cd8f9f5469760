//! Error taxonomy for the dataset store.
//!
//! Transport failures are caught at the boundary and turned into store
//! state (`loading_error`) rather than propagated to callers. Filter
//! evaluation failures are recovered locally: the offending filter is
//! removed and mask computation continues with the rest. Decode failures
//! abort the triggering load; the dataset keeps its last good state.

use thiserror::Error;

/// Failure while talking to the external transport collaborator.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Network-level failure (connection, timeout, protocol).
    #[error("network error: {0}")]
    Network(String),

    /// Structured problem reported by the backend.
    #[error("{title}: {detail}")]
    Problem { title: String, detail: String },
}

/// A raw wire value could not be coerced to its column's type.
#[derive(Debug, Clone, Error)]
#[error("cannot decode column '{column}' at row {row}: {reason}")]
pub struct DecodeError {
    pub column: String,
    pub row: usize,
    pub reason: String,
}

/// A filter's predicate failed while evaluating a row.
///
/// Recoverable: the store removes the filter and recomputation proceeds
/// without it, so one bad filter never blanks the whole view.
#[derive(Debug, Clone, Error)]
#[error("filter '{filter}' failed at row {row}: {reason}")]
pub struct FilterEvaluationError {
    /// Human-readable label of the failing filter.
    pub filter: String,
    pub row: usize,
    pub reason: String,
}

/// Umbrella error for the load/refresh paths.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::Problem {
            title: "Table not found".to_string(),
            detail: "no table is open".to_string(),
        };
        assert_eq!(err.to_string(), "Table not found: no table is open");

        let err = DecodeError {
            column: "age".to_string(),
            row: 3,
            reason: "expected integer".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot decode column 'age' at row 3: expected integer"
        );
    }

    #[test]
    fn test_store_error_from_transport() {
        let err: StoreError = TransportError::Network("refused".to_string()).into();
        assert!(matches!(err, StoreError::Transport(_)));
    }
}
