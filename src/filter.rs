//! Declarative row filters.
//!
//! Filters are a closed set of kinds evaluated per row against the column
//! data, plus an escape hatch for custom predicates. Enabled/inverted flags
//! and the combination semantics (logical AND across enabled filters) are
//! applied by the mask engine; `apply` reports the raw predicate only.

use crate::column::{CellValue, ColumnBuffer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type ColumnData = HashMap<String, Arc<ColumnBuffer>>;

/// Custom predicate over one row. Errors surface as filter evaluation
/// failures and get the filter removed.
pub type PredicateFn = Box<dyn Fn(usize, &ColumnData) -> Result<bool, String>>;

pub enum FilterKind {
    /// Row passes when the column's value is a member of `values`.
    ValueSet {
        column: String,
        values: Vec<CellValue>,
    },
    /// Row passes when the column's numeric value lies in `[min, max]`.
    /// Missing values never pass.
    Range {
        column: String,
        min: f64,
        max: f64,
    },
    /// Arbitrary predicate, identified by a display name.
    Predicate { name: String, func: PredicateFn },
}

impl fmt::Debug for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::ValueSet { column, values } => f
                .debug_struct("ValueSet")
                .field("column", column)
                .field("values", values)
                .finish(),
            FilterKind::Range { column, min, max } => f
                .debug_struct("Range")
                .field("column", column)
                .field("min", min)
                .field("max", max)
                .finish(),
            FilterKind::Predicate { name, .. } => {
                f.debug_struct("Predicate").field("name", name).finish()
            }
        }
    }
}

/// One entry of the ordered filter list. Insertion order is preserved for
/// display only; combination is order-independent (logical AND).
#[derive(Debug)]
pub struct Filter {
    pub id: u64,
    pub kind: FilterKind,
    pub is_enabled: bool,
    pub is_inverted: bool,
}

impl Filter {
    pub fn new(id: u64, kind: FilterKind) -> Self {
        Filter {
            id,
            kind,
            is_enabled: true,
            is_inverted: false,
        }
    }

    /// Human-readable label used in evaluation-error reports.
    pub fn label(&self) -> String {
        match &self.kind {
            FilterKind::ValueSet { column, .. } => format!("value-set({})", column),
            FilterKind::Range { column, .. } => format!("range({})", column),
            FilterKind::Predicate { name, .. } => name.clone(),
        }
    }

    /// Evaluate the raw predicate for `row`, ignoring the enabled and
    /// inverted flags.
    pub fn apply(&self, row: usize, data: &ColumnData) -> Result<bool, String> {
        match &self.kind {
            FilterKind::ValueSet { column, values } => {
                let buffer = data
                    .get(column)
                    .ok_or_else(|| format!("unknown column '{}'", column))?;
                let cell = buffer.get(row).unwrap_or(CellValue::Null);
                Ok(values.contains(&cell))
            }
            FilterKind::Range { column, min, max } => {
                let buffer = data
                    .get(column)
                    .ok_or_else(|| format!("unknown column '{}'", column))?;
                Ok(buffer
                    .value_as_f64(row)
                    .map_or(false, |v| v >= *min && v <= *max))
            }
            FilterKind::Predicate { func, .. } => func(row, data),
        }
    }
}
