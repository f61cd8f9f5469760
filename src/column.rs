//! Column metadata, cell values and typed value buffers.
//!
//! A `Column` describes one dataset column (key, type tag, tags). Raw wire
//! values arrive as JSON and are coerced per column type by `convert_value`;
//! the coerced cells are then densified once into a `ColumnBuffer`, a closed
//! union selected by the type tag. All downstream code pattern-matches on
//! the union instead of inspecting individual values.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

/// Column data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Float,
    Category,
    Bool,
    DateTime,
    Window,
    Sequence,
    Str,
}

impl ColumnType {
    /// Scalar numeric types get continuous color mappings and numeric stats.
    pub fn is_scalar(&self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Float)
    }

    /// Categorical types get value-count stats and discrete color mappings.
    pub fn is_categorical(&self) -> bool {
        matches!(self, ColumnType::Category | ColumnType::Bool | ColumnType::Str)
    }
}

/// Metadata for one dataset column. Immutable once a dataset generation is
/// fixed; replaced wholesale on full reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: ColumnType,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Column {
    pub fn new(key: impl Into<String>, kind: ColumnType) -> Self {
        Column {
            key: key.into(),
            kind,
            tags: BTreeSet::new(),
        }
    }
}

/// A single coerced cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Int(i32),
    Float(f32),
    Bool(bool),
    Str(String),
    DateTime(DateTime<Utc>),
    /// A 2-tuple range; endpoints are NaN when missing.
    Window(f32, f32),
    Sequence(Vec<f32>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            CellValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            CellValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            CellValue::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    /// Display label for categorical aggregation. `None` for missing values
    /// and for types that have no categorical reading.
    pub fn label(&self) -> Option<String> {
        match self {
            CellValue::Int(v) => Some(v.to_string()),
            CellValue::Bool(v) => Some(v.to_string()),
            CellValue::Str(v) => Some(v.clone()),
            _ => None,
        }
    }
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Naive timestamps are interpreted as UTC.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| format!("invalid datetime '{}'", raw))
}

fn endpoint_to_f32(raw: &JsonValue) -> Result<f32, String> {
    if raw.is_null() {
        return Ok(f32::NAN);
    }
    raw.as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| format!("expected number or null, got {}", raw))
}

/// Coerce one raw wire value to its column type.
///
/// Null maps to `Null` for every type except `Float`, where it maps to
/// `Float(NaN)` so numeric buffers stay densely numeric. Any type mismatch
/// is a decode failure (reported as the error reason).
pub fn convert_value(raw: &JsonValue, kind: ColumnType) -> Result<CellValue, String> {
    if raw.is_null() {
        return Ok(match kind {
            ColumnType::Float => CellValue::Float(f32::NAN),
            _ => CellValue::Null,
        });
    }

    match kind {
        ColumnType::Int | ColumnType::Category => {
            let v = raw
                .as_i64()
                .ok_or_else(|| format!("expected integer, got {}", raw))?;
            let v = i32::try_from(v).map_err(|_| format!("integer {} out of 32-bit range", v))?;
            Ok(CellValue::Int(v))
        }
        ColumnType::Float => {
            let v = raw
                .as_f64()
                .ok_or_else(|| format!("expected number, got {}", raw))?;
            Ok(CellValue::Float(v as f32))
        }
        ColumnType::Bool => {
            let v = raw
                .as_bool()
                .ok_or_else(|| format!("expected boolean, got {}", raw))?;
            Ok(CellValue::Bool(v))
        }
        ColumnType::Str => {
            let v = raw
                .as_str()
                .ok_or_else(|| format!("expected string, got {}", raw))?;
            Ok(CellValue::Str(v.to_string()))
        }
        ColumnType::DateTime => {
            let v = raw
                .as_str()
                .ok_or_else(|| format!("expected datetime string, got {}", raw))?;
            Ok(CellValue::DateTime(parse_datetime(v)?))
        }
        ColumnType::Window => {
            let arr = raw
                .as_array()
                .filter(|a| a.len() == 2)
                .ok_or_else(|| format!("expected 2-element window, got {}", raw))?;
            Ok(CellValue::Window(
                endpoint_to_f32(&arr[0])?,
                endpoint_to_f32(&arr[1])?,
            ))
        }
        ColumnType::Sequence => {
            let arr = raw
                .as_array()
                .ok_or_else(|| format!("expected sequence array, got {}", raw))?;
            let values = arr
                .iter()
                .map(endpoint_to_f32)
                .collect::<Result<Vec<f32>, String>>()?;
            Ok(CellValue::Sequence(values))
        }
    }
}

/// Contiguous, index-addressable value buffer for one column.
///
/// The variant is selected once at materialization time from the column's
/// type tag: `Int`/`Category` densify to 32-bit integers (`None` marks a
/// missing row), `Float` to 32-bit floats (NaN marks a missing row), and
/// every other type keeps a boxed per-row value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnBuffer {
    Int32(Vec<Option<i32>>),
    Float32(Vec<f32>),
    Boxed(Vec<CellValue>),
}

impl ColumnBuffer {
    /// Densify coerced cells into the buffer variant for `kind`, padding
    /// short columns with missing trailing rows up to `row_count`.
    pub fn from_cells(kind: ColumnType, cells: Vec<CellValue>, row_count: usize) -> Self {
        match kind {
            ColumnType::Int | ColumnType::Category => {
                let mut values: Vec<Option<i32>> =
                    cells.iter().map(CellValue::as_i32).collect();
                values.resize(row_count, None);
                ColumnBuffer::Int32(values)
            }
            ColumnType::Float => {
                let mut values: Vec<f32> = cells
                    .iter()
                    .map(|c| c.as_f32().unwrap_or(f32::NAN))
                    .collect();
                values.resize(row_count, f32::NAN);
                ColumnBuffer::Float32(values)
            }
            _ => {
                let mut values = cells;
                values.resize(row_count, CellValue::Null);
                ColumnBuffer::Boxed(values)
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnBuffer::Int32(v) => v.len(),
            ColumnBuffer::Float32(v) => v.len(),
            ColumnBuffer::Boxed(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reconstruct the cell value at `row`. `None` if out of range.
    pub fn get(&self, row: usize) -> Option<CellValue> {
        match self {
            ColumnBuffer::Int32(v) => v.get(row).map(|cell| match cell {
                Some(n) => CellValue::Int(*n),
                None => CellValue::Null,
            }),
            ColumnBuffer::Float32(v) => v.get(row).map(|f| CellValue::Float(*f)),
            ColumnBuffer::Boxed(v) => v.get(row).cloned(),
        }
    }

    /// Fast numeric access without boxing. `None` when the row is missing,
    /// out of range, or the buffer is not numeric.
    #[inline]
    pub fn value_as_f64(&self, row: usize) -> Option<f64> {
        match self {
            ColumnBuffer::Int32(v) => v.get(row).copied().flatten().map(|n| n as f64),
            ColumnBuffer::Float32(v) => v
                .get(row)
                .copied()
                .filter(|f| !f.is_nan())
                .map(|f| f as f64),
            ColumnBuffer::Boxed(_) => None,
        }
    }

    /// True when the row holds no value (or is out of range).
    #[inline]
    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            ColumnBuffer::Int32(v) => v.get(row).map_or(true, Option::is_none),
            ColumnBuffer::Float32(v) => v.get(row).map_or(true, |f| f.is_nan()),
            ColumnBuffer::Boxed(v) => v.get(row).map_or(true, CellValue::is_null),
        }
    }
}
