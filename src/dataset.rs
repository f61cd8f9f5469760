//! Dataset assembly: the source-of-truth columnar snapshot.
//!
//! A `Dataset` is materialized wholesale from a `TableDescriptor` and never
//! mutated in place except for single-column buffer replacement. Buffers are
//! held behind `Arc` so derived computations can snapshot them cheaply.

use crate::column::{convert_value, CellValue, Column, ColumnBuffer};
use crate::error::DecodeError;
use crate::transport::TableDescriptor;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub uid: String,
    pub filename: String,
    /// Store-side monotonic counter, bumped once per successful full load.
    /// Invalidates any async computation keyed to a previous load.
    pub generation_id: u64,
    pub row_count: usize,
    pub columns: Vec<Column>,
    pub column_data: HashMap<String, Arc<ColumnBuffer>>,
}

impl Dataset {
    pub fn empty() -> Self {
        Dataset::default()
    }

    /// Coerce and densify a table payload into a dataset.
    ///
    /// Row count is the maximum length across all raw value arrays and the
    /// wire row count; shorter columns get missing trailing rows. A column
    /// that arrived without values stays absent from `column_data` rather
    /// than being zero-filled. Any coercion failure aborts the whole load.
    pub fn materialize(
        descriptor: TableDescriptor,
        generation_id: u64,
    ) -> Result<Self, DecodeError> {
        let row_count = descriptor
            .columns
            .iter()
            .map(|payload| payload.values.len())
            .max()
            .unwrap_or(0)
            .max(descriptor.row_count);

        let mut columns = Vec::with_capacity(descriptor.columns.len());
        let mut column_data = HashMap::new();

        for payload in descriptor.columns {
            let column = payload.column;

            if !payload.values.is_empty() || row_count == 0 {
                let cells = payload
                    .values
                    .iter()
                    .enumerate()
                    .map(|(row, raw)| {
                        convert_value(raw, column.kind).map_err(|reason| DecodeError {
                            column: column.key.clone(),
                            row,
                            reason,
                        })
                    })
                    .collect::<Result<Vec<CellValue>, DecodeError>>()?;

                let buffer = ColumnBuffer::from_cells(column.kind, cells, row_count);
                column_data.insert(column.key.clone(), Arc::new(buffer));
            }

            columns.push(column);
        }

        Ok(Dataset {
            uid: descriptor.uid,
            filename: descriptor.filename,
            generation_id,
            row_count,
            columns,
            column_data,
        })
    }

    /// Replace one column's buffer with freshly fetched raw values.
    ///
    /// The row count is fixed for the lifetime of a generation: a shorter
    /// payload is padded with missing trailing rows and a longer one is
    /// truncated to `row_count`. Growing the table requires a full reload.
    pub fn replace_column_values(
        &mut self,
        key: &str,
        values: &[serde_json::Value],
    ) -> Result<(), DecodeError> {
        let Some(column) = self.columns.iter().find(|c| c.key == key) else {
            return Err(DecodeError {
                column: key.to_string(),
                row: 0,
                reason: "unknown column".to_string(),
            });
        };

        let cells = values
            .iter()
            .enumerate()
            .map(|(row, raw)| {
                convert_value(raw, column.kind).map_err(|reason| DecodeError {
                    column: column.key.clone(),
                    row,
                    reason,
                })
            })
            .collect::<Result<Vec<CellValue>, DecodeError>>()?;

        let buffer = ColumnBuffer::from_cells(column.kind, cells, self.row_count);
        self.column_data
            .insert(column.key.clone(), Arc::new(buffer));
        Ok(())
    }

    pub fn column(&self, key: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.key == key)
    }

    pub fn buffer(&self, key: &str) -> Option<&Arc<ColumnBuffer>> {
        self.column_data.get(key)
    }
}
