//! Per-column value→color transfer functions.
//!
//! Two functions are built per eligible column: one spanning the full value
//! range and one restricted to the filtered subset's range. Both are rebuilt
//! whenever column data, the column set, the filtered indices, or the
//! palette changes.

use crate::column::{CellValue, Column, ColumnType};
use crate::filter::ColumnData;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub type Color = [u8; 3];

/// Color used for missing values and values outside a known domain.
pub const NO_DATA_COLOR: Color = [127, 127, 127];

/// External color-palette input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    /// Gradient stops for continuous mappings, low to high.
    pub continuous: Vec<Color>,
    /// Cycle for categorical mappings.
    pub categorical: Vec<Color>,
}

impl Default for Palette {
    fn default() -> Self {
        Palette {
            continuous: vec![[68, 1, 84], [33, 145, 140], [253, 231, 37]],
            categorical: vec![
                [31, 119, 180],
                [255, 127, 14],
                [44, 160, 44],
                [214, 39, 40],
                [148, 103, 189],
                [140, 86, 75],
                [227, 119, 194],
                [127, 127, 127],
                [188, 189, 34],
                [23, 190, 207],
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferFunction {
    /// Degenerate mapping used when the subset holds no usable values.
    Constant(Color),
    /// Linear gradient over `[min, max]`.
    Continuous {
        min: f64,
        max: f64,
        stops: Vec<Color>,
    },
    /// Discrete assignment per value label.
    Categorical { colors: BTreeMap<String, Color> },
}

impl TransferFunction {
    pub fn color_for(&self, cell: &CellValue) -> Color {
        match self {
            TransferFunction::Constant(color) => *color,
            TransferFunction::Continuous { min, max, stops } => {
                let value = match cell {
                    CellValue::Int(v) => *v as f64,
                    CellValue::Float(v) if !v.is_nan() => *v as f64,
                    _ => return NO_DATA_COLOR,
                };
                let t = if max > min {
                    ((value - min) / (max - min)).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                sample_gradient(stops, t)
            }
            TransferFunction::Categorical { colors } => cell
                .label()
                .and_then(|label| colors.get(&label).copied())
                .unwrap_or(NO_DATA_COLOR),
        }
    }
}

fn sample_gradient(stops: &[Color], t: f64) -> Color {
    match stops.len() {
        0 => NO_DATA_COLOR,
        1 => stops[0],
        n => {
            let pos = t * (n - 1) as f64;
            let i = (pos as usize).min(n - 2);
            let frac = pos - i as f64;
            let lo = stops[i];
            let hi = stops[i + 1];
            [
                (lo[0] as f64 + (hi[0] as f64 - lo[0] as f64) * frac).round() as u8,
                (lo[1] as f64 + (hi[1] as f64 - lo[1] as f64) * frac).round() as u8,
                (lo[2] as f64 + (hi[2] as f64 - lo[2] as f64) * frac).round() as u8,
            ]
        }
    }
}

/// The full-range and filtered-range transfer functions of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnColors {
    pub full: TransferFunction,
    pub filtered: TransferFunction,
}

fn continuous_over(
    buffer: &crate::column::ColumnBuffer,
    rows: impl Iterator<Item = usize>,
    palette: &Palette,
) -> TransferFunction {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut seen = false;
    for row in rows {
        if let Some(v) = buffer.value_as_f64(row) {
            min = min.min(v);
            max = max.max(v);
            seen = true;
        }
    }
    if !seen {
        return TransferFunction::Constant(NO_DATA_COLOR);
    }
    TransferFunction::Continuous {
        min,
        max,
        stops: palette.continuous.clone(),
    }
}

fn categorical_over(
    buffer: &crate::column::ColumnBuffer,
    rows: impl Iterator<Item = usize>,
    palette: &Palette,
) -> TransferFunction {
    let labels: BTreeSet<String> = rows
        .filter_map(|row| buffer.get(row).and_then(|cell| cell.label()))
        .collect();
    // An empty cycle maps every label to the no-data color, like
    // `sample_gradient` with zero stops.
    let colors = labels
        .into_iter()
        .enumerate()
        .map(|(i, label)| {
            let color = match palette.categorical.len() {
                0 => NO_DATA_COLOR,
                n => palette.categorical[i % n],
            };
            (label, color)
        })
        .collect();
    TransferFunction::Categorical { colors }
}

/// Build transfer functions for every eligible column.
///
/// `Int`/`Float` columns get continuous mappings, `Category`/`Bool` columns
/// categorical ones; all other types are skipped (no entry). Columns whose
/// buffer has not arrived are skipped too.
pub fn build_transfer_functions(
    columns: &[Column],
    data: &ColumnData,
    filtered_indices: &[usize],
    palette: &Palette,
) -> HashMap<String, ColumnColors> {
    let mut result = HashMap::new();

    for column in columns {
        let Some(buffer) = data.get(&column.key) else {
            continue;
        };

        let colors = match column.kind {
            ColumnType::Int | ColumnType::Float => ColumnColors {
                full: continuous_over(buffer, 0..buffer.len(), palette),
                filtered: continuous_over(buffer, filtered_indices.iter().copied(), palette),
            },
            ColumnType::Category | ColumnType::Bool => ColumnColors {
                full: categorical_over(buffer, 0..buffer.len(), palette),
                filtered: categorical_over(buffer, filtered_indices.iter().copied(), palette),
            },
            _ => continue,
        };

        result.insert(column.key.clone(), colors);
    }

    result
}
