//! Per-column aggregate statistics over an arbitrary row subset.
//!
//! Statistics are pure functions of (columns, column data, subset mask) and
//! are recomputed wholesale; the three store instances (full / filtered /
//! selected) are never derived from one another.

use crate::column::{Column, ColumnType};
use crate::filter::ColumnData;
use crate::mask::RowMask;
use std::collections::{BTreeMap, HashMap};

pub const HISTOGRAM_BUCKETS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBucket {
    pub lo: f64,
    pub hi: f64,
    pub count: usize,
}

/// Aggregates for a numeric column. All-missing subsets degrade to the
/// defined empty record: count 0, `None` aggregates, empty histogram.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NumericStats {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stddev: Option<f64>,
    pub histogram: Vec<HistogramBucket>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CategoricalStats {
    pub counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnStats {
    Numeric(NumericStats),
    Categorical(CategoricalStats),
}

pub type StatsMap = HashMap<String, ColumnStats>;

fn numeric_stats(values: &[f64]) -> NumericStats {
    if values.is_empty() {
        return NumericStats::default();
    }

    let count = values.len();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / count as f64;
    // Population standard deviation.
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    let stddev = variance.sqrt();

    let histogram = if min == max {
        vec![HistogramBucket {
            lo: min,
            hi: max,
            count,
        }]
    } else {
        let width = (max - min) / HISTOGRAM_BUCKETS as f64;
        let mut buckets: Vec<HistogramBucket> = (0..HISTOGRAM_BUCKETS)
            .map(|i| HistogramBucket {
                lo: min + i as f64 * width,
                hi: min + (i + 1) as f64 * width,
                count: 0,
            })
            .collect();
        for &v in values {
            let i = (((v - min) / width) as usize).min(HISTOGRAM_BUCKETS - 1);
            buckets[i].count += 1;
        }
        buckets
    };

    NumericStats {
        count,
        min: Some(min),
        max: Some(max),
        mean: Some(mean),
        stddev: Some(stddev),
        histogram,
    }
}

/// Compute stats for every eligible column over the given subset.
///
/// No mask means all rows. Numeric types (`Int`, `Float`) get numeric
/// aggregates with missing values excluded; categorical types (`Category`,
/// `Bool`, `Str`) get value counts; other types produce no entry, as do
/// columns whose buffer has not arrived.
pub fn compute_stats(
    columns: &[Column],
    data: &ColumnData,
    subset: Option<&RowMask>,
) -> StatsMap {
    let mut stats = StatsMap::new();

    for column in columns {
        let Some(buffer) = data.get(&column.key) else {
            continue;
        };

        let rows: Vec<usize> = match subset {
            Some(mask) => mask.indices().to_vec(),
            None => (0..buffer.len()).collect(),
        };

        let entry = match column.kind {
            ColumnType::Int | ColumnType::Float => {
                let values: Vec<f64> = rows
                    .iter()
                    .filter_map(|&row| buffer.value_as_f64(row))
                    .collect();
                ColumnStats::Numeric(numeric_stats(&values))
            }
            ColumnType::Category | ColumnType::Bool | ColumnType::Str => {
                let mut counts = BTreeMap::new();
                for &row in &rows {
                    if let Some(label) = buffer.get(row).and_then(|cell| cell.label()) {
                        *counts.entry(label).or_insert(0) += 1;
                    }
                }
                ColumnStats::Categorical(CategoricalStats { counts })
            }
            _ => continue,
        };

        stats.insert(column.key.clone(), entry);
    }

    stats
}
