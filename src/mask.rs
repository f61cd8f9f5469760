//! Row masks and the filtered-mask computation.
//!
//! A `RowMask` pairs a dense boolean-per-row mask with its compacted
//! ascending index list. The two representations are kept in agreement by
//! construction: the mask is private and every constructor derives the
//! index list atomically, so a published mask can never disagree with its
//! indices.

use crate::error::FilterEvaluationError;
use crate::filter::{ColumnData, Filter};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowMask {
    mask: Vec<bool>,
    indices: Vec<usize>,
}

impl RowMask {
    pub fn all_false(row_count: usize) -> Self {
        RowMask {
            mask: vec![false; row_count],
            indices: Vec::new(),
        }
    }

    pub fn all_true(row_count: usize) -> Self {
        RowMask {
            mask: vec![true; row_count],
            indices: (0..row_count).collect(),
        }
    }

    /// Build from a dense mask, deriving the compacted index list.
    pub fn from_mask(mask: Vec<bool>) -> Self {
        let indices = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &set)| set.then_some(i))
            .collect();
        RowMask { mask, indices }
    }

    /// Build from a set of row indices; out-of-range indices are dropped.
    pub fn from_indices(indices: &[usize], row_count: usize) -> Self {
        let mut mask = vec![false; row_count];
        for &i in indices {
            if i < row_count {
                mask[i] = true;
            }
        }
        RowMask::from_mask(mask)
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Ascending positions where the mask is true.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    /// Number of set rows.
    pub fn count(&self) -> usize {
        self.indices.len()
    }

    pub fn get(&self, row: usize) -> bool {
        self.mask.get(row).copied().unwrap_or(false)
    }

    /// Copy of the dense mask with one bit changed; `None` when the bit
    /// already holds the target value (callers short-circuit on it).
    pub fn with_bit(&self, row: usize, value: bool) -> Option<RowMask> {
        if row >= self.mask.len() || self.mask[row] == value {
            return None;
        }
        let mut mask = self.mask.clone();
        mask[row] = value;
        Some(RowMask::from_mask(mask))
    }
}

/// Failure of one filter during mask computation, tagged with the filter id
/// so the store can remove it.
#[derive(Debug, Clone)]
pub struct FilterFailure {
    pub filter_id: u64,
    pub error: FilterEvaluationError,
}

/// Compute the filtered row mask from the ordered filter list.
///
/// A row is in when every enabled filter (after inversion) passes it.
/// A filter whose predicate errors on any row contributes nothing: its
/// partial results are discarded, the failure is reported for removal, and
/// computation proceeds with the remaining filters. O(rows × filters).
pub fn compute_filtered_mask(
    filters: &[Filter],
    data: &ColumnData,
    row_count: usize,
) -> (RowMask, Vec<FilterFailure>) {
    let mut mask = vec![true; row_count];
    let mut failures = Vec::new();

    for filter in filters.iter().filter(|f| f.is_enabled) {
        let mut local = vec![false; row_count];
        let mut failed = None;

        for row in 0..row_count {
            match filter.apply(row, data) {
                Ok(pass) => local[row] = pass != filter.is_inverted,
                Err(reason) => {
                    failed = Some(FilterFailure {
                        filter_id: filter.id,
                        error: FilterEvaluationError {
                            filter: filter.label(),
                            row,
                            reason,
                        },
                    });
                    break;
                }
            }
        }

        match failed {
            Some(failure) => failures.push(failure),
            None => {
                for (bit, pass) in mask.iter_mut().zip(&local) {
                    *bit &= *pass;
                }
            }
        }
    }

    (RowMask::from_mask(mask), failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{CellValue, ColumnBuffer, ColumnType};
    use crate::filter::FilterKind;
    use std::sync::Arc;

    fn sample_data() -> ColumnData {
        let mut data = ColumnData::new();
        data.insert(
            "x".to_string(),
            Arc::new(ColumnBuffer::from_cells(
                ColumnType::Float,
                (0..20).map(|i| CellValue::Float(i as f32)).collect(),
                20,
            )),
        );
        data.insert(
            "label".to_string(),
            Arc::new(ColumnBuffer::from_cells(
                ColumnType::Category,
                (0..20).map(|i| CellValue::Int(i % 3)).collect(),
                20,
            )),
        );
        data
    }

    #[test]
    fn test_mask_and_indices_agree() {
        let mask = RowMask::from_mask(vec![true, false, true, true, false]);
        assert_eq!(mask.indices(), &[0, 2, 3]);
        assert_eq!(mask.count(), 3);
        assert!(mask.get(0));
        assert!(!mask.get(1));
        assert!(!mask.get(99));
    }

    #[test]
    fn test_from_indices_drops_out_of_range() {
        let mask = RowMask::from_indices(&[4, 1, 9], 5);
        assert_eq!(mask.indices(), &[1, 4]);
    }

    #[test]
    fn test_zero_filters_pass_all_rows() {
        let data = sample_data();
        let (mask, failures) = compute_filtered_mask(&[], &data, 20);
        assert!(failures.is_empty());
        assert_eq!(mask.count(), 20);
        assert_eq!(mask.indices(), (0..20).collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn test_conjunction_with_inverted_membership() {
        let data = sample_data();
        let range = Filter::new(
            1,
            FilterKind::Range {
                column: "x".to_string(),
                min: 0.0,
                max: 10.0,
            },
        );
        let mut membership = Filter::new(
            2,
            FilterKind::ValueSet {
                column: "label".to_string(),
                values: vec![CellValue::Int(0)],
            },
        );
        membership.is_inverted = true;

        let filters = vec![range, membership];
        let (mask, failures) = compute_filtered_mask(&filters, &data, 20);
        assert!(failures.is_empty());

        for row in 0..20 {
            let expected = (row as f64) <= 10.0 && row % 3 != 0;
            assert_eq!(mask.get(row), expected, "row {}", row);
        }
        // Indices are exactly the set positions, ascending.
        let expected: Vec<usize> = (0..20)
            .filter(|&row| row <= 10 && row % 3 != 0)
            .collect();
        assert_eq!(mask.indices(), expected.as_slice());
    }

    #[test]
    fn test_disabled_filter_has_no_effect() {
        let data = sample_data();
        let mut range = Filter::new(
            1,
            FilterKind::Range {
                column: "x".to_string(),
                min: 0.0,
                max: 1.0,
            },
        );
        range.is_enabled = false;

        let (mask, _) = compute_filtered_mask(&[range], &data, 20);
        assert_eq!(mask.count(), 20);
    }

    #[test]
    fn test_failing_filter_is_reported_and_skipped() {
        let data = sample_data();
        let bad = Filter::new(
            7,
            FilterKind::Range {
                column: "nope".to_string(),
                min: 0.0,
                max: 1.0,
            },
        );
        let good = Filter::new(
            8,
            FilterKind::Range {
                column: "x".to_string(),
                min: 0.0,
                max: 4.0,
            },
        );

        let (mask, failures) = compute_filtered_mask(&[bad, good], &data, 20);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].filter_id, 7);
        // The failing filter contributed nothing; the good one still applied.
        assert_eq!(mask.indices(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_with_bit_short_circuits() {
        let mask = RowMask::from_mask(vec![false, true, false]);
        assert!(mask.with_bit(1, true).is_none());
        assert!(mask.with_bit(5, true).is_none());
        let updated = mask.with_bit(0, true).unwrap();
        assert_eq!(updated.indices(), &[0, 1]);
    }
}
