/// DataLens - Reactive Tabular Dataset Store
///
/// A client-side store for tabular datasets of heterogeneous columns, with
/// derived row masks (filtered / selected / highlighted), per-column
/// statistics and color transfer functions, a generation-guarded background
/// relevance computation, and a pub/sub change bus for derived-state
/// updates.

pub mod bus;
pub mod colors;
pub mod column;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod mask;
pub mod relevance;
pub mod stats;
pub mod store;
pub mod transport;

pub use bus::{ChangeBus, SubscriptionId};
pub use colors::{Color, ColumnColors, Palette, TransferFunction, NO_DATA_COLOR};
pub use column::{CellValue, Column, ColumnBuffer, ColumnType};
pub use dataset::Dataset;
pub use error::{DecodeError, FilterEvaluationError, StoreError, TransportError};
pub use filter::{Filter, FilterKind};
pub use mask::RowMask;
pub use relevance::{ColumnRelevance, RelevanceInputs, RelevanceScorer};
pub use stats::{CategoricalStats, ColumnStats, NumericStats, StatsMap};
pub use store::{DatasetStore, SortDirection, SortState, StoreUpdate, Topic};
pub use transport::{
    DataTransport, Issue, IssueReport, IssueSeverity, Notification, TableDescriptor,
};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::transport::ColumnPayload;
    use serde_json::{json, Value as JsonValue};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    struct JsonTransport {
        table: serde_json::Value,
    }

    impl DataTransport for JsonTransport {
        async fn fetch_table(&self) -> Result<TableDescriptor, TransportError> {
            serde_json::from_value(self.table.clone())
                .map_err(|e| TransportError::Network(e.to_string()))
        }

        async fn fetch_column(
            &self,
            key: &str,
            _generation_id: u64,
        ) -> Result<Vec<JsonValue>, TransportError> {
            Err(TransportError::Network(format!("no column '{}'", key)))
        }

        async fn fetch_issues(&self) -> Result<IssueReport, TransportError> {
            Ok(IssueReport {
                issues: Vec::new(),
                running: false,
            })
        }

        async fn open_table(&self, _path: &str) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_complete_workflow() {
        // A small measurement table: one numeric signal, one class label,
        // one timestamp.
        let transport = JsonTransport {
            table: json!({
                "uid": "run-42",
                "filename": "run42.h5",
                "columns": [
                    {"key": "energy", "type": "float",
                     "values": [0.5, 1.5, 2.5, 3.5, null, 5.5]},
                    {"key": "class", "type": "category",
                     "values": [0, 0, 1, 1, 2, 2]},
                    {"key": "ts", "type": "datetime",
                     "values": ["2026-08-25T10:00:00Z", "2026-08-25T10:00:01Z",
                                "2026-08-25T10:00:02Z", "2026-08-25T10:00:03Z",
                                "2026-08-25T10:00:04Z", "2026-08-25T10:00:05Z"]},
                ],
            }),
        };

        let scorer = |inputs: &RelevanceInputs| {
            inputs
                .columns
                .iter()
                .map(|c| (c.key.clone(), inputs.filtered_indices.len() as f64))
                .collect::<HashMap<_, _>>()
        };

        let mut store = DatasetStore::new(transport, scorer, ChangeBus::new());

        let filtered_updates = Rc::new(RefCell::new(Vec::new()));
        let log = filtered_updates.clone();
        store.subscribe(Topic::FilteredMask, move |update| {
            if let StoreUpdate::FilteredMask(mask) = update {
                log.borrow_mut().push(mask.indices().to_vec());
            }
        });

        store.fetch().await;
        assert!(store.loading_error().is_none());
        assert_eq!(store.dataset().row_count, 6);

        // Restrict to the low-energy half, excluding the missing row.
        store.add_filter(FilterKind::Range {
            column: "energy".to_string(),
            min: 0.0,
            max: 3.0,
        });
        assert_eq!(store.filtered().indices(), &[0, 1, 2]);

        // Filtered stats and colors follow the mask.
        let ColumnStats::Numeric(energy) = &store.filtered_stats()["energy"] else {
            panic!("expected numeric stats");
        };
        assert_eq!(energy.count, 3);
        assert_eq!(energy.max, Some(2.5));

        let TransferFunction::Continuous { min, max, .. } = &store.color_maps()["energy"].filtered
        else {
            panic!("expected continuous transfer function");
        };
        assert_eq!(*min, 0.5);
        assert_eq!(*max, 2.5);

        // Select two rows and inspect selected stats.
        store.select_rows(vec![false, true, true, false, false, false]);
        let ColumnStats::Categorical(class) = &store.selected_stats()["class"] else {
            panic!("expected categorical stats");
        };
        assert_eq!(class.counts["0"], 1);
        assert_eq!(class.counts["1"], 1);

        // Drain the relevance pipeline; the final result reflects the
        // current filtered subset.
        while store.is_computing_relevance() {
            store.process_next_completion().await;
        }
        let relevance = store.relevance().unwrap();
        assert_eq!(relevance.scores["energy"], 3.0);

        // The bus saw every intermediate filtered mask, unfiltered first.
        let updates = filtered_updates.borrow();
        assert_eq!(updates.first().unwrap().len(), 6);
        assert_eq!(updates.last().unwrap(), &vec![0, 1, 2]);
    }

    #[test]
    fn test_wire_payload_decodes_into_buffers() {
        let payload: ColumnPayload = serde_json::from_value(json!({
            "key": "window",
            "type": "window",
            "tags": ["derived"],
            "values": [[0.0, 1.0], [null, 2.0], null],
        }))
        .unwrap();
        assert_eq!(payload.column.kind, ColumnType::Window);

        let cells: Vec<CellValue> = payload
            .values
            .iter()
            .map(|v| column::convert_value(v, payload.column.kind).unwrap())
            .collect();
        let buffer = ColumnBuffer::from_cells(payload.column.kind, cells, 3);

        assert_eq!(buffer.get(0), Some(CellValue::Window(0.0, 1.0)));
        // A null endpoint decodes to NaN, a null cell to a missing window.
        match buffer.get(1) {
            Some(CellValue::Window(lo, hi)) => {
                assert!(lo.is_nan());
                assert_eq!(hi, 2.0);
            }
            other => panic!("expected window, got {:?}", other),
        }
        assert!(buffer.is_missing(2));
    }
}
