/// cogfilter - Dimensional Filtering Engine for Faceted Displays
///
/// An in-memory index over one tabular dataset that keeps filters, grouped
/// counts and sort order consistent with the intents of an interactive UI.
/// Range filters update incrementally; groups recount lazily; multi-key sorts
/// are synthesized into a single ranked dimension.

pub mod error;
pub mod column;
pub mod store;
pub mod changeset;
pub mod display_info;
pub mod dimension;
pub mod group;
pub mod registry;
pub mod sort;
pub mod intent;
pub mod handler;

pub use error::{EngineError, Result};
pub use column::{Column, ColumnValue};
pub use store::{Record, RecordIndex, RecordIterator, RecordStore, Schema, INDEX_FIELD, MAX_DIMENSIONS};
pub use changeset::{Changeset, FilterChange};
pub use display_info::{ColumnInfo, DisplayInfo, VarType};
pub use dimension::{Dimension, DimensionFilter, DimensionKey};
pub use group::{Bucketing, Group, GroupBars, GroupEntry};
pub use registry::{DimensionRegistry, GroupRegistry};
pub use sort::{SortChange, SortDirection, SortEntry, SortPath, SortSpec, SortSynthesizer, SORT_DIMENSION};
pub use intent::{FilterSpec, FilterState, FilterViewAction, Intent};
pub use handler::IntentHandler;

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::collections::HashMap;

    fn row(price: f64, color: &str, size: &str) -> HashMap<String, ColumnValue> {
        let mut row = HashMap::new();
        row.insert("price".to_string(), ColumnValue::Number(price));
        row.insert("color".to_string(), ColumnValue::from(color));
        row.insert("size".to_string(), ColumnValue::from(size));
        row
    }

    fn catalog() -> (RecordStore, DisplayInfo) {
        let store = RecordStore::from_rows(vec![
            row(4.0, "red", "S"),
            row(18.0, "blue", "M"),
            row(9.5, "red", "L"),
            row(f64::NAN, "green", "M"),
            row(31.0, "blue", "S"),
            row(9.5, "blue", "S"),
        ])
        .unwrap();
        let info = DisplayInfo::new()
            .with_column("price", ColumnInfo::numeric_grid(0.0, 10.0, 4))
            .and_then(|i| i.with_column("color", ColumnInfo::factor()))
            .and_then(|i| i.with_column("size", ColumnInfo::factor()))
            .unwrap();
        (store, info)
    }

    fn apply(handler: &mut IntentHandler, json: &str) {
        handler.handle_json(json).unwrap();
    }

    #[test]
    fn test_complete_workflow() {
        let (store, info) = catalog();
        let mut h = IntentHandler::new(store, info);

        apply(&mut h, r#"{"type": "SET_FILTER_VIEW", "which": "add", "name": "price"}"#);
        apply(&mut h, r#"{"type": "SET_FILTER_VIEW", "which": "add", "name": "color"}"#);

        // Histogram over the full set; NaN is not counted and the empty
        // 20-30 bucket has no bar
        let bars = h.group_bars("price").unwrap();
        let keys: Vec<DimensionKey> = bars.entries.iter().map(|e| e.key.clone()).collect();
        assert_eq!(keys, vec![DimensionKey::from(0.0), DimensionKey::from(10.0), DimensionKey::from(30.0)]);
        let counts: Vec<usize> = bars.entries.iter().map(|e| e.count).collect();
        assert_eq!(counts, vec![3, 1, 1]);
        assert_eq!(bars.max_count, 3);

        apply(
            &mut h,
            r#"{"type": "SET_FILTER", "sort": true, "filter": {"color": {"varType": "factor", "value": ["blue"]}}}"#,
        );
        apply(
            &mut h,
            r#"{"type": "SET_SORT", "sort": [{"name": "size", "dir": "desc"}, {"name": "price", "dir": "asc"}]}"#,
        );

        assert_eq!(h.active_len(), 3);
        // size desc: S, S, M; within S, price asc
        assert_eq!(h.ordered_indices(0, 10), vec![5, 4, 1]);

        let page: Vec<RecordIndex> = h.page(2, 2).unwrap().iter().map(|r| r.index).collect();
        assert_eq!(page, vec![1]);

        // Price bars now only see blue records
        let counts: Vec<usize> = h
            .group_entries("price")
            .unwrap()
            .iter()
            .map(|e| e.count)
            .collect();
        assert_eq!(counts, vec![1, 1, 1]);
    }

    #[test]
    fn test_rank_covers_filtered_records() {
        let (store, info) = catalog();
        let mut h = IntentHandler::new(store, info);

        apply(
            &mut h,
            r#"{"type": "SET_FILTER", "sort": true, "filter": {"size": {"varType": "factor", "value": ["M"]}}}"#,
        );
        apply(
            &mut h,
            r#"{"type": "SET_SORT", "sort": [{"name": "color", "dir": "asc"}, {"name": "price", "dir": "desc"}]}"#,
        );
        assert_eq!(h.ordered_indices(0, 10), vec![1, 3]);

        // Records hidden while the sort was built still come back ranked
        apply(&mut h, r#"{"type": "SET_FILTER", "sort": true, "filter": "size"}"#);
        assert_eq!(h.ordered_indices(0, 10), vec![4, 1, 5, 3, 2, 0]);
    }

    #[test]
    fn test_multi_key_sort_is_deterministic() {
        let order = || {
            let (store, info) = catalog();
            let mut h = IntentHandler::new(store, info);
            apply(
                &mut h,
                r#"{"type": "SET_SORT", "sort": [{"name": "price", "dir": "asc"}, {"name": "size", "dir": "asc"}]}"#,
            );
            h.ordered_indices(0, 10)
        };
        let first = order();
        assert_eq!(first, order());
        // 9.5/L before 9.5/S; NaN price sorts last
        assert_eq!(first, vec![0, 2, 5, 1, 4, 3]);
    }

    #[test]
    fn test_sort_does_not_use_filter_slots() {
        let mut rows = vec![HashMap::new(), HashMap::new()];
        let mut info = DisplayInfo::new();
        for i in 0..=MAX_DIMENSIONS {
            let name = format!("c{}", i);
            rows[0].insert(name.clone(), ColumnValue::Number(i as f64 + 1.0));
            rows[1].insert(name.clone(), ColumnValue::Number(0.0));
            info = info.with_column(name, ColumnInfo::factor()).unwrap();
        }
        let mut h = IntentHandler::new(RecordStore::from_rows(rows).unwrap(), info);

        for i in 0..MAX_DIMENSIONS {
            let intent = Intent::SetFilterView {
                which: FilterViewAction::Add,
                name: format!("c{}", i),
            };
            h.handle(intent).unwrap();
        }
        assert_eq!(h.dimensions().len(), MAX_DIMENSIONS);

        let sort = Intent::SetSort {
            sort: SortChange::Replace(SortSpec::from_terms(["c0"])),
        };
        h.handle(sort).unwrap();
        assert_eq!(h.sort_spec(), &SortSpec::from_terms(["c0"]));
        assert_eq!(h.ordered_indices(0, 10), vec![1, 0]);

        // Filter dimensions are still bounded
        let extra = Intent::SetFilterView {
            which: FilterViewAction::Add,
            name: format!("c{}", MAX_DIMENSIONS),
        };
        assert!(matches!(h.handle(extra), Err(EngineError::DimensionLimit { .. })));
        assert_eq!(h.ordered_indices(0, 10), vec![1, 0]);
    }

    #[test]
    fn test_changes_describe_each_update() {
        let (store, info) = catalog();
        let mut h = IntentHandler::new(store, info);

        apply(
            &mut h,
            r#"{"type": "SET_FILTER", "sort": true, "filter": {"price": {"varType": "numeric", "value": {"from": 5, "to": 20}}}}"#,
        );
        apply(
            &mut h,
            r#"{"type": "SET_FILTER", "sort": true, "filter": {"price": {"varType": "numeric", "value": {"from": 9, "to": 40}}}}"#,
        );

        let changes = h.drain_changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].removed, vec![0, 3, 4]);
        assert_eq!(changes[1].added, vec![4]);
        assert!(changes[1].removed.is_empty());
    }
}
