/// cogfilter Record Store
///
/// The Record Store owns the full record set of a display in columnar form,
/// together with the per-record filter state every dimension writes into.
/// Records are immutable after load; only the filter masks change.
///
/// Each live dimension owns one bit of a per-record `u64` mask. A set bit means
/// "this dimension rejects this record", so a record is in the Active Subset
/// exactly when its mask is zero. The active count is maintained on every
/// zero/non-zero transition, which keeps size queries O(1).
///
/// # Examples
///
/// ```
/// use cogfilter::RecordStore;
///
/// let store = RecordStore::from_json(r#"[
///     {"a": 3, "color": "red"},
///     {"a": 1, "color": "blue"}
/// ]"#).unwrap();
///
/// assert_eq!(store.len(), 2);
/// assert_eq!(store.active_len(), 2);
/// assert_eq!(store.value(1, "color").as_str(), Some("blue"));
/// assert_eq!(store.record(1).unwrap().index, 1);
/// ```

use crate::changeset::{Changeset, FilterChange};
use crate::column::{Column, ColumnValue};
use crate::error::{EngineError, Result};
use log::info;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Stable identity of a record: its load position.
pub type RecordIndex = u32;

/// Name of the synthetic identity field exposed on every record.
pub const INDEX_FIELD: &str = "__index";

/// Maximum number of dimensions that can hold a filter slot at once.
pub const MAX_DIMENSIONS: usize = 64;

const NULL_VALUE: &ColumnValue = &ColumnValue::Null;

/// Column names of a store, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    columns: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Schema {
    fn push(&mut self, name: &str) -> usize {
        if let Some(&pos) = self.positions.get(name) {
            return pos;
        }
        let pos = self.columns.len();
        self.columns.push(name.to_string());
        self.positions.insert(name.to_string(), pos);
        pos
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|s| s.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }
}

/// A materialized record, as handed to downstream consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub index: RecordIndex,
    pub fields: HashMap<String, ColumnValue>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.fields.get(column)
    }

    /// JSON object with every field plus `__index`.
    pub fn to_json(&self) -> JsonValue {
        let mut obj: serde_json::Map<String, JsonValue> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        obj.insert(INDEX_FIELD.to_string(), JsonValue::from(self.index));
        JsonValue::Object(obj)
    }
}

/// The full record set plus the filter state shared by all dimensions.
pub struct RecordStore {
    schema: Schema,
    columns: Vec<Column>,
    len: usize,
    /// masks[i] has bit b set when the dimension owning slot b rejects record i
    masks: Vec<u64>,
    /// Bit b set when slot b is owned by a live dimension
    used_slots: u64,
    active_len: usize,
    changeset: Changeset,
}

impl RecordStore {
    /// Build a store from rows of named values, assigning `__index` by position.
    ///
    /// Rows may omit columns; missing values load as null. An `__index` field
    /// present in the input is ignored.
    pub fn from_rows(rows: Vec<HashMap<String, ColumnValue>>) -> Result<Self> {
        if rows.len() > RecordIndex::MAX as usize {
            return Err(EngineError::InvalidDataset(format!(
                "{} records exceed the supported maximum of {}",
                rows.len(),
                RecordIndex::MAX
            )));
        }

        let len = rows.len();
        let mut schema = Schema::default();
        let mut columns: Vec<Column> = Vec::new();

        for (row_idx, row) in rows.into_iter().enumerate() {
            // Sorted for a deterministic column order when rows are HashMaps
            let mut fields: Vec<(String, ColumnValue)> = row
                .into_iter()
                .filter(|(name, _)| name != INDEX_FIELD)
                .collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));

            for (name, value) in fields {
                let pos = schema.push(&name);
                if pos == columns.len() {
                    columns.push(Column::with_capacity(name, len));
                }
                let col = &mut columns[pos];
                col.pad_to(row_idx);
                col.push(value);
            }
        }

        for col in columns.iter_mut() {
            col.pad_to(len);
        }

        info!("loaded {} records with {} columns", len, columns.len());

        Ok(RecordStore {
            schema,
            columns,
            len,
            masks: vec![0; len],
            used_slots: 0,
            active_len: len,
            changeset: Changeset::new(),
        })
    }

    /// Build a store from a JSON array of objects.
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: Vec<JsonValue> = serde_json::from_str(json)?;

        let mut rows = Vec::with_capacity(parsed.len());
        for (i, item) in parsed.iter().enumerate() {
            let obj = item.as_object().ok_or_else(|| {
                EngineError::InvalidDataset(format!("element {} is not an object", i))
            })?;
            rows.push(
                obj.iter()
                    .map(|(k, v)| (k.clone(), ColumnValue::from_json(v)))
                    .collect(),
            );
        }

        Self::from_rows(rows)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Total number of records, filtered or not.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of records passing every active dimension filter.
    pub fn active_len(&self) -> usize {
        self.active_len
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.schema.column_index(name).map(|i| &self.columns[i])
    }

    /// Value of `column` for record `index`; null for unknown columns or
    /// out-of-range records.
    pub fn value(&self, index: usize, column: &str) -> &ColumnValue {
        self.column(column)
            .and_then(|c| c.get(index))
            .unwrap_or(NULL_VALUE)
    }

    pub fn record(&self, index: usize) -> Result<Record> {
        if index >= self.len {
            return Err(EngineError::RecordOutOfRange {
                index,
                len: self.len,
            });
        }

        let fields = self
            .columns
            .iter()
            .filter_map(|col| col.get(index).map(|v| (col.name().to_string(), v.clone())))
            .collect();

        Ok(Record {
            index: index as RecordIndex,
            fields,
        })
    }

    /// Every record in load order, regardless of filters.
    pub fn iter_records(&self) -> RecordIterator<'_> {
        RecordIterator {
            store: self,
            index: 0,
        }
    }

    /// Returns true if record `index` passes every dimension filter.
    pub fn is_active(&self, index: RecordIndex) -> bool {
        self.masks.get(index as usize).copied() == Some(0)
    }

    /// Returns true if record `index` passes every filter except those in `ignore`.
    pub fn is_active_ignoring(&self, index: RecordIndex, ignore: u64) -> bool {
        self.masks
            .get(index as usize)
            .map(|m| m & !ignore == 0)
            .unwrap_or(false)
    }

    // === Filter slot bookkeeping used by dimensions ===

    /// Claim a free filter slot, returned as its single-bit mask.
    pub(crate) fn allocate_slot(&mut self) -> Result<u64> {
        if self.used_slots == u64::MAX {
            return Err(EngineError::DimensionLimit {
                max: MAX_DIMENSIONS,
            });
        }
        let bit = 1u64 << (!self.used_slots).trailing_zeros();
        self.used_slots |= bit;
        Ok(bit)
    }

    /// Free a slot, lifting whatever that slot still rejected. Records that
    /// flip are logged as a change of `owner`.
    pub(crate) fn release_slot(&mut self, bit: u64, owner: &str) {
        if self.used_slots & bit == 0 {
            return;
        }
        let mut change = FilterChange::new(owner);
        for i in 0..self.len as RecordIndex {
            if self.set_rejected(i, bit, false) {
                change.added.push(i);
            }
        }
        self.used_slots &= !bit;
        if !change.is_empty() {
            self.record_change(change);
        }
    }

    pub(crate) fn live_slots(&self) -> usize {
        self.used_slots.count_ones() as usize
    }

    /// Set or clear `bit` on record `index`, keeping the active count in step.
    /// Returns true if the bit actually changed.
    pub(crate) fn set_rejected(&mut self, index: RecordIndex, bit: u64, rejected: bool) -> bool {
        let mask = &mut self.masks[index as usize];
        let before = *mask;
        if rejected {
            *mask |= bit;
        } else {
            *mask &= !bit;
        }
        let after = *mask;

        if before == after {
            return false;
        }
        if before == 0 {
            self.active_len -= 1;
        } else if after == 0 {
            self.active_len += 1;
        }
        true
    }

    // === Changeset API ===

    pub(crate) fn record_change(&mut self, change: FilterChange) {
        self.changeset.push(change);
    }

    /// Generation of the filter state; advances on every filter update.
    pub fn generation(&self) -> u64 {
        self.changeset.generation()
    }

    pub fn changeset(&self) -> &Changeset {
        &self.changeset
    }

    /// Drain pending filter changes, oldest first.
    pub fn drain_changes(&mut self) -> Vec<FilterChange> {
        self.changeset.drain()
    }
}

pub struct RecordIterator<'a> {
    store: &'a RecordStore,
    index: usize,
}

impl<'a> Iterator for RecordIterator<'a> {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.store.len() {
            None
        } else {
            let result = self.store.record(self.index).ok();
            self.index += 1;
            result
        }
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RecordStore {{ records: {}, active: {}, columns: {:?}, dimensions: {} }}",
            self.len,
            self.active_len,
            self.schema.column_names(),
            self.live_slots()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordStore {
        RecordStore::from_json(
            r#"[
                {"a": 3, "color": "red"},
                {"a": 1, "color": "blue", "extra": true},
                {"__index": 99, "a": 2}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_store_basic() {
        let store = sample();
        assert_eq!(store.len(), 3);
        assert_eq!(store.active_len(), 3);
        assert_eq!(store.schema().column_names(), vec!["a", "color", "extra"]);
        assert!(!store.schema().contains(INDEX_FIELD));
    }

    #[test]
    fn test_missing_values_are_null() {
        let store = sample();
        assert!(store.value(0, "extra").is_null());
        assert_eq!(store.value(1, "extra").as_bool(), Some(true));
        assert!(store.value(2, "color").is_null());
        assert!(store.value(0, "nope").is_null());
        assert!(store.value(10, "a").is_null());
    }

    #[test]
    fn test_index_assigned_by_position() {
        let store = sample();
        let rec = store.record(2).unwrap();
        assert_eq!(rec.index, 2);
        assert_eq!(rec.get("a").and_then(|v| v.as_f64()), Some(2.0));
        assert_eq!(rec.to_json()[INDEX_FIELD], JsonValue::from(2));

        let indices: Vec<RecordIndex> = store.iter_records().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_record_out_of_range() {
        let store = sample();
        assert!(matches!(
            store.record(3),
            Err(EngineError::RecordOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(matches!(
            RecordStore::from_json("[1, 2]"),
            Err(EngineError::InvalidDataset(_))
        ));
        assert!(matches!(RecordStore::from_json("{"), Err(EngineError::Json(_))));
    }

    #[test]
    fn test_active_count_tracks_masks() {
        let mut store = sample();
        let a = store.allocate_slot().unwrap();
        let b = store.allocate_slot().unwrap();
        assert_ne!(a, b);

        assert!(store.set_rejected(0, a, true));
        assert!(store.set_rejected(0, b, true));
        assert_eq!(store.active_len(), 2);
        assert!(!store.is_active(0));
        assert!(!store.is_active_ignoring(0, a));
        assert!(store.is_active_ignoring(1, a));

        // Setting an already-set bit is not a change
        assert!(!store.set_rejected(0, a, true));

        store.set_rejected(0, a, false);
        assert_eq!(store.active_len(), 2);
        assert!(store.is_active_ignoring(0, b));

        let before = store.generation();
        store.release_slot(b, "b");
        assert_eq!(store.active_len(), 3);
        assert_eq!(store.generation(), before + 1);
        assert!(store.is_active(0));
        assert_eq!(store.live_slots(), 1);
    }

    #[test]
    fn test_slot_limit_and_reuse() {
        let mut store = sample();
        let slots: Vec<u64> = (0..MAX_DIMENSIONS).map(|_| store.allocate_slot().unwrap()).collect();
        assert!(matches!(
            store.allocate_slot(),
            Err(EngineError::DimensionLimit { max: MAX_DIMENSIONS })
        ));

        store.release_slot(slots[5], "five");
        assert_eq!(store.allocate_slot().unwrap(), slots[5]);
    }
}
