/// cogfilter Group Implementation
///
/// A Group aggregates the records of one dimension by key and counts them.
/// Numeric columns group into histogram buckets (the left edge of the bucket a
/// value falls in), factor columns group by exact value. Records whose group
/// key is null are not counted anywhere.
///
/// Counts follow the usual crossfilter rule: a record counts when it passes
/// every filter except the one on the group's own dimension. Brushing a
/// histogram therefore never empties that histogram.
///
/// Counts are cached against the store generation and recomputed on the first
/// read after any filter change.

use crate::dimension::{Dimension, DimensionKey};
use crate::display_info::ColumnInfo;
use crate::store::{RecordIndex, RecordStore};
use log::debug;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

/// How dimension keys map to group keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Bucketing {
    /// Group by the dimension key itself
    Exact,
    /// Group numbers by the left edge of their histogram bucket
    Histogram(ColumnInfo),
}

impl Bucketing {
    /// Group key for a dimension key; null when the value has no group.
    pub fn group_key(&self, key: &DimensionKey) -> DimensionKey {
        match self {
            Bucketing::Exact => key.clone(),
            Bucketing::Histogram(info) => key
                .as_f64()
                .and_then(|v| info.bucket(v))
                .map(DimensionKey::number)
                .unwrap_or(DimensionKey::Null),
        }
    }
}

/// One bar of a group: a key and the number of records counted under it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupEntry {
    pub key: DimensionKey,
    pub count: usize,
}

/// Every entry of a group together with its tallest count, the shape bar
/// charts are drawn from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupBars {
    pub name: String,
    pub entries: Vec<GroupEntry>,
    pub max_count: usize,
}

struct CountCache {
    generation: u64,
    counts: Vec<usize>,
}

pub struct Group {
    name: String,
    store: Rc<RefCell<RecordStore>>,
    /// Filter slot of the dimension this group is built on
    own_bit: u64,
    bucketing: Bucketing,
    /// Distinct non-null group keys, ascending
    keys: Vec<DimensionKey>,
    /// slots[record] = position in `keys`, or None for a null group key
    slots: Vec<Option<u32>>,
    cache: RefCell<Option<CountCache>>,
}

impl Group {
    /// Build a group over `dimension`.
    pub fn new(dimension: &Dimension, bucketing: Bucketing) -> Self {
        let grouped: Vec<DimensionKey> = dimension
            .keys()
            .iter()
            .map(|k| bucketing.group_key(k))
            .collect();

        let mut keys: Vec<DimensionKey> = grouped.iter().filter(|k| !k.is_null()).cloned().collect();
        keys.sort();
        keys.dedup();

        let slots = grouped
            .iter()
            .map(|k| {
                if k.is_null() {
                    None
                } else {
                    keys.binary_search(k).ok().map(|pos| pos as u32)
                }
            })
            .collect();

        debug!(
            "created group '{}' with {} keys ({:?})",
            dimension.name(),
            keys.len(),
            bucketing
        );

        Group {
            name: dimension.name().to_string(),
            store: dimension.store().clone(),
            own_bit: dimension.bit(),
            bucketing,
            keys,
            slots,
            cache: RefCell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bucketing(&self) -> &Bucketing {
        &self.bucketing
    }

    /// Number of distinct non-null keys.
    pub fn size(&self) -> usize {
        self.keys.len()
    }

    /// Group key record `record` falls under, if any.
    pub fn key_of(&self, record: RecordIndex) -> Option<&DimensionKey> {
        self.slots
            .get(record as usize)
            .copied()
            .flatten()
            .map(|slot| &self.keys[slot as usize])
    }

    /// Every entry in ascending key order, including zero counts.
    pub fn all(&self) -> Vec<GroupEntry> {
        self.with_counts(|counts| {
            self.keys
                .iter()
                .zip(counts)
                .map(|(key, &count)| GroupEntry {
                    key: key.clone(),
                    count,
                })
                .collect()
        })
    }

    /// The `k` largest entries by count; equal counts in ascending key order.
    pub fn top(&self, k: usize) -> Vec<GroupEntry> {
        let mut entries = self.all();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        entries.truncate(k);
        entries
    }

    /// Count of the tallest entry, 0 for an empty group.
    pub fn max_count(&self) -> usize {
        self.with_counts(|counts| counts.iter().copied().max().unwrap_or(0))
    }

    pub fn count_of(&self, key: &DimensionKey) -> usize {
        match self.keys.binary_search(key) {
            Ok(pos) => self.with_counts(|counts| counts[pos]),
            Err(_) => 0,
        }
    }

    pub fn bars(&self) -> GroupBars {
        let entries = self.all();
        let max_count = entries.iter().map(|e| e.count).max().unwrap_or(0);
        GroupBars {
            name: self.name.clone(),
            entries,
            max_count,
        }
    }

    fn with_counts<T>(&self, f: impl FnOnce(&[usize]) -> T) -> T {
        let store = self.store.borrow();
        let generation = store.generation();

        let mut cache = self.cache.borrow_mut();
        let stale = cache.as_ref().map_or(true, |c| c.generation != generation);
        if stale {
            let mut counts = vec![0usize; self.keys.len()];
            for (record, slot) in self.slots.iter().enumerate() {
                if let Some(slot) = slot {
                    if store.is_active_ignoring(record as RecordIndex, self.own_bit) {
                        counts[*slot as usize] += 1;
                    }
                }
            }
            *cache = Some(CountCache { generation, counts });
        }

        match cache.as_ref() {
            Some(c) => f(&c.counts),
            None => f(&[]),
        }
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Group {{ name: '{}', keys: {}, bucketing: {:?} }}",
            self.name,
            self.keys.len(),
            self.bucketing
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::DimensionFilter;

    fn store(json: &str) -> Rc<RefCell<RecordStore>> {
        Rc::new(RefCell::new(RecordStore::from_json(json).unwrap()))
    }

    fn counts(group: &Group) -> Vec<(DimensionKey, usize)> {
        group.all().into_iter().map(|e| (e.key, e.count)).collect()
    }

    #[test]
    fn test_histogram_buckets() {
        let s = store(r#"[{"v": 12}, {"v": 3}, {"v": 10}, {"v": 25}, {"v": "NaN"}, {"v": null}, {"v": 31}]"#);
        let dim = Dimension::numeric("v", s.clone(), "v").unwrap();
        let info = ColumnInfo::numeric(vec![0.0, 10.0, 20.0], 10.0);
        let group = Group::new(&dim, Bucketing::Histogram(info));

        assert_eq!(group.key_of(0), Some(&DimensionKey::from(10.0)));
        // NaN, null and values past the grid fall into no bucket
        assert_eq!(group.key_of(4), None);
        assert_eq!(group.key_of(5), None);
        assert_eq!(group.key_of(6), None);

        assert_eq!(
            counts(&group),
            vec![
                (DimensionKey::from(0.0), 1),
                (DimensionKey::from(10.0), 2),
                (DimensionKey::from(20.0), 1),
            ]
        );
        assert_eq!(group.size(), 3);
        assert_eq!(group.max_count(), 2);
    }

    #[test]
    fn test_bucketing_nan_is_null() {
        let bucketing = Bucketing::Histogram(ColumnInfo::numeric(vec![0.0, 10.0, 20.0], 10.0));
        assert_eq!(bucketing.group_key(&DimensionKey::from(12.0)), DimensionKey::from(10.0));
        assert!(bucketing.group_key(&DimensionKey::number(f64::NAN)).is_null());
        assert!(bucketing.group_key(&DimensionKey::from("12")).is_null());
    }

    #[test]
    fn test_exact_groups() {
        let s = store(r#"[{"c": "red"}, {"c": "blue"}, {"c": "red"}, {"c": null}]"#);
        let dim = Dimension::categorical("c", s.clone(), "c").unwrap();
        let group = Group::new(&dim, Bucketing::Exact);

        assert_eq!(group.count_of(&DimensionKey::from("red")), 2);
        assert_eq!(group.count_of(&DimensionKey::from("blue")), 1);
        assert_eq!(group.count_of(&DimensionKey::from("green")), 0);
        assert_eq!(group.size(), 2);
    }

    #[test]
    fn test_group_ignores_own_filter() {
        let s = store(r#"[
            {"c": "red", "v": 1}, {"c": "blue", "v": 2},
            {"c": "red", "v": 3}, {"c": "blue", "v": 4}
        ]"#);
        let mut c = Dimension::categorical("c", s.clone(), "c").unwrap();
        let mut v = Dimension::numeric("v", s.clone(), "v").unwrap();
        let group = Group::new(&c, Bucketing::Exact);

        c.filter(DimensionFilter::one_of(["red"]));
        // Own filter does not cut this group's counts
        assert_eq!(group.count_of(&DimensionKey::from("blue")), 2);

        v.filter(DimensionFilter::range(3.0, 4.0));
        assert_eq!(group.count_of(&DimensionKey::from("blue")), 1);
        assert_eq!(group.count_of(&DimensionKey::from("red")), 1);

        v.filter(DimensionFilter::All);
        assert_eq!(group.count_of(&DimensionKey::from("red")), 2);
    }

    #[test]
    fn test_top_orders_by_count_then_key() {
        let s = store(r#"[{"c": "b"}, {"c": "a"}, {"c": "c"}, {"c": "c"}, {"c": "a"}]"#);
        let dim = Dimension::categorical("c", s.clone(), "c").unwrap();
        let group = Group::new(&dim, Bucketing::Exact);

        let top: Vec<(DimensionKey, usize)> = group.top(2).into_iter().map(|e| (e.key, e.count)).collect();
        assert_eq!(top, vec![(DimensionKey::from("a"), 2), (DimensionKey::from("c"), 2)]);
    }

    #[test]
    fn test_bars_keep_zero_counts() {
        let s = store(r#"[{"c": "x", "v": 1}, {"c": "y", "v": 2}]"#);
        let c = Dimension::categorical("c", s.clone(), "c").unwrap();
        let mut v = Dimension::numeric("v", s.clone(), "v").unwrap();
        let group = Group::new(&c, Bucketing::Exact);

        v.filter(DimensionFilter::range(2.0, 2.0));
        let bars = group.bars();
        assert_eq!(bars.name, "c");
        assert_eq!(bars.max_count, 1);
        assert_eq!(bars.entries[0].count, 0);
        assert_eq!(
            serde_json::to_value(&bars.entries[1]).unwrap(),
            serde_json::json!({"key": "y", "count": 1})
        );
    }
}
