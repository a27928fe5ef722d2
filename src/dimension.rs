/// cogfilter Dimension Implementation
///
/// A Dimension projects every record of the store to a sortable key and keeps
/// the records ordered by that key. It is the unit of filtering: each dimension
/// owns one filter slot in the store and flips that slot's bit for exactly the
/// records whose state changes. Ordering-only dimensions hold no slot and never
/// filter.
///
/// Range filters are contiguous runs of the sorted order, so moving a range only
/// touches the records between the old and new bounds (O(log n + k) for k
/// changed records). Set-membership filters are not contiguous and rescan the
/// dimension (O(n)).
///
/// # Examples
///
/// ```
/// use cogfilter::{Dimension, DimensionFilter, RecordStore};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let store = Rc::new(RefCell::new(
///     RecordStore::from_json(r#"[{"a": 3}, {"a": 1}, {"a": 2}]"#).unwrap(),
/// ));
/// let mut dim = Dimension::numeric("a", store.clone(), "a").unwrap();
///
/// let change = dim.filter(DimensionFilter::range(2.0, 3.0));
/// assert_eq!(change.removed, vec![1]);
/// assert_eq!(store.borrow().active_len(), 2);
/// assert_eq!(dim.bottom(10, 0), vec![2, 0]);
/// ```

use crate::changeset::FilterChange;
use crate::column::ColumnValue;
use crate::error::Result;
use crate::sort::SortDirection;
use crate::store::{RecordIndex, RecordStore};
use log::{debug, trace};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Range;
use std::rc::Rc;

/// Derived key of a record within one dimension.
///
/// Keys are totally ordered: numbers, then text, then booleans, then null.
/// Null therefore sorts last and never falls inside a numeric range.
#[derive(Debug, Clone)]
pub enum DimensionKey {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl DimensionKey {
    /// Number key; NaN becomes null and negative zero folds into zero.
    pub fn number(v: f64) -> Self {
        if v.is_nan() {
            DimensionKey::Null
        } else if v == 0.0 {
            DimensionKey::Number(0.0)
        } else {
            DimensionKey::Number(v)
        }
    }

    /// Numeric projection: null unless the value reads as a number.
    pub fn numeric(value: &ColumnValue) -> Self {
        value.numeric().map(Self::number).unwrap_or(DimensionKey::Null)
    }

    /// Categorical projection: the raw value, with NaN read as null.
    pub fn categorical(value: &ColumnValue) -> Self {
        match value {
            ColumnValue::Number(n) => Self::number(*n),
            ColumnValue::Text(s) => DimensionKey::Text(s.clone()),
            ColumnValue::Bool(b) => DimensionKey::Bool(*b),
            ColumnValue::Null => DimensionKey::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DimensionKey::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DimensionKey::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DimensionKey::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            DimensionKey::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DimensionKey::Text(s) => JsonValue::String(s.clone()),
            DimensionKey::Bool(b) => JsonValue::Bool(*b),
            DimensionKey::Null => JsonValue::Null,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            DimensionKey::Number(_) => 0,
            DimensionKey::Text(_) => 1,
            DimensionKey::Bool(_) => 2,
            DimensionKey::Null => 3,
        }
    }
}

impl Ord for DimensionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (DimensionKey::Number(a), DimensionKey::Number(b)) => a.total_cmp(b),
            (DimensionKey::Text(a), DimensionKey::Text(b)) => a.cmp(b),
            (DimensionKey::Bool(a), DimensionKey::Bool(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialOrd for DimensionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DimensionKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DimensionKey {}

impl Serialize for DimensionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<f64> for DimensionKey {
    fn from(v: f64) -> Self {
        DimensionKey::number(v)
    }
}

impl From<&str> for DimensionKey {
    fn from(v: &str) -> Self {
        DimensionKey::Text(v.to_string())
    }
}

/// The constraint a dimension currently applies.
#[derive(Debug, Clone, PartialEq)]
pub enum DimensionFilter {
    /// No constraint; every record passes
    All,
    /// Keys between `lo` and `hi`, both inclusive
    Range { lo: DimensionKey, hi: DimensionKey },
    /// Keys that are members of the set
    In(BTreeSet<DimensionKey>),
}

impl DimensionFilter {
    pub fn range(from: f64, to: f64) -> Self {
        DimensionFilter::Range {
            lo: DimensionKey::number(from),
            hi: DimensionKey::number(to),
        }
    }

    pub fn one_of<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<DimensionKey>,
    {
        DimensionFilter::In(keys.into_iter().map(Into::into).collect())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, DimensionFilter::All)
    }
}

/// A keyed, sorted projection of the store that can filter it.
pub struct Dimension {
    name: String,
    store: Rc<RefCell<RecordStore>>,
    /// Filter slot owned by this dimension; 0 for ordering-only dimensions
    bit: u64,
    /// keys[record] = key of that record
    keys: Vec<DimensionKey>,
    /// Record indices sorted by key, ties in load order
    order: Vec<RecordIndex>,
    filter: DimensionFilter,
    /// Selected positions of `order` while the filter is contiguous
    bounds: Option<Range<usize>>,
}

impl Dimension {
    /// Create a dimension keyed by `key_fn(store, record)`.
    pub fn new<F>(name: impl Into<String>, store: Rc<RefCell<RecordStore>>, key_fn: F) -> Result<Self>
    where
        F: Fn(&RecordStore, RecordIndex) -> DimensionKey,
    {
        let keys: Vec<DimensionKey> = {
            let s = store.borrow();
            (0..s.len() as RecordIndex).map(|i| key_fn(&*s, i)).collect()
        };
        Self::from_keys(name, store, keys)
    }

    /// Create a dimension from precomputed keys, one per record in load order.
    pub fn from_keys(
        name: impl Into<String>,
        store: Rc<RefCell<RecordStore>>,
        keys: Vec<DimensionKey>,
    ) -> Result<Self> {
        let bit = store.borrow_mut().allocate_slot()?;
        Ok(Self::build(name.into(), store, keys, bit))
    }

    /// Create a dimension that only orders records. It claims no filter slot,
    /// so building one cannot fail, and filtering it changes nothing.
    pub fn ordering(name: impl Into<String>, store: Rc<RefCell<RecordStore>>, keys: Vec<DimensionKey>) -> Self {
        Self::build(name.into(), store, keys, 0)
    }

    fn build(name: String, store: Rc<RefCell<RecordStore>>, keys: Vec<DimensionKey>, bit: u64) -> Self {
        let mut order: Vec<RecordIndex> = (0..keys.len() as RecordIndex).collect();
        // Stable, so equal keys stay in load order
        order.sort_by(|&a, &b| keys[a as usize].cmp(&keys[b as usize]));

        debug!("created dimension '{}' over {} records", name, keys.len());

        let len = keys.len();
        Dimension {
            name,
            store,
            bit,
            keys,
            order,
            filter: DimensionFilter::All,
            bounds: Some(0..len),
        }
    }

    /// Dimension over the numeric reading of `column`.
    pub fn numeric(name: impl Into<String>, store: Rc<RefCell<RecordStore>>, column: &str) -> Result<Self> {
        Self::new(name, store, |s, i| DimensionKey::numeric(s.value(i as usize, column)))
    }

    /// Dimension over the raw value of `column`.
    pub fn categorical(name: impl Into<String>, store: Rc<RefCell<RecordStore>>, column: &str) -> Result<Self> {
        Self::new(name, store, |s, i| DimensionKey::categorical(s.value(i as usize, column)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn current_filter(&self) -> &DimensionFilter {
        &self.filter
    }

    pub fn has_filter(&self) -> bool {
        !self.filter.is_all()
    }

    pub fn key(&self, record: RecordIndex) -> Option<&DimensionKey> {
        self.keys.get(record as usize)
    }

    pub fn keys(&self) -> &[DimensionKey] {
        &self.keys
    }

    /// Returns true if this dimension owns a filter slot.
    pub fn can_filter(&self) -> bool {
        self.bit != 0
    }

    pub(crate) fn bit(&self) -> u64 {
        self.bit
    }

    pub(crate) fn store(&self) -> &Rc<RefCell<RecordStore>> {
        &self.store
    }

    /// Replace this dimension's constraint and return the records that flipped.
    pub fn filter(&mut self, filter: DimensionFilter) -> FilterChange {
        if !self.can_filter() {
            debug!("dimension '{}' only orders records; filter ignored", self.name);
            return FilterChange::new(self.name.as_str());
        }

        let mut change = match &filter {
            DimensionFilter::All => self.select_bounds(0..self.order.len()),
            DimensionFilter::Range { lo, hi } => {
                let bounds = self.range_bounds(lo, hi);
                self.select_bounds(bounds)
            }
            DimensionFilter::In(set) => self.select_where(|k| set.contains(k)),
        };
        change.added.sort_unstable();
        change.removed.sort_unstable();

        trace!(
            "dimension '{}' filter {:?}: +{} -{}",
            self.name,
            filter,
            change.added.len(),
            change.removed.len()
        );

        self.filter = filter;
        self.store.borrow_mut().record_change(change.clone());
        change
    }

    /// Positions of `order` whose keys lie in `[lo, hi]`; empty when lo > hi.
    fn range_bounds(&self, lo: &DimensionKey, hi: &DimensionKey) -> Range<usize> {
        let keys = &self.keys;
        let start = self.order.partition_point(|&i| keys[i as usize] < *lo);
        let end = self.order.partition_point(|&i| keys[i as usize] <= *hi);
        start..end.max(start)
    }

    /// Move the selection to a contiguous run of the sorted order.
    fn select_bounds(&mut self, new: Range<usize>) -> FilterChange {
        let mut change = FilterChange::new(self.name.as_str());
        let mut store = self.store.borrow_mut();
        let bit = self.bit;

        match self.bounds.clone() {
            Some(old) => {
                let leaving = (old.start..old.end.min(new.start)).chain(old.start.max(new.end)..old.end);
                for pos in leaving {
                    let record = self.order[pos];
                    if store.set_rejected(record, bit, true) {
                        change.removed.push(record);
                    }
                }
                let entering = (new.start..new.end.min(old.start)).chain(new.start.max(old.end)..new.end);
                for pos in entering {
                    let record = self.order[pos];
                    if store.set_rejected(record, bit, false) {
                        change.added.push(record);
                    }
                }
            }
            None => {
                for (pos, &record) in self.order.iter().enumerate() {
                    let reject = !new.contains(&pos);
                    if store.set_rejected(record, bit, reject) {
                        if reject {
                            change.removed.push(record);
                        } else {
                            change.added.push(record);
                        }
                    }
                }
            }
        }

        self.bounds = Some(new);
        change
    }

    /// Select every record whose key satisfies `pred`.
    fn select_where<P>(&mut self, pred: P) -> FilterChange
    where
        P: Fn(&DimensionKey) -> bool,
    {
        let mut change = FilterChange::new(self.name.as_str());
        let mut store = self.store.borrow_mut();
        let bit = self.bit;

        for (record, key) in self.keys.iter().enumerate() {
            let record = record as RecordIndex;
            let reject = !pred(key);
            if store.set_rejected(record, bit, reject) {
                if reject {
                    change.removed.push(record);
                } else {
                    change.added.push(record);
                }
            }
        }

        self.bounds = None;
        change
    }

    /// Every record in ascending key order, ignoring filters.
    pub fn iter_ascending(&self) -> impl Iterator<Item = RecordIndex> + '_ {
        self.order.iter().copied()
    }

    /// Every record in descending key order, ignoring filters.
    ///
    /// Equal keys keep load order and null keys still come last.
    pub fn iter_descending(&self) -> Descending<'_> {
        let nulls_start = self.order.partition_point(|&i| !self.keys[i as usize].is_null());
        Descending {
            order: &self.order,
            keys: &self.keys,
            end: nulls_start,
            run: 0..0,
            nulls: nulls_start..self.order.len(),
        }
    }

    /// Active records in the given direction, skipping `offset` and taking at
    /// most `limit`.
    pub fn active_ordered(&self, direction: SortDirection, offset: usize, limit: usize) -> Vec<RecordIndex> {
        let store = self.store.borrow();
        let active = |i: &RecordIndex| store.is_active(*i);
        match direction {
            SortDirection::Asc => self
                .iter_ascending()
                .filter(active)
                .skip(offset)
                .take(limit)
                .collect(),
            SortDirection::Desc => self
                .iter_descending()
                .filter(active)
                .skip(offset)
                .take(limit)
                .collect(),
        }
    }

    /// Lowest-keyed active records.
    pub fn bottom(&self, limit: usize, offset: usize) -> Vec<RecordIndex> {
        self.active_ordered(SortDirection::Asc, offset, limit)
    }

    /// Highest-keyed active records.
    pub fn top(&self, limit: usize, offset: usize) -> Vec<RecordIndex> {
        self.active_ordered(SortDirection::Desc, offset, limit)
    }

    /// Lift this dimension's constraint and give its filter slot back.
    pub fn dispose(mut self) {
        if self.has_filter() {
            self.filter(DimensionFilter::All);
        }
        debug!("disposed dimension '{}'", self.name);
        // Slot is released by Drop
    }
}

impl Drop for Dimension {
    fn drop(&mut self) {
        if !self.can_filter() {
            return;
        }
        if let Ok(mut store) = self.store.try_borrow_mut() {
            store.release_slot(self.bit, &self.name);
        }
    }
}

impl std::fmt::Debug for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Dimension {{ name: '{}', records: {}, filter: {:?} }}",
            self.name,
            self.keys.len(),
            self.filter
        )
    }
}

/// Descending iterator over a dimension: runs of equal keys from the highest
/// down, each run in load order, then the null run.
pub struct Descending<'a> {
    order: &'a [RecordIndex],
    keys: &'a [DimensionKey],
    /// Unvisited non-null positions are `0..end`
    end: usize,
    run: Range<usize>,
    nulls: Range<usize>,
}

impl<'a> Iterator for Descending<'a> {
    type Item = RecordIndex;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(pos) = self.run.next() {
                return Some(self.order[pos]);
            }
            if self.end == 0 {
                return self.nulls.next().map(|pos| self.order[pos]);
            }
            let keys = self.keys;
            let key = &keys[self.order[self.end - 1] as usize];
            let start = self.order[..self.end].partition_point(|&i| keys[i as usize] < *key);
            self.run = start..self.end;
            self.end = start;
        }
    }
}
