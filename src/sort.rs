/// Sort Synthesizer - multi-key ordering on top of single-key dimensions
///
/// The engine only orders records by one key per dimension, so every sort
/// specification is turned into exactly one synthetic `__sort` dimension:
///
/// - empty specification: keyed by `__index` (load order)
/// - one entry: keyed by the raw column value, direction applied on read
/// - several entries: every record is ranked once with a stable composite
///   comparator and the dimension is keyed by that rank
///
/// The sort dimension only orders records: it holds no filter slot, so a sort
/// change never competes with column filters for the 64 slots. Each change
/// builds a fresh dimension and disposes the previous one, so at most one sort
/// dimension exists at any time.
///
/// # Examples
///
/// ```
/// use cogfilter::{RecordStore, SortChange, SortSpec, SortSynthesizer};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let store = Rc::new(RefCell::new(
///     RecordStore::from_json(r#"[{"a": 1, "b": 2}, {"a": 1, "b": 1}, {"a": 0, "b": 5}]"#).unwrap(),
/// ));
/// let mut sort = SortSynthesizer::new();
/// sort.apply(&store, SortChange::Replace(SortSpec::from_terms(["a", "!b"])));
///
/// assert_eq!(sort.ordered(&store, 0, 10), vec![2, 0, 1]);
/// ```

use crate::dimension::{Dimension, DimensionKey};
use crate::store::{RecordIndex, RecordStore};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// Name of the synthetic dimension that carries the current order.
pub const SORT_DIMENSION: &str = "__sort";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Only `asc`/`ascending` sort ascending; any other direction is descending.
impl From<String> for SortDirection {
    fn from(s: String) -> Self {
        match s.as_str() {
            "asc" | "ascending" => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }
}

impl From<SortDirection> for String {
    fn from(dir: SortDirection) -> Self {
        match dir {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
        .to_string()
    }
}

impl SortDirection {
    /// Orient an ascending comparison.
    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// One key of a sort specification. An entry without `dir` sorts descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    pub name: String,
    #[serde(default = "unspecified_direction")]
    pub dir: SortDirection,
}

fn unspecified_direction() -> SortDirection {
    SortDirection::Desc
}

impl SortEntry {
    pub fn asc(name: impl Into<String>) -> Self {
        SortEntry {
            name: name.into(),
            dir: SortDirection::Asc,
        }
    }

    pub fn desc(name: impl Into<String>) -> Self {
        SortEntry {
            name: name.into(),
            dir: SortDirection::Desc,
        }
    }

    /// Parse the compact term form: `name` sorts ascending, `!name` descending.
    pub fn from_term(term: &str) -> Self {
        match term.strip_prefix('!') {
            Some(name) => Self::desc(name),
            None => Self::asc(term),
        }
    }
}

impl fmt::Display for SortEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dir {
            SortDirection::Asc => write!(f, "{}", self.name),
            SortDirection::Desc => write!(f, "!{}", self.name),
        }
    }
}

/// Ordered sort keys, primary key first. Empty means load order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortSpec(Vec<SortEntry>);

impl SortSpec {
    pub fn new(entries: Vec<SortEntry>) -> Self {
        SortSpec(entries)
    }

    pub fn from_terms<'a, I>(terms: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        SortSpec(terms.into_iter().map(SortEntry::from_term).collect())
    }

    pub fn entries(&self) -> &[SortEntry] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &SortEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Remove the entry at `position`. Returns false if there is none.
    pub fn remove(&mut self, position: usize) -> bool {
        if position < self.0.len() {
            self.0.remove(position);
            true
        } else {
            false
        }
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "[{}]", terms.join(", "))
    }
}

/// A requested change to the current sort. On the wire this is either a
/// specification array or the integer position to remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortChange {
    /// Sort by these keys from now on
    Replace(SortSpec),
    /// Drop the key at this position of the current specification
    Remove(usize),
}

/// How the current sort dimension is keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortPath {
    /// Keyed by `__index`
    LoadOrder,
    /// Keyed by one column's raw value
    SingleKey,
    /// Keyed by a materialized composite rank
    Composite,
}

/// Compare two keys for one sort entry. Null sorts last in both directions.
pub fn compare_keys(a: &DimensionKey, b: &DimensionKey, dir: SortDirection) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => dir.apply(a.cmp(b)),
    }
}

/// Owns the synthetic sort dimension and the specification it was built from.
pub struct SortSynthesizer {
    dimension: Option<Dimension>,
    spec: SortSpec,
    path: SortPath,
}

impl Default for SortSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SortSynthesizer {
    pub fn new() -> Self {
        SortSynthesizer {
            dimension: None,
            spec: SortSpec::default(),
            path: SortPath::LoadOrder,
        }
    }

    pub fn spec(&self) -> &SortSpec {
        &self.spec
    }

    pub fn path(&self) -> SortPath {
        self.path
    }

    pub fn dimension(&self) -> Option<&Dimension> {
        self.dimension.as_ref()
    }

    /// Direction the sort dimension is read in. Only a single descending key
    /// reads backwards; ranks and `__index` always read forwards.
    pub fn direction(&self) -> SortDirection {
        match (self.path, self.spec.entries().first()) {
            (SortPath::SingleKey, Some(entry)) => entry.dir,
            _ => SortDirection::Asc,
        }
    }

    /// Apply a sort change and rebuild the sort dimension.
    pub fn apply(&mut self, store: &Rc<RefCell<RecordStore>>, change: SortChange) {
        match change {
            SortChange::Replace(spec) => self.spec = spec,
            SortChange::Remove(position) => {
                if !self.spec.remove(position) {
                    warn!(
                        "sort removal at position {} ignored; current sort is {}",
                        position, self.spec
                    );
                }
            }
        }
        self.rebuild(store);
    }

    /// Build a sort dimension for the current spec and replace the old one.
    pub fn rebuild(&mut self, store: &Rc<RefCell<RecordStore>>) {
        {
            let s = store.borrow();
            for entry in self.spec.iter() {
                if !s.schema().contains(&entry.name) {
                    warn!("sort key '{}' is not a column; its values read as null", entry.name);
                }
            }
        }

        let (keys, path) = match self.spec.entries() {
            [] => (Self::load_order(store), SortPath::LoadOrder),
            [entry] => (Self::column_keys(store, &entry.name), SortPath::SingleKey),
            entries => (Self::composite(store, entries), SortPath::Composite),
        };
        let dimension = Dimension::ordering(SORT_DIMENSION, store.clone(), keys);

        self.reset();
        debug!("built sort dimension for {} ({:?})", self.spec, path);
        self.dimension = Some(dimension);
        self.path = path;
    }

    /// Dispose the sort dimension, if any. The specification is kept.
    pub fn reset(&mut self) {
        if let Some(dimension) = self.dimension.take() {
            dimension.dispose();
        }
        self.path = SortPath::LoadOrder;
    }

    /// Active records in sort order, skipping `offset` and taking at most `limit`.
    ///
    /// Without a sort dimension the active records come back in load order.
    pub fn ordered(&self, store: &Rc<RefCell<RecordStore>>, offset: usize, limit: usize) -> Vec<RecordIndex> {
        match &self.dimension {
            Some(dimension) => dimension.active_ordered(self.direction(), offset, limit),
            None => {
                let s = store.borrow();
                (0..s.len() as RecordIndex)
                    .filter(|&i| s.is_active(i))
                    .skip(offset)
                    .take(limit)
                    .collect()
            }
        }
    }

    /// `__index` keys, which are the load positions.
    fn load_order(store: &Rc<RefCell<RecordStore>>) -> Vec<DimensionKey> {
        let len = store.borrow().len();
        (0..len).map(|i| DimensionKey::number(i as f64)).collect()
    }

    /// Raw value of `column` for every record.
    fn column_keys(store: &Rc<RefCell<RecordStore>>, column: &str) -> Vec<DimensionKey> {
        let s = store.borrow();
        (0..s.len())
            .map(|i| DimensionKey::categorical(s.value(i, column)))
            .collect()
    }

    /// Rank every record with the composite comparator. All records are
    /// ranked, not just the active ones, so a later filter change can never
    /// surface an unranked record.
    fn composite(store: &Rc<RefCell<RecordStore>>, entries: &[SortEntry]) -> Vec<DimensionKey> {
        let columns: Vec<Vec<DimensionKey>> = entries
            .iter()
            .map(|entry| Self::column_keys(store, &entry.name))
            .collect();
        let len = store.borrow().len();

        let mut order: Vec<RecordIndex> = (0..len as RecordIndex).collect();
        // Stable: records equal on every key keep load order
        order.sort_by(|&a, &b| {
            for (keys, entry) in columns.iter().zip(entries) {
                let cmp = compare_keys(&keys[a as usize], &keys[b as usize], entry.dir);
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            Ordering::Equal
        });

        let mut rank = vec![DimensionKey::Null; len];
        for (position, &record) in order.iter().enumerate() {
            rank[record as usize] = DimensionKey::number(position as f64);
        }
        rank
    }
}

impl fmt::Debug for SortSynthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SortSynthesizer {{ spec: {}, path: {:?} }}", self.spec, self.path)
    }
}
