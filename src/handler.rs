/// Intent Handler - keeps the index consistent with UI intents
///
/// The handler owns every piece of mutable index state for one display: the
/// record store, the per-column dimension and group registries, and the sort
/// synthesizer. Intents are applied synchronously, in arrival order, and handed
/// back unchanged so the caller can forward them to whatever else listens.
///
/// Policy cases never fail an intent. Unknown columns, columns without a
/// numeric/factor classification and out-of-range sort removals are logged and
/// skipped. The only error that can surface is running out of filter slots,
/// and only column filters use them; sorting always succeeds.
///
/// # Examples
///
/// ```
/// use cogfilter::{DisplayInfo, IntentHandler, RecordStore};
///
/// let store = RecordStore::from_json(r#"[
///     {"price": 12, "color": "red"},
///     {"price": 3, "color": "blue"},
///     {"price": 7, "color": "red"}
/// ]"#).unwrap();
/// let info = DisplayInfo::from_json(r#"{"cogInfo": {
///     "price": {"type": "numeric", "breaks": [0, 5, 10], "delta": 5},
///     "color": {"type": "factor"}
/// }}"#).unwrap();
///
/// let mut handler = IntentHandler::new(store, info);
/// handler.handle_json(r#"{"type": "SET_FILTER", "sort": true,
///     "filter": {"price": {"varType": "numeric", "value": {"from": 5}}}}"#).unwrap();
/// handler.handle_json(r#"{"type": "SET_SORT", "sort": [{"name": "price", "dir": "desc"}]}"#).unwrap();
///
/// assert_eq!(handler.active_len(), 2);
/// assert_eq!(handler.ordered_indices(0, 10), vec![0, 2]);
/// ```

use crate::changeset::FilterChange;
use crate::dimension::DimensionFilter;
use crate::display_info::{ColumnInfo, DisplayInfo, VarType};
use crate::error::{EngineError, Result};
use crate::group::{GroupBars, GroupEntry};
use crate::intent::{FilterSpec, FilterState, FilterViewAction, Intent};
use crate::registry::{DimensionRegistry, GroupRegistry};
use crate::sort::{SortSpec, SortSynthesizer};
use crate::store::{Record, RecordIndex, RecordStore};
use log::{debug, warn};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub struct IntentHandler {
    store: Rc<RefCell<RecordStore>>,
    info: DisplayInfo,
    dimensions: DimensionRegistry,
    groups: GroupRegistry,
    sort: SortSynthesizer,
    /// Last applied filter state per column; cleared columns are absent
    filters: BTreeMap<String, FilterState>,
    /// Columns shown in the filter sidebar, in the order they were added
    filter_view: Vec<String>,
}

impl IntentHandler {
    pub fn new(store: RecordStore, info: DisplayInfo) -> Self {
        let store = Rc::new(RefCell::new(store));
        IntentHandler {
            dimensions: DimensionRegistry::new(store.clone()),
            store,
            info,
            groups: GroupRegistry::new(),
            sort: SortSynthesizer::new(),
            filters: BTreeMap::new(),
            filter_view: Vec::new(),
        }
    }

    /// Switch to another display: new records, new column metadata, and no
    /// filters, filter view or sort carried over.
    pub fn load_display(&mut self, store: RecordStore, info: DisplayInfo) {
        self.sort.reset();
        *self = IntentHandler::new(store, info);
        debug!("loaded display with {} records", self.total_len());
    }

    /// Apply one intent and hand it back.
    pub fn handle(&mut self, intent: Intent) -> Result<Intent> {
        match &intent {
            Intent::SetFilter { filter, sort } => {
                if *sort {
                    self.set_filter(filter)?;
                } else {
                    debug!("SET_FILTER without sort flag left to the UI");
                }
            }
            Intent::SetFilterView { which, name } => self.set_filter_view(*which, name)?,
            Intent::SetSort { sort } => self.sort.apply(&self.store, sort.clone()),
            Intent::Other => {}
        }
        Ok(intent)
    }

    /// Parse an intent from JSON and apply it.
    pub fn handle_json(&mut self, json: &str) -> Result<Intent> {
        let intent = Intent::from_json(json)?;
        self.handle(intent)
    }

    fn set_filter(&mut self, spec: &FilterSpec) -> Result<()> {
        match spec {
            FilterSpec::Clear(name) => {
                self.filters.remove(name);
                match self.dimensions.get_mut(name) {
                    Some(dimension) => {
                        dimension.filter(DimensionFilter::All);
                    }
                    None => debug!("no filter on '{}' to clear", name),
                }
            }
            FilterSpec::Columns(columns) => {
                for (name, state) in columns {
                    self.set_column_filter(name, state)?;
                }
            }
        }
        Ok(())
    }

    fn set_column_filter(&mut self, name: &str, state: &FilterState) -> Result<()> {
        let var_type = match self.resolve_var_type(name, state.var_type) {
            Some(t) => t,
            None => {
                warn!("filter on '{}' ignored: column is neither numeric nor factor", name);
                return Ok(());
            }
        };
        if !self.ensure_indexed(name, var_type)? {
            return Ok(());
        }

        // Keys were built for the dimension's own type
        let var_type = self.dimensions.var_type(name).unwrap_or(var_type);
        let filter = state.to_filter(var_type);
        if let Some(dimension) = self.dimensions.get_mut(name) {
            dimension.filter(filter);
        }

        if state.is_cleared() {
            self.filters.remove(name);
        } else {
            self.filters.insert(name.to_string(), state.clone());
        }
        Ok(())
    }

    fn set_filter_view(&mut self, which: FilterViewAction, name: &str) -> Result<()> {
        match which {
            FilterViewAction::Add => {
                let var_type = match self.resolve_var_type(name, None) {
                    Some(t) => t,
                    None => {
                        warn!("filter view for '{}' ignored: no numeric or factor display info", name);
                        return Ok(());
                    }
                };
                if self.ensure_indexed(name, var_type)? && !self.filter_view.iter().any(|n| n == name) {
                    self.filter_view.push(name.to_string());
                }
            }
            FilterViewAction::Remove => {
                // Dimension and group stay; the column may come back
                self.filter_view.retain(|n| n != name);
            }
        }
        Ok(())
    }

    /// Type from the intent when it is usable, otherwise from display info.
    fn resolve_var_type(&self, name: &str, requested: Option<VarType>) -> Option<VarType> {
        requested
            .filter(VarType::is_indexable)
            .or_else(|| self.info.var_type(name))
            .filter(VarType::is_indexable)
    }

    /// Make sure `name` has a dimension and a group. Returns false, after
    /// logging, when the column does not exist.
    fn ensure_indexed(&mut self, name: &str, var_type: VarType) -> Result<bool> {
        if !self.store.borrow().schema().contains(name) {
            warn!("column '{}' does not exist in this display", name);
            return Ok(false);
        }

        let info = match self.info.get(name) {
            Some(info) => ColumnInfo {
                var_type,
                ..info.clone()
            },
            None => ColumnInfo {
                var_type,
                breaks: Vec::new(),
                delta: None,
            },
        };

        match self.groups.ensure(name, &info, &mut self.dimensions) {
            Ok(_) => Ok(true),
            Err(EngineError::UnknownColumn(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // === Queries ===

    pub fn store(&self) -> &Rc<RefCell<RecordStore>> {
        &self.store
    }

    pub fn display_info(&self) -> &DisplayInfo {
        &self.info
    }

    pub fn dimensions(&self) -> &DimensionRegistry {
        &self.dimensions
    }

    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    /// Number of records passing every filter.
    pub fn active_len(&self) -> usize {
        self.store.borrow().active_len()
    }

    pub fn total_len(&self) -> usize {
        self.store.borrow().len()
    }

    /// Pages needed to show the active records `per_page` at a time.
    pub fn total_pages(&self, per_page: usize) -> usize {
        if per_page == 0 {
            return 0;
        }
        self.active_len().div_ceil(per_page)
    }

    /// Active records in display order, skipping `offset` and taking at most
    /// `limit`.
    pub fn ordered_indices(&self, offset: usize, limit: usize) -> Vec<RecordIndex> {
        self.sort.ordered(&self.store, offset, limit)
    }

    /// Records on 1-based page `page_num`. Page 0 reads as page 1.
    pub fn page(&self, page_num: usize, per_page: usize) -> Result<Vec<Record>> {
        let offset = page_num.saturating_sub(1).saturating_mul(per_page);
        let indices = self.ordered_indices(offset, per_page);
        let store = self.store.borrow();
        indices.into_iter().map(|i| store.record(i as usize)).collect()
    }

    pub fn group_entries(&self, name: &str) -> Option<Vec<GroupEntry>> {
        self.groups.get(name).map(|g| g.all())
    }

    pub fn group_top(&self, name: &str, k: usize) -> Option<Vec<GroupEntry>> {
        self.groups.get(name).map(|g| g.top(k))
    }

    pub fn group_bars(&self, name: &str) -> Option<GroupBars> {
        self.groups.get(name).map(|g| g.bars())
    }

    /// Bars for every column with a group, by column name.
    pub fn all_group_bars(&self) -> Vec<GroupBars> {
        self.groups.iter().map(|(_, g)| g.bars()).collect()
    }

    pub fn filter_state(&self, name: &str) -> Option<&FilterState> {
        self.filters.get(name)
    }

    pub fn filters(&self) -> &BTreeMap<String, FilterState> {
        &self.filters
    }

    pub fn filter_view(&self) -> &[String] {
        &self.filter_view
    }

    pub fn sort_spec(&self) -> &SortSpec {
        self.sort.spec()
    }

    pub fn sort(&self) -> &SortSynthesizer {
        &self.sort
    }

    /// Record-level changes since the last drain, oldest first.
    pub fn drain_changes(&self) -> Vec<FilterChange> {
        self.store.borrow_mut().drain_changes()
    }
}

impl std::fmt::Debug for IntentHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "IntentHandler {{ records: {}, active: {}, dimensions: {:?}, sort: {:?} }}",
            self.total_len(),
            self.active_len(),
            self.dimensions.names(),
            self.sort
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::DimensionKey;
    use crate::sort::{SortEntry, SortPath};

    fn handler() -> IntentHandler {
        let store = RecordStore::from_json(
            r#"[
                {"price": 12, "color": "red", "id": "a"},
                {"price": 3, "color": "blue", "id": "b"},
                {"price": 7, "color": "green", "id": "c"},
                {"price": 25, "color": "red", "id": "d"},
                {"price": null, "color": "blue", "id": "e"}
            ]"#,
        )
        .unwrap();
        let info = DisplayInfo::from_json(
            r#"{"cogInfo": {
                "price": {"type": "numeric", "breaks": [0, 10, 20], "delta": 10},
                "color": {"type": "factor"},
                "id": {"type": "key"}
            }}"#,
        )
        .unwrap();
        IntentHandler::new(store, info)
    }

    fn filter(handler: &mut IntentHandler, json: &str) {
        let intent = format!(r#"{{"type": "SET_FILTER", "sort": true, "filter": {}}}"#, json);
        handler.handle_json(&intent).unwrap();
    }

    fn active(handler: &IntentHandler) -> Vec<RecordIndex> {
        handler.ordered_indices(0, usize::MAX)
    }

    #[test]
    fn test_numeric_filter() {
        let mut h = handler();
        filter(&mut h, r#"{"price": {"varType": "numeric", "value": {"from": 5, "to": 20}}}"#);

        assert_eq!(active(&h), vec![0, 2]);
        assert!(h.filter_state("price").is_some());
        assert!(h.groups().contains("price"));
    }

    #[test]
    fn test_open_ended_range() {
        let mut h = handler();
        filter(&mut h, r#"{"price": {"varType": "numeric", "value": {"from": 10}}}"#);
        // Null never falls inside a range
        assert_eq!(active(&h), vec![0, 3]);

        filter(&mut h, r#"{"price": {"varType": "numeric", "value": {"to": 7}}}"#);
        assert_eq!(active(&h), vec![1, 2]);
    }

    #[test]
    fn test_inverted_range_selects_nothing() {
        let mut h = handler();
        filter(&mut h, r#"{"price": {"varType": "numeric", "value": {"from": 20, "to": 5}}}"#);
        assert_eq!(h.active_len(), 0);
    }

    #[test]
    fn test_factor_filter() {
        let mut h = handler();
        filter(&mut h, r#"{"color": {"varType": "factor", "value": ["red", "blue"]}}"#);
        assert_eq!(active(&h), vec![0, 1, 3, 4]);
    }

    #[test]
    fn test_filter_state_with_widget_keys() {
        let mut h = handler();
        filter(
            &mut h,
            r#"{"color": {"name": "color", "type": "select", "varType": "factor", "value": ["red"]}}"#,
        );
        assert_eq!(active(&h), vec![0, 3]);
        assert_eq!(
            h.filter_state("color").and_then(|s| s.var_type),
            Some(VarType::Factor)
        );
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let mut h = handler();
        filter(&mut h, r#"{"color": {"varType": "factor", "value": ["red", "blue"]}}"#);
        filter(&mut h, r#"{"price": {"varType": "numeric", "value": {"from": 10}}}"#);
        assert_eq!(active(&h), vec![0, 3]);

        filter(&mut h, r#"{"color": {"varType": "factor", "value": ["blue"]}}"#);
        assert_eq!(h.active_len(), 0);
    }

    #[test]
    fn test_clearing_restores() {
        let mut h = handler();
        filter(&mut h, r#"{"color": {"varType": "factor", "value": ["red"]}}"#);
        filter(&mut h, r#"{"price": {"varType": "numeric", "value": {"to": 20}}}"#);
        assert_eq!(active(&h), vec![0]);

        // Bare column name clears just that column
        filter(&mut h, r#""price""#);
        assert_eq!(active(&h), vec![0, 3]);
        assert!(h.filter_state("price").is_none());
        assert!(h.dimensions().contains("price"));

        // Missing value clears too
        filter(&mut h, r#"{"color": {"varType": "factor"}}"#);
        assert_eq!(h.active_len(), 5);
        assert!(h.filters().is_empty());
    }

    #[test]
    fn test_same_intent_twice_is_idempotent() {
        let mut h = handler();
        let json = r#"{"price": {"varType": "numeric", "value": {"from": 5, "to": 20}}}"#;
        filter(&mut h, json);
        let first = active(&h);
        filter(&mut h, json);
        assert_eq!(active(&h), first);
    }

    #[test]
    fn test_filter_without_sort_flag_is_ignored() {
        let mut h = handler();
        h.handle_json(
            r#"{"type": "SET_FILTER", "filter": {"color": {"varType": "factor", "value": ["red"]}}}"#,
        )
        .unwrap();
        assert_eq!(h.active_len(), 5);
        assert!(h.dimensions().is_empty());
    }

    #[test]
    fn test_var_type_falls_back_to_display_info() {
        let mut h = handler();
        filter(&mut h, r#"{"color": {"value": ["green"]}}"#);
        assert_eq!(active(&h), vec![2]);
    }

    #[test]
    fn test_unknown_columns_are_no_ops() {
        let mut h = handler();
        filter(&mut h, r#""weight""#);
        filter(&mut h, r#"{"weight": {"varType": "numeric", "value": {"from": 1}}}"#);
        filter(&mut h, r#"{"id": {"value": ["a"]}}"#);

        assert_eq!(h.active_len(), 5);
        assert!(h.dimensions().is_empty());
        assert!(h.groups().is_empty());
    }

    #[test]
    fn test_filter_view_builds_index_without_filtering() {
        let mut h = handler();
        h.handle_json(r#"{"type": "SET_FILTER_VIEW", "which": "add", "name": "price"}"#)
            .unwrap();

        assert_eq!(h.active_len(), 5);
        assert_eq!(h.filter_view(), ["price".to_string()]);
        let bars = h.group_bars("price").unwrap();
        assert_eq!(bars.entries.len(), 3);
        assert_eq!(bars.max_count, 2);

        h.handle_json(r#"{"type": "SET_FILTER_VIEW", "which": "remove", "name": "price"}"#)
            .unwrap();
        assert!(h.filter_view().is_empty());
        assert!(h.groups().contains("price"));
        assert!(h.dimensions().contains("price"));
    }

    #[test]
    fn test_group_counts_follow_other_filters() {
        let mut h = handler();
        filter(&mut h, r#"{"price": {"varType": "numeric", "value": {"from": 10}}}"#);
        filter(&mut h, r#"{"color": {"varType": "factor", "value": ["red"]}}"#);

        // color bars ignore the color filter but respect the price filter
        let red = DimensionKey::from("red");
        let blue = DimensionKey::from("blue");
        let colors = h.group_entries("color").unwrap();
        assert_eq!(colors.iter().find(|e| e.key == red).map(|e| e.count), Some(2));
        assert_eq!(colors.iter().find(|e| e.key == blue).map(|e| e.count), Some(0));

        let top = h.group_top("price", 1).unwrap();
        assert_eq!(top[0].key, DimensionKey::from(10.0));
    }

    #[test]
    fn test_sort_intents() {
        let mut h = handler();
        h.handle_json(
            r#"{"type": "SET_SORT", "sort": [{"name": "color", "dir": "asc"}, {"name": "price", "dir": "desc"}]}"#,
        )
        .unwrap();
        assert_eq!(h.sort().path(), SortPath::Composite);
        // blue(3, null), green, red(25, 12)
        assert_eq!(active(&h), vec![1, 4, 2, 3, 0]);

        h.handle_json(r#"{"type": "SET_SORT", "sort": 1}"#).unwrap();
        assert_eq!(h.sort_spec().entries(), [SortEntry::asc("color")]);
        assert_eq!(h.sort().path(), SortPath::SingleKey);
        assert_eq!(active(&h), vec![1, 4, 2, 0, 3]);

        // Position 0 is a real position
        h.handle_json(r#"{"type": "SET_SORT", "sort": 0}"#).unwrap();
        assert!(h.sort_spec().is_empty());
        assert_eq!(active(&h), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_pagination() {
        let mut h = handler();
        h.handle_json(r#"{"type": "SET_SORT", "sort": [{"name": "price", "dir": "asc"}]}"#)
            .unwrap();

        assert_eq!(h.total_pages(2), 3);
        assert_eq!(h.total_pages(0), 0);

        let ids = |page: Vec<Record>| -> Vec<String> {
            page.iter()
                .filter_map(|r| r.get("id").and_then(|v| v.as_str()).map(String::from))
                .collect()
        };
        assert_eq!(ids(h.page(1, 2).unwrap()), vec!["b", "c"]);
        assert_eq!(ids(h.page(3, 2).unwrap()), vec!["e"]);
        assert!(h.page(4, 2).unwrap().is_empty());

        filter(&mut h, r#"{"price": {"varType": "numeric", "value": {"from": 5}}}"#);
        assert_eq!(h.total_pages(2), 2);
        assert_eq!(ids(h.page(1, 2).unwrap()), vec!["c", "a"]);
    }

    #[test]
    fn test_other_intents_pass_through() {
        let mut h = handler();
        let intent = h.handle_json(r#"{"type": "SET_LAYOUT", "layout": {"ncol": 3}}"#).unwrap();
        assert_eq!(intent, Intent::Other);
        assert_eq!(h.active_len(), 5);
    }

    #[test]
    fn test_load_display_resets_state() {
        let mut h = handler();
        filter(&mut h, r#"{"color": {"varType": "factor", "value": ["red"]}}"#);
        h.handle_json(r#"{"type": "SET_SORT", "sort": [{"name": "price", "dir": "asc"}]}"#)
            .unwrap();

        let store = RecordStore::from_json(r#"[{"x": 1}, {"x": 2}]"#).unwrap();
        h.load_display(store, DisplayInfo::new());

        assert_eq!(h.total_len(), 2);
        assert_eq!(h.active_len(), 2);
        assert!(h.dimensions().is_empty());
        assert!(h.sort_spec().is_empty());
        assert!(h.filters().is_empty());
    }

    #[test]
    fn test_drain_changes() {
        let mut h = handler();
        filter(&mut h, r#"{"color": {"varType": "factor", "value": ["green"]}}"#);
        let changes = h.drain_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].removed, vec![0, 1, 3, 4]);
        assert!(h.drain_changes().is_empty());
    }
}
