/// Dimension and Group registries
///
/// Dimensions and groups are expensive to build (a sort of the whole store),
/// so each column gets at most one of each for the lifetime of a display.
/// `ensure` creates on first use and returns the existing instance afterwards.
/// Clearing a filter only lifts the dimension's constraint; nothing is removed
/// from a registry until the whole display is replaced.

use crate::dimension::Dimension;
use crate::display_info::{ColumnInfo, VarType};
use crate::error::{EngineError, Result};
use crate::group::{Bucketing, Group};
use crate::store::RecordStore;
use log::{debug, info};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Per-column dimensions over one store.
pub struct DimensionRegistry {
    store: Rc<RefCell<RecordStore>>,
    dimensions: BTreeMap<String, Dimension>,
    var_types: BTreeMap<String, VarType>,
}

impl DimensionRegistry {
    pub fn new(store: Rc<RefCell<RecordStore>>) -> Self {
        DimensionRegistry {
            store,
            dimensions: BTreeMap::new(),
            var_types: BTreeMap::new(),
        }
    }

    pub fn store(&self) -> &Rc<RefCell<RecordStore>> {
        &self.store
    }

    /// Dimension for column `name`, created on first request.
    ///
    /// Numeric columns are keyed by the numeric reading of each value, factor
    /// columns by the raw value. A later call with a different `var_type`
    /// returns the dimension that already exists.
    pub fn ensure(&mut self, name: &str, var_type: VarType) -> Result<&Dimension> {
        if !self.dimensions.contains_key(name) {
            if !self.store.borrow().schema().contains(name) {
                return Err(EngineError::UnknownColumn(name.to_string()));
            }
            let dimension = match var_type {
                VarType::Numeric => Dimension::numeric(name, self.store.clone(), name)?,
                VarType::Factor => Dimension::categorical(name, self.store.clone(), name)?,
                VarType::Other => {
                    return Err(EngineError::InvalidDisplayInfo {
                        column: name.to_string(),
                        reason: "only numeric and factor columns can be filtered".to_string(),
                    })
                }
            };
            self.dimensions.insert(name.to_string(), dimension);
            self.var_types.insert(name.to_string(), var_type);
        }
        self.get(name)
            .ok_or_else(|| EngineError::UnknownColumn(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Dimension> {
        self.dimensions.get_mut(name)
    }

    /// Type the dimension for `name` was built with.
    pub fn var_type(&self, name: &str) -> Option<VarType> {
        self.var_types.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.dimensions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Column names with a dimension, ascending.
    pub fn names(&self) -> Vec<&str> {
        self.dimensions.keys().map(|s| s.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Dimension)> {
        self.dimensions.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Per-column groups, each over the dimension of the same column.
#[derive(Default)]
pub struct GroupRegistry {
    groups: BTreeMap<String, Group>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group for column `name`, creating its dimension too when needed.
    ///
    /// Numeric columns with a histogram grid group by bucket; numeric columns
    /// without one fall back to exact values, as do factor columns.
    pub fn ensure(&mut self, name: &str, info: &ColumnInfo, dimensions: &mut DimensionRegistry) -> Result<&Group> {
        if !self.groups.contains_key(name) {
            let dimension = dimensions.ensure(name, info.var_type)?;
            let bucketing = match info.var_type {
                VarType::Numeric if info.has_bins() => Bucketing::Histogram(info.clone()),
                VarType::Numeric => {
                    info!("numeric column '{}' has no breaks; grouping by exact value", name);
                    Bucketing::Exact
                }
                _ => Bucketing::Exact,
            };
            let group = Group::new(dimension, bucketing);
            debug!("registered group '{}'", name);
            self.groups.insert(name.to_string(), group);
        }
        self.get(name)
            .ok_or_else(|| EngineError::UnknownColumn(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.groups.keys().map(|s| s.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Group)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }
}
