/// Intent types exchanged with the UI
///
/// Intents arrive as JSON objects tagged by `type`. Only the three kinds below
/// touch the index; every other kind deserializes to `Intent::Other` and is
/// passed through.
use crate::column::ColumnValue;
use crate::dimension::{DimensionFilter, DimensionKey};
use crate::display_info::VarType;
use crate::sort::SortChange;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Intents the index reacts to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Intent {
    /// Change or clear column filters. Ignored unless `sort` is truthy.
    #[serde(rename = "SET_FILTER")]
    SetFilter {
        filter: FilterSpec,
        #[serde(default, deserialize_with = "truthy")]
        sort: bool,
    },

    /// Show or hide a column in the filter sidebar
    #[serde(rename = "SET_FILTER_VIEW")]
    SetFilterView { which: FilterViewAction, name: String },

    /// Replace the sort specification or remove one of its entries
    #[serde(rename = "SET_SORT")]
    SetSort { sort: SortChange },

    /// Any intent the index does not act on
    #[serde(other)]
    Other,
}

impl Intent {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Target of a filter intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterSpec {
    /// Clear the filter on this one column
    Clear(String),
    /// New state per column
    Columns(BTreeMap<String, FilterState>),
}

impl FilterSpec {
    pub fn column(name: impl Into<String>, state: FilterState) -> Self {
        let mut columns = BTreeMap::new();
        columns.insert(name.into(), state);
        FilterSpec::Columns(columns)
    }
}

/// Filter state of one column as the UI holds it.
///
/// A missing `value` means the column's filter is cleared. Numeric values are
/// `{from?, to?}` objects, factor values are arrays of accepted values. Only
/// `varType` classifies the column; the UI's other keys (`name`, and `type`
/// for the filter widget kind) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    #[serde(rename = "varType", default, skip_serializing_if = "Option::is_none")]
    pub var_type: Option<VarType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

impl FilterState {
    /// A cleared filter on a column of the given type.
    pub fn cleared(var_type: VarType) -> Self {
        FilterState {
            var_type: Some(var_type),
            value: None,
        }
    }

    /// Numeric range; a missing bound is unbounded on that side.
    pub fn range(from: Option<f64>, to: Option<f64>) -> Self {
        let mut value = serde_json::Map::new();
        if let Some(from) = from {
            value.insert("from".to_string(), JsonValue::from(from));
        }
        if let Some(to) = to {
            value.insert("to".to_string(), JsonValue::from(to));
        }
        FilterState {
            var_type: Some(VarType::Numeric),
            value: Some(JsonValue::Object(value)),
        }
    }

    /// Factor selection of the given values.
    pub fn select<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        FilterState {
            var_type: Some(VarType::Factor),
            value: Some(JsonValue::Array(values.into_iter().map(Into::into).collect())),
        }
    }

    pub fn is_cleared(&self) -> bool {
        matches!(self.value, None | Some(JsonValue::Null))
    }

    /// Dimension constraint this state describes for a column of `var_type`.
    ///
    /// A cleared state maps to `DimensionFilter::All`. A numeric value that is
    /// not an object, or a bound that is not a number, reads as unbounded.
    pub fn to_filter(&self, var_type: VarType) -> DimensionFilter {
        let value = match &self.value {
            Some(v) if !v.is_null() => v,
            _ => return DimensionFilter::All,
        };

        match var_type {
            VarType::Numeric => {
                let bound = |name: &str| value.get(name).and_then(JsonValue::as_f64);
                DimensionFilter::range(
                    bound("from").unwrap_or(f64::NEG_INFINITY),
                    bound("to").unwrap_or(f64::INFINITY),
                )
            }
            VarType::Factor => {
                let selected = match value {
                    JsonValue::Array(items) => items.iter().map(key_of).collect(),
                    single => std::iter::once(key_of(single)).collect(),
                };
                DimensionFilter::In(selected)
            }
            VarType::Other => DimensionFilter::All,
        }
    }
}

fn key_of(value: &JsonValue) -> DimensionKey {
    DimensionKey::categorical(&ColumnValue::from_json(value))
}

/// Sidebar toggle direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterViewAction {
    Add,
    Remove,
}

/// Reads any JSON value by truthiness: null, false, 0 and "" are false.
fn truthy<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => b,
        JsonValue::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    })
}
