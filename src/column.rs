/// cogfilter Column Implementation
///
/// A Column is the loaded values of one named field across every record,
/// stored in load order so that record `i` of the store is position `i` of
/// every column. Columns are immutable once the store is built.

use serde_json::Value as JsonValue;
use std::fmt::{self, Debug};

/// A single field value of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ColumnValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ColumnValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric reading of the value: numbers and numeric text yield a number,
    /// NaN and everything else yields `None`.
    pub fn numeric(&self) -> Option<f64> {
        let n = match self {
            ColumnValue::Number(v) => *v,
            ColumnValue::Text(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        if n.is_nan() {
            None
        } else {
            Some(n)
        }
    }

    /// Convert a JSON value as found in a dataset or an intent.
    ///
    /// Nested arrays and objects are not field values; they load as `Null`.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Number(n) => n.as_f64().map(ColumnValue::Number).unwrap_or(ColumnValue::Null),
            JsonValue::String(s) => ColumnValue::Text(s.clone()),
            JsonValue::Bool(b) => ColumnValue::Bool(*b),
            JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => ColumnValue::Null,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            ColumnValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            ColumnValue::Text(s) => JsonValue::String(s.clone()),
            ColumnValue::Bool(b) => JsonValue::Bool(*b),
            ColumnValue::Null => JsonValue::Null,
        }
    }
}

impl From<f64> for ColumnValue {
    fn from(v: f64) -> Self {
        ColumnValue::Number(v)
    }
}

impl From<&str> for ColumnValue {
    fn from(v: &str) -> Self {
        ColumnValue::Text(v.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(v: String) -> Self {
        ColumnValue::Text(v)
    }
}

impl From<bool> for ColumnValue {
    fn from(v: bool) -> Self {
        ColumnValue::Bool(v)
    }
}

/// The values of one field, indexed by record position.
pub struct Column {
    name: String,
    values: Vec<ColumnValue>,
}

impl Column {
    pub fn new(name: String) -> Self {
        Column {
            name,
            values: Vec::new(),
        }
    }

    pub fn with_capacity(name: String, capacity: usize) -> Self {
        Column {
            name,
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ColumnValue> {
        self.values.get(index)
    }

    pub(crate) fn push(&mut self, value: ColumnValue) {
        self.values.push(value);
    }

    /// Pad with nulls up to `len` values; used when a column first appears
    /// part-way through a dataset.
    pub(crate) fn pad_to(&mut self, len: usize) {
        if self.values.len() < len {
            self.values.resize(len, ColumnValue::Null);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnValue> {
        self.values.iter()
    }
}

impl Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Column {{ name: '{}', len: {} }}", self.name, self.len())
    }
}
