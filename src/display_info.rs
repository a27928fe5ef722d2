/// Display Info - externally supplied column metadata
///
/// Every display ships a table describing its columns: whether a column is
/// numeric or a factor, and for numeric columns the uniform histogram grid
/// (`breaks` plus bucket width `delta`) used to group values into bars.
///
/// # Examples
///
/// ```
/// use cogfilter::{DisplayInfo, VarType};
///
/// let info = DisplayInfo::from_json(r#"{
///     "cogInfo": {
///         "price": { "type": "numeric", "breaks": [0, 10, 20], "delta": 10 },
///         "color": { "type": "factor" }
///     }
/// }"#).unwrap();
///
/// assert_eq!(info.var_type("color"), Some(VarType::Factor));
/// assert_eq!(info.get("price").unwrap().bucket(12.0), Some(10.0));
/// ```

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Classification of a column for indexing purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VarType {
    /// Range-filtered, grouped into histogram buckets
    Numeric,
    /// Set-filtered, grouped by exact value
    Factor,
    /// Any other column kind (keys, links, ...); never indexed
    Other,
}

impl From<String> for VarType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "numeric" => VarType::Numeric,
            "factor" => VarType::Factor,
            _ => VarType::Other,
        }
    }
}

impl From<VarType> for String {
    fn from(t: VarType) -> Self {
        match t {
            VarType::Numeric => "numeric",
            VarType::Factor => "factor",
            VarType::Other => "other",
        }
        .to_string()
    }
}

impl VarType {
    /// Returns true for the kinds the index knows how to build dimensions for.
    pub fn is_indexable(&self) -> bool {
        matches!(self, VarType::Numeric | VarType::Factor)
    }
}

/// Metadata for a single column. Keys other than `type`, `breaks` and `delta`
/// are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    #[serde(rename = "type")]
    pub var_type: VarType,
    /// Ascending left edges of the histogram buckets
    #[serde(default)]
    pub breaks: Vec<f64>,
    /// Width of every bucket
    #[serde(default)]
    pub delta: Option<f64>,
}

impl ColumnInfo {
    pub fn factor() -> Self {
        ColumnInfo {
            var_type: VarType::Factor,
            breaks: Vec::new(),
            delta: None,
        }
    }

    pub fn numeric(breaks: Vec<f64>, delta: f64) -> Self {
        ColumnInfo {
            var_type: VarType::Numeric,
            breaks,
            delta: Some(delta),
        }
    }

    /// Numeric column with `count` buckets of width `delta` starting at `start`.
    pub fn numeric_grid(start: f64, delta: f64, count: usize) -> Self {
        let breaks = (0..count).map(|i| start + delta * i as f64).collect();
        Self::numeric(breaks, delta)
    }

    /// Returns true if this column carries a usable histogram grid.
    pub fn has_bins(&self) -> bool {
        !self.breaks.is_empty() && self.delta.is_some()
    }

    /// Left edge of the bucket containing `v`.
    ///
    /// `None` when `v` is NaN, when the column has no grid, or when `v` falls
    /// outside the grid (below the first break or past the last bucket).
    pub fn bucket(&self, v: f64) -> Option<f64> {
        let first = *self.breaks.first()?;
        let delta = self.delta?;
        let pos = ((v - first) / delta).floor();
        if !pos.is_finite() || pos < 0.0 {
            return None;
        }
        self.breaks.get(pos as usize).copied()
    }

    fn validate(&self, column: &str) -> Result<()> {
        let invalid = |reason: String| EngineError::InvalidDisplayInfo {
            column: column.to_string(),
            reason,
        };

        if let Some(delta) = self.delta {
            if !delta.is_finite() || delta <= 0.0 {
                return Err(invalid(format!("delta must be a positive number, got {}", delta)));
            }
        }
        if self.breaks.iter().any(|b| !b.is_finite()) {
            return Err(invalid("breaks must be finite".to_string()));
        }
        if self.breaks.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid("breaks must be strictly ascending".to_string()));
        }
        Ok(())
    }
}

/// Column metadata for a whole display, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    #[serde(rename = "cogInfo", alias = "columns", default)]
    columns: HashMap<String, ColumnInfo>,
}

impl DisplayInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate display info from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let info: DisplayInfo = serde_json::from_str(json)?;
        info.validate()?;
        Ok(info)
    }

    /// Builder-style insert, validating the column's grid.
    pub fn with_column(mut self, name: impl Into<String>, info: ColumnInfo) -> Result<Self> {
        let name = name.into();
        info.validate(&name)?;
        self.columns.insert(name, info);
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, info) in &self.columns {
            info.validate(name)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.get(name)
    }

    pub fn var_type(&self, name: &str) -> Option<VarType> {
        self.columns.get(name).map(|c| c.var_type)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
