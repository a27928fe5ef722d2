/// Error types for the cogfilter index engine.
///
/// Most intent-level problems (unknown columns, malformed ranges, removing a
/// sort entry that does not exist) are handled as policy and never surface
/// here. These variants cover loading data and misuse of the lower-level API.

use thiserror::Error;

/// Errors produced while loading a display or operating the index directly.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("invalid display info for column '{column}': {reason}")]
    InvalidDisplayInfo { column: String, reason: String },

    #[error("column '{0}' not found")]
    UnknownColumn(String),

    #[error("record {index} out of range [0, {len})")]
    RecordOutOfRange { index: usize, len: usize },

    #[error("cannot track more than {max} dimensions at once")]
    DimensionLimit { max: usize },
}

/// Convenient alias for results returned by the engine.
pub type Result<T> = std::result::Result<T, EngineError>;
