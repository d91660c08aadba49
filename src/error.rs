// Error types shared by the scanner, schema binding and reconstruction engine.

use thiserror::Error;

/// Errors produced while loading a dump or reconstructing letters.
///
/// Only `MalformedRow` is recoverable: the scanner records it as a
/// diagnostic and drops the offending statement. Everything else means the
/// configured schema does not match the dump (or I/O failed) and aborts.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("malformed row at offset {offset}: {reason}")]
    MalformedRow { offset: usize, reason: &'static str },

    #[error("no binding for column `{column}` in table `{table}`")]
    UnknownColumn { table: String, column: String },

    #[error("row {row} of `{table}` has {len} fields, column `{column}` needs index {index}")]
    ShortRow {
        table: String,
        column: String,
        row: usize,
        index: usize,
        len: usize,
    },

    #[error("column `{column}` of `{table}` holds non-integer value {value:?}")]
    InvalidInteger {
        table: String,
        column: String,
        value: String,
    },

    #[error("unknown schema version `{0}` (expected `omeka` or `legacy`)")]
    UnknownSchema(String),

    #[error("dump is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = DumpError> = std::result::Result<T, E>;
