//! Errors of the core crate.
use thiserror::Error;

/// Errors raised by typed access to records.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The requested key does not exist in the record.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// The value under the requested key has a different type.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}
