//! Error types for configuration loading and the motor wire format

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Variable present but not parsable as the expected type
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// Parsed fine but outside the range the pipeline can work with
    #[error("{key} out of range: {reason}")]
    OutOfRange { key: &'static str, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WireError {
    #[error("command line is missing '<' or '>' delimiters: {0:?}")]
    MissingDelimiters(String),

    #[error("expected 2 comma-separated fields, got {0}")]
    FieldCount(usize),

    #[error("field {field} is not a number: {value:?}")]
    NotANumber { field: &'static str, value: String },
}
