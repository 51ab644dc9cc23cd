//! Schedule parse errors.

use thiserror::Error;

/// Errors raised while parsing a cron expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("expected 6 or 7 fields, got {0}")]
    FieldCount(usize),

    #[error("{field}: invalid value `{token}`")]
    Value { field: &'static str, token: String },

    #[error("{field}: value {value} out of range {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u16,
        min: u16,
        max: u16,
    },

    #[error("{field}: inverted range `{token}`")]
    InvertedRange { field: &'static str, token: String },

    #[error("{field}: step must be positive")]
    ZeroStep { field: &'static str },
}
