//! Validation errors shared by the request and rule validators.

use thiserror::Error;

/// Input rejected before it reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid rule kind: {0}")]
    RuleKind(String),

    #[error("invalid percent rule value: {0}")]
    RuleValue(i64),

    #[error("invalid {field}: {value}")]
    Invalid { field: &'static str, value: String },

    #[error("too many {field}: {count} (max {max})")]
    TooMany {
        field: &'static str,
        count: usize,
        max: usize,
    },

    #[error("{field} too long: {len}")]
    TooLong { field: &'static str, len: usize },

    #[error("desc or channels or clients or values required")]
    EmptyUpdate,
}
