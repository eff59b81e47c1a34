//! Rollout engine error types.

use setgrid_core::ValidationError;
use setgrid_state::StateError;
use thiserror::Error;

/// Errors surfaced to callers of the rollout engine.
///
/// A missing setting and an offline one are both `NotFound`.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store failure: {0}")]
    Store(StateError),
}

impl From<StateError> for RolloutError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(msg) => RolloutError::NotFound(msg),
            StateError::Conflict(msg) => RolloutError::Conflict(msg),
            other => RolloutError::Store(other),
        }
    }
}

pub type RolloutResult<T> = Result<T, RolloutError>;
