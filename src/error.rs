use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by the leadership tracker.
///
/// Cloneable so the same value can be handed to every `wait()` caller and
/// attached to a [`Context`](crate::Context) as its cancellation cause.
#[derive(Error, Debug, Clone)]
pub enum TrackerError {
    #[error("Leadership tracker is shutting down")]
    ShuttingDown,

    /// Attached to stable-leadership work when the unit's role flips.
    #[error("Leadership changed")]
    LeadershipChanged,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid unit id {0:?}")]
    InvalidUnitId(String),

    #[error("Invalid tracker config: {0}")]
    InvalidConfig(String),

    /// Unexpected failure from the lease service; fatal for the tracker.
    #[error("Leadership claim failed: {0}")]
    Claimer(#[from] lease::Error),

    #[error("Tracker task failed: {0}")]
    TaskFailed(String),

    #[error("{0}")]
    Failed(Arc<anyhow::Error>),
}

impl From<anyhow::Error> for TrackerError {
    fn from(err: anyhow::Error) -> Self {
        TrackerError::Failed(Arc::new(err))
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;
