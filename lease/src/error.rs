use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Another unit holds the lease.
    #[error("Lease claim denied")]
    ClaimDenied,

    /// A block-until-released call was cancelled by its caller.
    #[error("Lease block cancelled")]
    BlockCancelled,

    #[error("Invalid lease duration {0:?}")]
    InvalidDuration(Duration),

    #[error("Lease for application {application:?} is not held by {holder:?}")]
    NotHeld { application: String, holder: String },

    #[error("Lease store unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// True for the two sentinels that drive state transitions rather than
    /// report a failure.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Error::ClaimDenied | Error::BlockCancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
