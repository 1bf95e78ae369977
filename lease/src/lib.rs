#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Lease collaborators for the unit leadership tracker.
//!
//! The tracker never stores leases itself. It talks to a [`Claimer`], which
//! grants time-bounded leadership leases per application and can block until
//! a lease is released. [`LeaseManager`] is a single-process implementation
//! of that contract.

pub mod claimer;
pub mod error;
pub mod lease;
pub mod time;

pub mod test_utils;

pub use claimer::Claimer;
pub use error::{Error, Result};
pub use lease::{Lease, LeaseManager};
pub use time::{Clock, SystemClock};
