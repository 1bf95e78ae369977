#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Unit leadership tracking.
//!
//! Each unit of an application runs a [`Tracker`] that competes for the
//! application's leadership lease through a [`Claimer`], keeps the lease
//! renewed while it holds it, and tells interested code when the unit's
//! role changes.
//!
//! ```no_run
//! use std::sync::Arc;
//! use leadership::{LeaseManager, SystemClock, Tracker, TrackerConfig};
//!
//! # async fn demo() -> leadership::Result<()> {
//! let clock = Arc::new(SystemClock);
//! let leases = Arc::new(LeaseManager::new(clock.clone()));
//!
//! let config = TrackerConfig::new("mysql/0".parse()?);
//! let tracker = Tracker::new(config, leases, clock)?;
//!
//! if tracker.claim_leader().await.wait().await {
//!     // lead for at least the claim duration
//! }
//!
//! tracker.kill();
//! tracker.wait().await
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod names;
pub mod ticket;
pub mod tracker;

pub use config::TrackerConfig;
pub use context::Context;
pub use error::{Result, TrackerError};
pub use names::UnitId;
pub use ticket::Ticket;
pub use tracker::Tracker;

pub use lease::{Claimer, Clock, LeaseManager, SystemClock};
