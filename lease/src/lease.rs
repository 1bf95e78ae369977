// In-process lease manager - one leadership lease per application

use crate::{claimer::Claimer, time::Clock, Error, Result};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A leadership lease held by one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub holder: String,
    pub start_time: Instant,
    pub duration: Duration,
}

impl Lease {
    pub fn expires_at(&self) -> Instant {
        self.start_time + self.duration
    }

    pub fn is_valid(&self, now: Instant) -> bool {
        now < self.expires_at()
    }

    pub fn time_remaining(&self, now: Instant) -> Duration {
        self.expires_at().saturating_duration_since(now)
    }
}

/// Grants and tracks application leases in memory.
///
/// Nothing is persisted or replicated: the manager is the lease service for
/// trackers living in the same process.
#[derive(Debug)]
pub struct LeaseManager {
    clock: Arc<dyn Clock>,

    /// Current lease per application, expired entries included until cleanup
    leases: DashMap<String, Lease>,

    /// Woken on every explicit release
    released: Notify,
}

impl LeaseManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            leases: DashMap::new(),
            released: Notify::new(),
        }
    }

    /// Claim a lease, or extend it if `holder` already has it
    pub fn claim_lease(&self, application: &str, holder: &str, duration: Duration) -> Result<Lease> {
        if duration.is_zero() {
            return Err(Error::InvalidDuration(duration));
        }

        let now = self.clock.now();
        let lease = Lease {
            holder: holder.to_owned(),
            start_time: now,
            duration,
        };

        match self.leases.entry(application.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if current.holder != holder && current.is_valid(now) {
                    debug!(application, holder, current = %current.holder, "lease claim denied");
                    return Err(Error::ClaimDenied);
                }
                occupied.insert(lease.clone());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(lease.clone());
            }
        }

        debug!(application, holder, ?duration, "lease granted");
        Ok(lease)
    }

    /// Release a lease early
    pub fn release(&self, application: &str, holder: &str) -> Result<()> {
        if self
            .leases
            .remove_if(application, |_, lease| lease.holder == holder)
            .is_none()
        {
            return Err(Error::NotHeld {
                application: application.to_owned(),
                holder: holder.to_owned(),
            });
        }

        debug!(application, holder, "lease released");
        self.released.notify_waiters();
        Ok(())
    }

    /// The unexpired lease on `application`, if any
    pub fn lease(&self, application: &str) -> Option<Lease> {
        let now = self.clock.now();
        self.leases
            .get(application)
            .filter(|lease| lease.is_valid(now))
            .map(|lease| lease.clone())
    }

    pub fn holder(&self, application: &str) -> Option<String> {
        self.lease(application).map(|lease| lease.holder)
    }

    /// Drop expired leases, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.leases.len();
        self.leases.retain(|_, lease| lease.is_valid(now));
        before - self.leases.len()
    }

    /// Wait until `application` has no unexpired lease
    pub async fn wait_released(&self, application: &str, cancel: &CancellationToken) -> Result<()> {
        loop {
            // Register before inspecting the map so a release in between is not missed.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = self.clock.now();
            let remaining = match self.leases.get(application) {
                Some(lease) if lease.is_valid(now) => lease.time_remaining(now),
                _ => return Ok(()),
            };

            tokio::select! {
                () = cancel.cancelled() => return Err(Error::BlockCancelled),
                () = &mut notified => {}
                () = self.clock.after(remaining) => {}
            }
        }
    }
}

#[async_trait]
impl Claimer for LeaseManager {
    async fn claim(&self, application_id: &str, unit_id: &str, duration: Duration) -> Result<()> {
        self.claim_lease(application_id, unit_id, duration).map(|_| ())
    }

    async fn block_until_released(
        &self,
        application_id: &str,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.wait_released(application_id, &cancel).await
    }
}
