use crate::{claimer::Claimer, time::Clock, Error, Result};
use async_trait::async_trait;
use futures::future::{self, BoxFuture};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Clock that only moves when the test says so.
///
/// Timers created by [`Clock::after`] fire when [`advance`] reaches their
/// deadline. A clock built with [`without_timers`] never fires them, which
/// lets a test observe a deadline passing before its timer is delivered.
///
/// [`advance`]: ManualClock::advance
/// [`without_timers`]: ManualClock::without_timers
#[derive(Debug)]
pub struct ManualClock {
    now: watch::Sender<Instant>,
    timers: bool,
}

impl ManualClock {
    pub fn new() -> Self {
        let (now, _) = watch::channel(Instant::now());
        Self { now, timers: true }
    }

    pub fn without_timers() -> Self {
        Self {
            timers: false,
            ..Self::new()
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.now.send_modify(|now| *now += duration);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.borrow()
    }

    fn after(&self, duration: Duration) -> BoxFuture<'static, ()> {
        if !self.timers {
            return Box::pin(future::pending());
        }

        let deadline = self.now() + duration;
        let mut now = self.now.subscribe();
        Box::pin(async move {
            if now.wait_for(|now| *now >= deadline).await.is_err() {
                // Clock dropped: time never reaches the deadline.
                future::pending::<()>().await;
            }
        })
    }
}

/// One recorded `claim` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimCall {
    pub application_id: String,
    pub unit_id: String,
    pub duration: Duration,
}

/// Claimer whose answers are scripted by the test.
///
/// Claims pop queued responses first and fall back to the default response.
/// `block_until_released` only returns after a matching [`release`] (or on
/// cancellation), so a test decides exactly when a lease "becomes free".
///
/// [`release`]: ScriptedClaimer::release
#[derive(Debug)]
pub struct ScriptedClaimer {
    responses: Mutex<VecDeque<Result<()>>>,
    default_response: Mutex<Result<()>>,
    claims: Mutex<Vec<ClaimCall>>,
    releases: Semaphore,
    block_calls: AtomicUsize,
    blocked: AtomicUsize,
}

impl ScriptedClaimer {
    pub fn new(default_response: Result<()>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_response: Mutex::new(default_response),
            claims: Mutex::new(Vec::new()),
            releases: Semaphore::new(0),
            block_calls: AtomicUsize::new(0),
            blocked: AtomicUsize::new(0),
        }
    }

    /// Grants every claim unless scripted otherwise
    pub fn granting() -> Self {
        Self::new(Ok(()))
    }

    /// Denies every claim unless scripted otherwise
    pub fn denying() -> Self {
        Self::new(Err(Error::ClaimDenied))
    }

    /// Queue the answer for the next unanswered claim
    pub fn push_response(&self, response: Result<()>) {
        self.responses.lock().push_back(response);
    }

    pub fn set_default(&self, response: Result<()>) {
        *self.default_response.lock() = response;
    }

    pub fn claim_count(&self) -> usize {
        self.claims.lock().len()
    }

    pub fn claims(&self) -> Vec<ClaimCall> {
        self.claims.lock().clone()
    }

    /// Let one current or future `block_until_released` call return `Ok`
    pub fn release(&self) {
        self.releases.add_permits(1);
    }

    /// Total `block_until_released` calls made so far
    pub fn block_count(&self) -> usize {
        self.block_calls.load(Ordering::SeqCst)
    }

    /// `block_until_released` calls still in flight
    pub fn blocked_now(&self) -> usize {
        self.blocked.load(Ordering::SeqCst)
    }
}

struct BlockedGuard<'a>(&'a AtomicUsize);

impl<'a> BlockedGuard<'a> {
    fn enter(gauge: &'a AtomicUsize) -> Self {
        gauge.fetch_add(1, Ordering::SeqCst);
        Self(gauge)
    }
}

impl Drop for BlockedGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Claimer for ScriptedClaimer {
    async fn claim(&self, application_id: &str, unit_id: &str, duration: Duration) -> Result<()> {
        self.claims.lock().push(ClaimCall {
            application_id: application_id.to_owned(),
            unit_id: unit_id.to_owned(),
            duration,
        });

        let scripted = self.responses.lock().pop_front();
        scripted.unwrap_or_else(|| self.default_response.lock().clone())
    }

    async fn block_until_released(
        &self,
        _application_id: &str,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = BlockedGuard::enter(&self.blocked);

        tokio::select! {
            () = cancel.cancelled() => Err(Error::BlockCancelled),
            permit = self.releases.acquire() => {
                permit
                    .map_err(|_| Error::Unavailable("release semaphore closed".to_owned()))?
                    .forget();
                Ok(())
            }
        }
    }
}
