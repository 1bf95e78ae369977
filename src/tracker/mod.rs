//! Per-unit leadership tracker.
//!
//! A [`Tracker`] keeps claiming the leadership lease of its unit's
//! application, renewing it `D` before each `2D` lease runs out, and answers
//! questions about the unit's role with [`Ticket`]s:
//!
//! - [`Tracker::claim_leader`]: are we leader for at least `D` more?
//! - [`Tracker::wait_leader`]: tell me once we lead.
//! - [`Tracker::wait_minion`]: tell me once we no longer lead.
//!
//! All state lives in one background task; requests are queued to it over
//! channels and answered in order.

mod queue;
mod stable;
mod worker;

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use lease::{Claimer, Clock};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use crate::config::TrackerConfig;
use crate::names::UnitId;
use crate::ticket::{self, Ticket, TicketSink};
use crate::{Result, TrackerError};
use worker::{Requests, TrackerLoop};

/// Handle to a running leadership tracker. Clones share the same tracker;
/// dropping the last one shuts it down.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<Inner>,
}

struct Inner {
    unit_id: UnitId,
    application_id: String,
    duration: Duration,
    claim_tx: mpsc::Sender<TicketSink>,
    wait_leader_tx: mpsc::Sender<TicketSink>,
    wait_minion_tx: mpsc::Sender<TicketSink>,
    shutdown: CancellationToken,
    done: watch::Receiver<Option<Result<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Tracker {
    /// Validate `config` and start tracking on the current tokio runtime.
    ///
    /// The first claim is attempted straight away; tickets requested before
    /// it completes are answered after it.
    pub fn new(
        config: TrackerConfig,
        claimer: Arc<dyn Claimer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let unit_id = config.unit_id;
        let application_id = unit_id.application().to_owned();
        let duration = config.claim_duration;

        let (claim_tx, claim) = mpsc::channel(1);
        let (wait_leader_tx, wait_leader) = mpsc::channel(1);
        let (wait_minion_tx, wait_minion) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let (done_tx, done) = watch::channel(None);

        let worker = TrackerLoop::new(
            claimer,
            clock,
            application_id.clone(),
            unit_id.to_string(),
            duration,
            Requests {
                claim,
                wait_leader,
                wait_minion,
            },
            shutdown.clone(),
        );

        let span = info_span!("leadership", unit = %unit_id);
        tokio::spawn(
            async move {
                let result = AssertUnwindSafe(worker.run())
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(TrackerError::TaskFailed("tracker loop panicked".to_owned()))
                    });
                done_tx.send_replace(Some(result));
            }
            .instrument(span),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                unit_id,
                application_id,
                duration,
                claim_tx,
                wait_leader_tx,
                wait_minion_tx,
                shutdown,
                done,
            }),
        })
    }

    pub fn application_id(&self) -> &str {
        &self.inner.application_id
    }

    pub fn unit_id(&self) -> &UnitId {
        &self.inner.unit_id
    }

    /// The renewal interval `D`.
    pub fn claim_duration(&self) -> Duration {
        self.inner.duration
    }

    /// Resolves `true` iff the unit leads and will keep leading for at least
    /// the claim duration. Never waits for a future promotion.
    pub async fn claim_leader(&self) -> Ticket {
        self.submit(&self.inner.claim_tx).await
    }

    /// Resolves `true` once the unit leads; immediately if it already does.
    pub async fn wait_leader(&self) -> Ticket {
        self.submit(&self.inner.wait_leader_tx).await
    }

    /// Resolves `true` once the unit does not lead; immediately if it
    /// already does not.
    pub async fn wait_minion(&self) -> Ticket {
        self.submit(&self.inner.wait_minion_tx).await
    }

    /// Start shutting down. Pending tickets resolve `false`.
    pub fn kill(&self) {
        self.inner.shutdown.cancel();
    }

    /// Wait for the tracker to stop.
    ///
    /// `Ok(())` after [`kill`](Self::kill); the claimer's error if it failed.
    pub async fn wait(&self) -> Result<()> {
        let mut done = self.inner.done.clone();
        let finished = done.wait_for(Option::is_some).await;
        match finished {
            Ok(result) => result.clone().unwrap_or(Ok(())),
            Err(_) => Err(TrackerError::TaskFailed(
                "tracker task exited without a result".to_owned(),
            )),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.done.borrow().is_some()
    }

    fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    async fn submit(&self, requests: &mpsc::Sender<TicketSink>) -> Ticket {
        if self.is_shutting_down() {
            return Ticket::closed();
        }

        let (sink, ticket) = ticket::pair();
        // If the loop is gone the sink comes back in the send error and is
        // dropped with it, closing the ticket.
        tokio::select! {
            biased;
            () = self.inner.shutdown.cancelled() => {}
            _ = requests.send(sink) => {}
        }
        ticket
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("unit_id", &self.inner.unit_id)
            .field("application_id", &self.inner.application_id)
            .field("claim_duration", &self.inner.duration)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
