// The tracker loop: sole owner of the unit's leadership state.
//
// Every event (shutdown, blocker result, renewal tick, request) is handled to
// completion before the next one is taken, so role transitions and ticket
// resolution never interleave.

use std::future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use lease::{Claimer, Clock};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::queue::RequestQueue;
use crate::ticket::TicketSink;
use crate::{Result, TrackerError};

/// Receiving ends of the three request channels.
pub(crate) struct Requests {
    pub(crate) claim: mpsc::Receiver<TicketSink>,
    pub(crate) wait_leader: mpsc::Receiver<TicketSink>,
    pub(crate) wait_minion: mpsc::Receiver<TicketSink>,
}

enum Role {
    /// Holding the lease; it is renewed at `renew_at`.
    Leader { renew_at: Instant },
    /// Not holding the lease. Outside event handling the blocker is always
    /// running, except before the first claim.
    Minion { blocker: Option<Blocker> },
}

/// A running block-until-released call.
struct Blocker {
    generation: u64,
    cancel: CancellationToken,
}

/// Blocker result tagged with the blocker that produced it. A panicking
/// blocker reports `TaskFailed` under its own generation.
type BlockOutcome = (u64, Result<()>);

enum Event {
    Shutdown,
    Blocked(std::result::Result<BlockOutcome, JoinError>),
    Renew,
    Claim(TicketSink),
    WaitLeader(TicketSink),
    WaitMinion(TicketSink),
}

pub(crate) struct TrackerLoop {
    claimer: Arc<dyn Claimer>,
    clock: Arc<dyn Clock>,
    application_id: String,
    unit_id: String,
    duration: Duration,

    role: Role,
    renewal: Option<BoxFuture<'static, ()>>,
    waiting_leader: RequestQueue,
    waiting_minion: RequestQueue,

    /// Blocker tasks, current and retired. Aborted and joined on exit.
    helpers: JoinSet<BlockOutcome>,
    next_generation: u64,

    requests: Requests,
    shutdown: CancellationToken,
}

impl TrackerLoop {
    pub(crate) fn new(
        claimer: Arc<dyn Claimer>,
        clock: Arc<dyn Clock>,
        application_id: String,
        unit_id: String,
        duration: Duration,
        requests: Requests,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            claimer,
            clock,
            application_id,
            unit_id,
            duration,
            role: Role::Minion { blocker: None },
            renewal: None,
            waiting_leader: RequestQueue::default(),
            waiting_minion: RequestQueue::default(),
            helpers: JoinSet::new(),
            next_generation: 0,
            requests,
            shutdown,
        }
    }

    /// Run until shutdown or a fatal claimer error. Every pending ticket is
    /// finalised and every helper joined before this returns.
    pub(crate) async fn run(mut self) -> Result<()> {
        let result = match self.serve().await {
            Err(TrackerError::ShuttingDown) => Ok(()),
            other => other,
        };
        if let Err(err) = &result {
            error!(error = %err, "leadership tracker stopped");
        }
        self.stop().await;
        result
    }

    async fn serve(&mut self) -> Result<()> {
        self.refresh().await?;
        loop {
            match self.next_event().await {
                Event::Shutdown => return Ok(()),
                Event::Blocked(joined) => self.handle_blocked(joined).await?,
                Event::Renew => {
                    self.renewal = None;
                    self.refresh().await?;
                }
                Event::Claim(sink) => {
                    let leader = self.is_leader().await?;
                    sink.resolve(leader);
                }
                Event::WaitLeader(sink) => {
                    if self.is_leader().await? {
                        sink.resolve(true);
                    } else {
                        self.waiting_leader.push(sink);
                    }
                }
                Event::WaitMinion(sink) => {
                    if self.is_leader().await? {
                        self.waiting_minion.push(sink);
                    } else {
                        sink.resolve(true);
                    }
                }
            }
        }
    }

    async fn next_event(&mut self) -> Event {
        let renewal = &mut self.renewal;
        let helpers = &mut self.helpers;
        let requests = &mut self.requests;

        // Biased: shutdown beats a simultaneous renewal tick, and internal
        // events are applied before new requests are answered. Claim requests
        // always go ahead of waits, so a steady stream of `claim_leader`
        // calls delays the wait queues.
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Event::Shutdown,
            Some(joined) = helpers.join_next(), if !helpers.is_empty() => Event::Blocked(joined),
            () = async {
                match renewal {
                    Some(timer) => timer.await,
                    None => future::pending().await,
                }
            } => Event::Renew,
            Some(sink) = requests.claim.recv() => Event::Claim(sink),
            Some(sink) = requests.wait_leader.recv() => Event::WaitLeader(sink),
            Some(sink) = requests.wait_minion.recv() => Event::WaitMinion(sink),
        }
    }

    async fn handle_blocked(
        &mut self,
        joined: std::result::Result<BlockOutcome, JoinError>,
    ) -> Result<()> {
        let (generation, result) =
            joined.map_err(|err| TrackerError::TaskFailed(format!("lease blocker: {err}")))?;

        let current = matches!(
            &self.role,
            Role::Minion { blocker: Some(blocker) } if blocker.generation == generation
        );
        if !current {
            debug!(generation, "ignoring result from retired blocker");
            return Ok(());
        }
        if let Role::Minion { blocker } = &mut self.role {
            *blocker = None;
        }

        match result {
            Ok(()) => debug!("lease released, claiming"),
            Err(TrackerError::Claimer(err)) if err.is_sentinel() => {
                debug!(%err, "lease blocker ended, claiming");
            }
            Err(err) => return Err(err),
        }
        self.refresh().await
    }

    /// Answer "are we leader?", renewing first if the lease is due.
    async fn is_leader(&mut self) -> Result<bool> {
        if let Role::Leader { renew_at } = self.role {
            if renew_at <= self.clock.now() {
                debug!("lease due for renewal, refreshing before answering");
                self.renewal = None;
                self.refresh().await?;
            }
        }
        Ok(matches!(self.role, Role::Leader { .. }))
    }

    /// Claim the lease for `2D` and move to the resulting role.
    async fn refresh(&mut self) -> Result<()> {
        let lease_for = self.duration * 2;
        let until = self.clock.now() + lease_for;

        let result = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Err(TrackerError::ShuttingDown),
            result = self.claimer.claim(&self.application_id, &self.unit_id, lease_for) => result,
        };

        match result {
            Ok(()) => {
                self.set_leader(until);
                Ok(())
            }
            Err(lease::Error::ClaimDenied) => {
                self.set_minion();
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn set_leader(&mut self, until: Instant) {
        let renew_at = until - self.duration;
        let renew_in = renew_at.saturating_duration_since(self.clock.now());

        match &self.role {
            Role::Minion { blocker } => {
                if let Some(blocker) = blocker {
                    blocker.cancel.cancel();
                }
                info!(
                    application = %self.application_id,
                    unit = %self.unit_id,
                    ?renew_in,
                    "leadership claimed"
                );
            }
            Role::Leader { .. } => debug!(?renew_in, "leadership renewed"),
        }

        self.role = Role::Leader { renew_at };
        self.renewal = Some(self.clock.after(renew_in));

        let resolved = self.waiting_leader.resolve_all(true);
        if resolved > 0 {
            debug!(resolved, "notified leader waiters");
        }
    }

    fn set_minion(&mut self) {
        self.renewal = None;

        let blocker = match std::mem::replace(&mut self.role, Role::Minion { blocker: None }) {
            Role::Minion { blocker: Some(blocker) } => blocker,
            Role::Minion { blocker: None } => {
                debug!(application = %self.application_id, "leadership denied");
                self.start_blocker()
            }
            Role::Leader { .. } => {
                info!(
                    application = %self.application_id,
                    unit = %self.unit_id,
                    "leadership lost"
                );
                self.start_blocker()
            }
        };
        self.role = Role::Minion {
            blocker: Some(blocker),
        };

        let resolved = self.waiting_minion.resolve_all(true);
        if resolved > 0 {
            debug!(resolved, "notified minion waiters");
        }
    }

    fn start_blocker(&mut self) -> Blocker {
        let generation = self.next_generation;
        self.next_generation += 1;

        // Child of the shutdown token, so stopping the tracker cancels it too.
        let cancel = self.shutdown.child_token();

        let claimer = self.claimer.clone();
        let application_id = self.application_id.clone();
        let token = cancel.clone();
        self.helpers.spawn(async move {
            let result = AssertUnwindSafe(claimer.block_until_released(&application_id, token))
                .catch_unwind()
                .await
                .map_err(|_| TrackerError::TaskFailed("lease blocker panicked".to_owned()))
                .and_then(|blocked| blocked.map_err(TrackerError::from));
            (generation, result)
        });

        debug!(generation, "waiting for lease release");
        Blocker { generation, cancel }
    }

    async fn stop(&mut self) {
        // Cancel first: anything racing a closed ticket sees the shutdown.
        self.shutdown.cancel();
        self.renewal = None;

        let pending = self.waiting_leader.close() + self.waiting_minion.close();
        if pending > 0 {
            debug!(pending, "closed pending tickets");
        }

        for requests in [
            &mut self.requests.claim,
            &mut self.requests.wait_leader,
            &mut self.requests.wait_minion,
        ] {
            requests.close();
            while requests.try_recv().is_ok() {}
        }

        self.helpers.shutdown().await;
        info!(application = %self.application_id, unit = %self.unit_id, "leadership tracker stopped");
    }
}
