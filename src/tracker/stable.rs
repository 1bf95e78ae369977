use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Tracker;
use crate::context::Context;
use crate::ticket::Ticket;
use crate::{Result, TrackerError};

impl Tracker {
    /// Run `work` for as long as the unit's role stays what it is now.
    ///
    /// `work` receives a child of `parent`. If the unit gains or loses
    /// leadership while `work` runs, that context is cancelled with
    /// [`TrackerError::LeadershipChanged`] (or [`TrackerError::ShuttingDown`]
    /// if the tracker stops). Cancelling `parent` cancels it with the
    /// parent's cause.
    ///
    /// When `work` returns [`TrackerError::Cancelled`] after its context was
    /// cancelled, the context's cause is returned instead. Any other result
    /// is returned unchanged.
    pub async fn with_stable_leadership<T, F, Fut>(&self, parent: &Context, work: F) -> Result<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let ctx = parent.child();

        let observer = if self.claim_leader().await.wait().await {
            self.wait_minion().await
        } else {
            self.wait_leader().await
        };

        let finished = CancellationToken::new();
        let supervisor = tokio::spawn(supervise(observer, ctx.clone(), finished.clone()));
        // Stops the supervisor even if this call is dropped mid-work.
        let stop = finished.drop_guard();

        let result = work(ctx.clone()).await;

        drop(stop);
        if let Err(err) = supervisor.await {
            warn!(error = %err, "stable leadership supervisor failed");
        }

        match result {
            Err(TrackerError::Cancelled) if ctx.is_cancelled() => {
                Err(ctx.cause().unwrap_or(TrackerError::Cancelled))
            }
            other => other,
        }
    }
}

/// Cancel `ctx` when the role observer fires, unless the work finishes first.
async fn supervise(observer: Ticket, ctx: Context, finished: CancellationToken) {
    tokio::select! {
        biased;
        () = finished.cancelled() => {}
        // Observers only resolve true on a role flip; false means the
        // tracker closed them on its way down.
        changed = observer.wait() => {
            let cause = if changed {
                TrackerError::LeadershipChanged
            } else {
                TrackerError::ShuttingDown
            };
            debug!(%cause, "cancelling stable leadership work");
            ctx.cancel_with_cause(cause);
        }
    }
}
