//! One-shot boolean outcomes handed out by the tracker.
//!
//! A request creates a [`TicketSink`]/[`Ticket`] pair. The tracker loop keeps
//! the sink and finalises it exactly once, either by [`TicketSink::resolve`]
//! or by dropping it, which reads as a `false` outcome. Callers keep the
//! ticket, which may be cloned and waited on any number of times.

use std::fmt;

use tokio::sync::watch;

/// Create a linked sink and ticket.
pub fn pair() -> (TicketSink, Ticket) {
    let (tx, rx) = watch::channel(None);
    (TicketSink { tx }, Ticket { rx })
}

/// Writable end of a ticket. Resolving consumes it, so an outcome can only
/// be written once.
pub struct TicketSink {
    tx: watch::Sender<Option<bool>>,
}

impl TicketSink {
    pub fn resolve(self, outcome: bool) {
        self.tx.send_replace(Some(outcome));
    }
}

impl fmt::Debug for TicketSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketSink").finish_non_exhaustive()
    }
}

/// The caller's view of a pending request.
#[derive(Clone)]
pub struct Ticket {
    rx: watch::Receiver<Option<bool>>,
}

impl Ticket {
    /// A ticket that is already final with a `false` outcome.
    pub fn closed() -> Self {
        let (sink, ticket) = pair();
        drop(sink);
        ticket
    }

    /// The final outcome, or `None` while pending.
    pub fn outcome(&self) -> Option<bool> {
        if let Some(outcome) = *self.rx.borrow() {
            return Some(outcome);
        }
        if self.rx.has_changed().is_err() {
            // Sink gone. Re-read in case it resolved just before dropping.
            return Some(self.rx.borrow().unwrap_or(false));
        }
        None
    }

    pub fn is_ready(&self) -> bool {
        self.outcome().is_some()
    }

    /// Completes once the outcome is final.
    pub async fn ready(&self) {
        let mut rx = self.rx.clone();
        // An error means the sink was dropped, which is also final.
        let _ = rx.wait_for(Option::is_some).await;
    }

    /// Wait for the outcome.
    pub async fn wait(&self) -> bool {
        self.ready().await;
        self.outcome().unwrap_or(false)
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("outcome", &self.outcome())
            .finish()
    }
}
