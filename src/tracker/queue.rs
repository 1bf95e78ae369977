use std::collections::VecDeque;

use crate::ticket::TicketSink;

/// Pending wait tickets, resolved in submission order.
#[derive(Debug, Default)]
pub(crate) struct RequestQueue {
    sinks: VecDeque<TicketSink>,
}

impl RequestQueue {
    pub(crate) fn push(&mut self, sink: TicketSink) {
        self.sinks.push_back(sink);
    }

    /// Resolve every queued ticket, oldest first. Returns how many there were.
    pub(crate) fn resolve_all(&mut self, outcome: bool) -> usize {
        let count = self.sinks.len();
        for sink in self.sinks.drain(..) {
            sink.resolve(outcome);
        }
        count
    }

    /// Drop every queued sink so its ticket reads `false`.
    pub(crate) fn close(&mut self) -> usize {
        let count = self.sinks.len();
        self.sinks.clear();
        count
    }
}
