use std::fmt::Debug;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;

/// Source of time for lease bookkeeping and renewal timers.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Instant;

    /// Completes once `duration` has elapsed on this clock.
    fn after(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Clock backed by the tokio timer. Follows tokio's paused time in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn after(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}
