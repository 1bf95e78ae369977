use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::TrackerError;

/// A cancellation scope that remembers why it was cancelled.
///
/// Children are cancelled with their parent. The first cancellation of a
/// scope wins: a cause set later is ignored, and a child cancelled through
/// its parent reports the parent's cause.
#[derive(Clone, Default)]
pub struct Context {
    inner: Arc<ContextInner>,
}

#[derive(Default)]
struct ContextInner {
    token: CancellationToken,
    cause: Mutex<Option<TrackerError>>,
    parent: Option<Context>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                token: self.inner.token.child_token(),
                cause: Mutex::new(None),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Cancel with cause [`TrackerError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel_with_cause(TrackerError::Cancelled);
    }

    pub fn cancel_with_cause(&self, cause: TrackerError) {
        let mut slot = self.inner.cause.lock();
        if self.inner.token.is_cancelled() {
            return;
        }
        *slot = Some(cause);
        self.inner.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }

    /// Why this scope was cancelled, `None` while it is live.
    pub fn cause(&self) -> Option<TrackerError> {
        if !self.is_cancelled() {
            return None;
        }
        if let Some(cause) = self.inner.cause.lock().clone() {
            return Some(cause);
        }
        match &self.inner.parent {
            Some(parent) => parent.cause(),
            None => Some(TrackerError::Cancelled),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .field("cause", &self.cause())
            .finish()
    }
}
