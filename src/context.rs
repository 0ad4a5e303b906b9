//! Cancellation and deadline signal threaded through cancellable operations.

use crate::{common::*, error::ContextError};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// A cancellation signal with an optional deadline.
///
/// Clones share the same signal. Contexts derived by [with_cancel()](Context::with_cancel),
/// [with_timeout()](Context::with_timeout) or [with_deadline()](Context::with_deadline)
/// are children: they are done whenever the parent is done, and cancelling a child
/// leaves the parent untouched.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never done unless cancelled explicitly.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_cancel(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a child that expires at `deadline`, or at the parent's deadline if that is earlier.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };

        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Returns why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            Some(ContextError::Cancelled)
        } else if matches!(self.deadline, Some(deadline) if Instant::now() >= deadline) {
            Some(ContextError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Completes once the context is done.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => ContextError::Cancelled,
                    _ = time::sleep_until(deadline) => ContextError::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_propagates_to_children_test() {
        let parent = Context::background();
        let child = parent.with_cancel();
        let grandchild = child.with_cancel();

        assert!(!child.is_done());
        grandchild.cancel();
        assert_eq!(grandchild.err(), Some(ContextError::Cancelled));
        assert!(!child.is_done());

        parent.cancel();
        assert_eq!(child.done().await, ContextError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_test() {
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        assert!(ctx.err().is_none());

        let start = Instant::now();
        assert_eq!(ctx.done().await, ContextError::DeadlineExceeded);
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn child_keeps_earlier_deadline_test() {
        let parent = Context::background().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
