use std::time::Duration;
use thiserror::Error;
use tokio::time::{self, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Cancellation and deadline carried alongside a call.
///
/// On the client it bounds how long the caller waits for a response. On the
/// server it is handed to handlers that ask for it and is cancelled when the
/// inbound request goes away.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

/// Why a [`Context`] finished.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum Done {
    #[error("context canceled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl Context {
    /// A context that is never done unless cancelled explicitly.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A context cancelled together with `self`, optionally with a tighter deadline.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let deadline = match (self.deadline, timeout) {
            (Some(parent), Some(timeout)) => Some(parent.min(Instant::now() + timeout)),
            (parent, None) => parent,
            (None, Some(timeout)) => Some(Instant::now() + timeout),
        };
        Self {
            token: self.token.child_token(),
            deadline,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancels this context when the returned guard is dropped.
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    pub fn err(&self) -> Option<Done> {
        if self.token.is_cancelled() {
            Some(Done::Cancelled)
        } else if self.deadline.is_some_and(|d| d <= Instant::now()) {
            Some(Done::DeadlineExceeded)
        } else {
            None
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Done {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => Done::Cancelled,
                _ = time::sleep_until(deadline) => Done::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                Done::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let ctx = Context::with_timeout(Duration::from_millis(50));
        assert_eq!(ctx.err(), None);
        assert_eq!(ctx.done().await, Done::DeadlineExceeded);
        assert!(ctx.is_done());
    }

    #[tokio::test]
    async fn cancel_reaches_children() {
        let parent = Context::background();
        let child = parent.child(None);
        parent.cancel();
        assert_eq!(child.done().await, Done::Cancelled);
        assert_eq!(child.err(), Some(Done::Cancelled));
    }

    #[tokio::test]
    async fn drop_guard_cancels() {
        let ctx = Context::background();
        drop(ctx.cancel_on_drop());
        assert_eq!(ctx.err(), Some(Done::Cancelled));
    }

    #[test]
    fn child_keeps_tighter_deadline() {
        let parent = Context::with_timeout(Duration::from_secs(1));
        let child = parent.child(Some(Duration::from_secs(60)));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
