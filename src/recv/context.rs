//! Per-call cancellation signal.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::StreamError;

/// Cancellation state of one RPC call.
///
/// A done signal plus the reason it fired. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    cause: Arc<OnceLock<StreamError>>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that fires with `DeadlineExceeded` after `timeout`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn with_timeout(timeout: Duration) -> Self {
        let ctx = Self::new();
        let timer = ctx.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(timeout) => timer.cancel_with(StreamError::DeadlineExceeded),
                () = timer.token.cancelled() => {}
            }
        });
        ctx
    }

    /// Cancel the call.
    pub fn cancel(&self) {
        self.cancel_with(StreamError::Canceled);
    }

    /// Cancel the call with a specific cause. The first cause wins.
    pub fn cancel_with(&self, cause: StreamError) {
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    /// Resolves once the call is canceled.
    pub fn done(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Why the call was canceled, or `None` while it is still live.
    pub fn err(&self) -> Option<StreamError> {
        if !self.token.is_cancelled() {
            return None;
        }
        Some(self.cause.get().cloned().unwrap_or(StreamError::Canceled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_context_has_no_error() {
        let ctx = CallContext::new();
        assert!(!ctx.is_done());
        assert_eq!(ctx.err(), None);
    }

    #[test]
    fn test_first_cause_wins() {
        let ctx = CallContext::new();
        let clone = ctx.clone();
        clone.cancel();
        ctx.cancel_with(StreamError::DeadlineExceeded);
        assert!(ctx.is_done());
        assert_eq!(ctx.err(), Some(StreamError::Canceled));
    }

    #[tokio::test]
    async fn test_timeout_reports_deadline() {
        let ctx = CallContext::with_timeout(Duration::from_millis(20));
        ctx.done().await;
        assert_eq!(ctx.err(), Some(StreamError::DeadlineExceeded));
    }
}
