//! Interrupt token for callers blocked on the agent connection.
//!
//! A waiter on [`crate::binder::SecureServiceBinder::wait_for_channel`] holds an
//! `InterruptToken`. Interrupting any clone wakes every waiter sharing it, and
//! those waiters observe "no channel" instead of blocking forever.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    interrupted: AtomicBool,
    notify: Notify,
}

/// A cloneable, awaitable interrupt signal.
///
/// # Example
///
/// ```
/// use appbridge_core::cancel::InterruptToken;
///
/// let token = InterruptToken::new();
/// let token_clone = token.clone();
///
/// token_clone.interrupt();
/// assert!(token.is_interrupted());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InterruptToken {
    inner: Arc<Inner>,
}

impl InterruptToken {
    /// Create a new interrupt token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt every waiter holding a clone of this token.
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check if an interrupt has been requested.
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Resolve once the token is interrupted.
    ///
    /// Returns immediately if it already was.
    pub async fn interrupted(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_interrupted() {
                return;
            }
            notified.await;
        }
    }

    /// Return an error if the token has been interrupted.
    pub fn check(&self) -> Result<(), InterruptedError> {
        if self.is_interrupted() {
            Err(InterruptedError)
        } else {
            Ok(())
        }
    }
}

/// Error returned when a wait is interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptedError;

impl std::fmt::Display for InterruptedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Wait was interrupted")
    }
}

impl std::error::Error for InterruptedError {}

impl From<InterruptedError> for crate::error::BridgeError {
    fn from(_: InterruptedError) -> Self {
        crate::error::BridgeError::BindInterrupted
    }
}
