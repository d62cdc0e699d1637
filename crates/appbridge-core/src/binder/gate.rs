//! One-shot release gate for channel waiters.

use crate::cancel::{InterruptToken, InterruptedError};
use tokio::sync::watch;

/// A latch that opens exactly once and lets any number of tasks wait on it.
#[derive(Debug)]
pub struct ChannelGate {
    released: watch::Sender<bool>,
}

impl Default for ChannelGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelGate {
    pub fn new() -> Self {
        let (released, _) = watch::channel(false);
        Self { released }
    }

    /// Open the gate. Returns `false` if it was already open.
    pub fn release(&self) -> bool {
        self.released.send_if_modified(|released| {
            if *released {
                false
            } else {
                *released = true;
                true
            }
        })
    }

    pub fn is_released(&self) -> bool {
        *self.released.borrow()
    }

    /// Wait until the gate opens or `token` is interrupted.
    pub async fn wait(&self, token: &InterruptToken) -> Result<(), InterruptedError> {
        let mut rx = self.released.subscribe();
        tokio::select! {
            biased;
            // The sender lives in `self`, so this cannot observe a closed channel.
            _ = rx.wait_for(|released| *released) => Ok(()),
            _ = token.interrupted() => Err(InterruptedError),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_release_fires_once() {
        let gate = ChannelGate::new();
        assert!(!gate.is_released());
        assert!(gate.release());
        assert!(!gate.release());
        assert!(gate.is_released());
    }

    #[tokio::test]
    async fn test_wait_after_release_returns_immediately() {
        let gate = ChannelGate::new();
        gate.release();
        assert!(gate.wait(&InterruptToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_wakes_every_waiter() {
        let gate = Arc::new(ChannelGate::new());
        let token = InterruptToken::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let gate = gate.clone();
                let token = token.clone();
                tokio::spawn(async move { gate.wait(&token).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.release();

        for waiter in waiters {
            let result = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
            assert!(result.is_ok());
        }
    }

    #[tokio::test]
    async fn test_interrupt_ends_wait() {
        let gate = Arc::new(ChannelGate::new());
        let token = InterruptToken::new();
        let waiter = tokio::spawn({
            let gate = gate.clone();
            let token = token.clone();
            async move { gate.wait(&token).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.interrupt();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Err(InterruptedError));
        assert!(!gate.is_released());
    }
}
