//! Uplink notification
//!
//! The uplink stage is best-effort: when nobody is listening the worker
//! skips the notification, and a failed notification is only logged.

use std::sync::Arc;

use tokio::sync::watch;

use super::shadow::ShadowState;
use crate::error::{ConcentratorError, Result};

/// Receiver of shadow updates
#[cfg_attr(test, mockall::automock)]
pub trait UplinkNotifier: Send {
    /// Whether a consumer is ready to receive updates
    fn is_enabled(&self) -> bool;

    /// Deliver an updated copy of the shadow
    fn notify(&self, state: &ShadowState) -> Result<()>;
}

/// Single-item broadcast of the latest shadow
///
/// Enabled while at least one subscriber exists. Subscribers only ever see
/// the newest state; intermediate updates may be skipped.
#[derive(Debug, Clone)]
pub struct ShadowBroadcast {
    sender: Arc<watch::Sender<ShadowState>>,
}

impl ShadowBroadcast {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ShadowState::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ShadowState> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Last state sent
    pub fn latest(&self) -> ShadowState {
        *self.sender.borrow()
    }
}

impl Default for ShadowBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl UplinkNotifier for ShadowBroadcast {
    fn is_enabled(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    fn notify(&self, state: &ShadowState) -> Result<()> {
        self.sender
            .send(*state)
            .map_err(|_| ConcentratorError::Uplink("no subscribers".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_subscribers() {
        let broadcast = ShadowBroadcast::new();
        assert!(!broadcast.is_enabled());
        assert!(broadcast.notify(&ShadowState::default()).is_err());
    }

    #[test]
    fn test_subscriber_enables_and_receives() {
        let broadcast = ShadowBroadcast::new();
        let mut rx = broadcast.subscribe();
        assert!(broadcast.is_enabled());

        let state = ShadowState {
            light: 42,
            ..Default::default()
        };
        broadcast.notify(&state).unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().light, 42);
        assert_eq!(broadcast.latest(), state);

        drop(rx);
        assert!(!broadcast.is_enabled());
    }

    #[test]
    fn test_only_latest_is_kept() {
        let broadcast = ShadowBroadcast::new();
        let rx = broadcast.subscribe();

        for light in 1..=3 {
            broadcast
                .notify(&ShadowState {
                    light,
                    ..Default::default()
                })
                .unwrap();
        }
        assert_eq!(rx.borrow().light, 3);
    }

    #[tokio::test]
    async fn test_async_subscriber_wakes() {
        let broadcast = ShadowBroadcast::new();
        let mut rx = broadcast.subscribe();

        let publisher = broadcast.clone();
        tokio::spawn(async move {
            publisher
                .notify(&ShadowState {
                    temperature: 2000,
                    ..Default::default()
                })
                .unwrap();
        });

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().temperature, 2000);
    }
}
