//! Volume Events
//!
//! A single outbound channel signalling external watchers that a named
//! volume needs attention. The channel is bounded and producers never block:
//! with no consumer draining it, an event is dropped and logged rather than
//! deadlocking the caller.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Default channel capacity, sized to an expected burst of spec-created
/// volumes
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notification that a volume needs attention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeEvent {
    /// Name of the volume the watcher should look at
    pub volume_name: String,
}

/// Sending half of the event channel
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<VolumeEvent>,
}

impl EventSender {
    /// Notify watchers about a volume; drops and logs when the channel is
    /// full or closed.
    pub fn notify_volume(&self, volume_name: &str) {
        let event = VolumeEvent {
            volume_name: volume_name.to_string(),
        };
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(volume = %event.volume_name, "event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(volume = %event.volume_name, "event channel closed, dropping event");
            }
        }
    }
}

/// Create the event channel with the default capacity
pub fn event_channel() -> (EventSender, mpsc::Receiver<VolumeEvent>) {
    event_channel_with_capacity(EVENT_CHANNEL_CAPACITY)
}

/// Create the event channel with a custom capacity
pub fn event_channel_with_capacity(
    capacity: usize,
) -> (EventSender, mpsc::Receiver<VolumeEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_delivers_event() {
        let (sender, mut rx) = event_channel();
        sender.notify_volume("vol-1");
        assert_eq!(rx.recv().await.unwrap().volume_name, "vol-1");
    }

    #[tokio::test]
    async fn test_full_channel_drops_instead_of_blocking() {
        let (sender, mut rx) = event_channel_with_capacity(1);
        sender.notify_volume("vol-1");
        // Channel is full now; this must return immediately
        sender.notify_volume("vol-2");

        assert_eq!(rx.recv().await.unwrap().volume_name, "vol-1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_channel_does_not_panic() {
        let (sender, rx) = event_channel();
        drop(rx);
        sender.notify_volume("vol-1");
    }
}
