use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{ResourceEvent, ResourceEventKind};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for resource lifecycle events, one channel per event kind
/// plus a firehose carrying every event.
///
/// Subscribing is `on`, dropping the receiver is `off`, and a single
/// `recv()` is `one`.
pub struct NotifyHub {
    channels: DashMap<ResourceEventKind, broadcast::Sender<ResourceEvent>>,
    all: broadcast::Sender<ResourceEvent>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            all: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to one kind of event. Creates the channel if needed.
    pub fn subscribe(&self, kind: ResourceEventKind) -> broadcast::Receiver<ResourceEvent> {
        let sender = self
            .channels
            .entry(kind)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<ResourceEvent> {
        self.all.subscribe()
    }

    /// Publish an event. No-op if nobody is listening.
    pub fn send(&self, event: &ResourceEvent) {
        if let Some(sender) = self.channels.get(&event.kind()) {
            let _ = sender.send(event.clone());
        }
        let _ = self.all.send(event.clone());
    }

    /// Drop a channel, disconnecting every subscriber of that kind.
    pub fn remove(&self, kind: ResourceEventKind) {
        self.channels.remove(&kind);
    }

    pub fn subscriber_count(&self, kind: ResourceEventKind) -> usize {
        self.channels
            .get(&kind)
            .map_or(0, |sender| sender.receiver_count())
    }
}
