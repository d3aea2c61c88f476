//! Fan-out bus for platform events.

use tokio::sync::broadcast;

use super::types::{BillingEvent, PlatformEvent, SessionEvent};

/// How far a slow subscriber may fall behind before it starts losing events.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Multi-subscriber sender for [`PlatformEvent`]s.
///
/// A thin, cloneable handle around a `tokio::sync::broadcast` channel. Every
/// subscriber sees every event sent after it subscribed; sending with no
/// subscribers is a no-op, so emitters never care whether anyone listens.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<PlatformEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Send an event to every current subscriber.
    ///
    /// Returns the number of subscribers that received it, 0 when nobody is
    /// listening.
    pub fn send(&self, event: PlatformEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn send_billing(&self, event: BillingEvent) -> usize {
        self.send(PlatformEvent::Billing(event))
    }

    pub fn send_session(&self, event: SessionEvent) -> usize {
        self.send(PlatformEvent::Session(event))
    }

    /// New receiver; it only sees events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.tx.receiver_count() > 0
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
