//! Delivery targets for subscriptions.

use continuum_types::Event;
use tokio::sync::mpsc;

/// Where a subscription's events go.
///
/// `deliver` is synchronous so the endpoint can hold its cancellation gate
/// across the call.
pub trait EventSink: Send + Sync + 'static {
    /// Hand one event to the protocol adapter.
    ///
    /// Returns `false` once the receiving side is gone, which ends the
    /// subscription's delivery loop.
    fn deliver(&self, subscription_id: &str, event: Event) -> bool;
}

impl EventSink for mpsc::UnboundedSender<Event> {
    fn deliver(&self, _subscription_id: &str, event: Event) -> bool {
        self.send(event).is_ok()
    }
}

/// Tagged form for adapters multiplexing many subscriptions on one channel.
impl EventSink for mpsc::UnboundedSender<(String, Event)> {
    fn deliver(&self, subscription_id: &str, event: Event) -> bool {
        self.send((subscription_id.to_string(), event)).is_ok()
    }
}
