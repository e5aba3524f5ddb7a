//! # Event Bus
//!
//! The RPC dispatch collaborator. Requests travel to service handlers and
//! replies travel back to proxies over the same bus.

use crate::error::BusError;
use crate::subscriber::{ListenerTable, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use continuum_types::{Cri, Event};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Dispatch interface used by the registry, proxies and endpoints.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Fire-and-forget send.
    ///
    /// # Returns
    ///
    /// The number of listeners the event reached.
    async fn send(&self, event: Event) -> usize;

    /// Send and require at least one listener.
    ///
    /// # Errors
    ///
    /// - [`BusError::NoHandlers`] when no listener covers the event's CRI.
    /// - [`BusError::Closed`] when the bus was closed.
    async fn send_with_ack(&self, event: Event) -> Result<usize, BusError>;

    /// Register a listener. Registration is effective when this returns.
    fn listen(&self, cri: &Cri) -> Subscription;
}

/// In-memory bus over `tokio::sync::broadcast`.
///
/// Every subscription sees the broadcast and keeps what reaches its
/// listener CRI. A listener table tracks which CRIs are covered so that
/// acknowledged sends can fail fast.
pub struct InMemoryEventBus {
    /// `None` once closed.
    sender: RwLock<Option<broadcast::Sender<Event>>>,

    /// Live listeners by CRI.
    listeners: ListenerTable,

    /// Total events sent.
    events_sent: AtomicU64,

    capacity: usize,
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: RwLock::new(Some(sender)),
            listeners: Arc::new(RwLock::new(HashMap::new())),
            events_sent: AtomicU64::new(0),
            capacity,
        }
    }

    /// Listen on a CRI.
    #[must_use]
    pub fn subscribe(&self, cri: &Cri) -> Subscription {
        let receiver = match self.sender.read().as_ref() {
            Some(sender) => sender.subscribe(),
            // Closed bus: hand out a receiver whose sender is already gone.
            None => broadcast::channel(1).0.subscribe(),
        };
        debug!(listener = %cri, "Listener registered");
        Subscription::new(receiver, cri.clone(), self.listeners.clone())
    }

    /// Number of listeners whose CRI an event on `cri` would reach.
    #[must_use]
    pub fn covering_listeners(&self, cri: &Cri) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|(listener, _)| cri.delivers_to(listener))
            .map(|(_, count)| *count)
            .sum()
    }

    /// Live subscriptions registered on exactly `cri`.
    #[must_use]
    pub fn listener_count(&self, cri: &Cri) -> usize {
        self.listeners.read().get(cri).copied().unwrap_or(0)
    }

    /// Live broadcast receivers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .read()
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn events_sent(&self) -> u64 {
        self.events_sent.load(Ordering::Relaxed)
    }

    /// Close the bus. Every subscription's `recv` then returns `None`.
    pub fn close(&self) {
        if self.sender.write().take().is_some() {
            debug!("Event bus closed");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    fn broadcast(&self, event: Event) -> Result<usize, BusError> {
        let sender = self.sender.read().clone().ok_or(BusError::Closed)?;
        self.events_sent.fetch_add(1, Ordering::Relaxed);

        let covering = self.covering_listeners(event.cri());
        let cri = event.cri().clone();
        if covering == 0 {
            return Err(BusError::NoHandlers {
                cri: cri.to_string(),
            });
        }
        match sender.send(event) {
            Ok(_) => {
                debug!(cri = %cri, listeners = covering, "Event sent");
                Ok(covering)
            }
            Err(_) => Err(BusError::NoHandlers {
                cri: cri.to_string(),
            }),
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn send(&self, event: Event) -> usize {
        let cri = event.cri().clone();
        match self.broadcast(event) {
            Ok(count) => count,
            Err(e) => {
                debug!(cri = %cri, error = %e, "Event dropped");
                0
            }
        }
    }

    async fn send_with_ack(&self, event: Event) -> Result<usize, BusError> {
        let cri = event.cri().clone();
        self.broadcast(event).inspect_err(|e| {
            warn!(cri = %cri, error = %e, "Acknowledged send failed");
        })
    }

    fn listen(&self, cri: &Cri) -> Subscription {
        self.subscribe(cri)
    }
}
