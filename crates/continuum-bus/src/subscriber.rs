//! # Subscriptions
//!
//! The receiving side of the bus. A [`Subscription`] filters the shared
//! broadcast down to the events that reach its listener CRI.

use crate::error::BusError;
use continuum_types::{Cri, Event};
use futures::stream::{BoxStream, Stream, StreamExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tracing::debug;

/// Listener CRI → number of live subscriptions on it.
pub(crate) type ListenerTable = Arc<RwLock<HashMap<Cri, usize>>>;

/// A registration on one listener CRI.
///
/// When dropped, the listener is removed from the bus's listener table.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
    listener: Cri,
    listeners: ListenerTable,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<Event>,
        listener: Cri,
        listeners: ListenerTable,
    ) -> Self {
        *listeners.write().entry(listener.clone()).or_insert(0) += 1;
        Self {
            receiver,
            listener,
            listeners,
        }
    }

    /// Receive the next event that reaches this listener.
    ///
    /// Returns `None` once the bus is closed. Lagged events are skipped.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(listener = %self.listener, lagged = count, "Listener lagged, events dropped");
                    continue;
                }
            };

            if event.cri().delivers_to(&self.listener) {
                return Some(event);
            }
        }
    }

    /// Non-blocking receive.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(event))` - An event was ready and reaches this listener
    /// - `Ok(None)` - Nothing ready
    /// - `Err(BusError::Closed)` - The bus was closed
    pub fn try_recv(&mut self) -> Result<Option<Event>, BusError> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => return Err(BusError::Closed),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if event.cri().delivers_to(&self.listener) {
                return Ok(Some(event));
            }
        }
    }

    /// The CRI this subscription listens on.
    #[must_use]
    pub fn listener(&self) -> &Cri {
        &self.listener
    }

    /// Adapt into a [`Stream`] of events.
    #[must_use]
    pub fn into_stream(self) -> EventStream {
        EventStream::new(self)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut listeners = self.listeners.write();
        if let Some(count) = listeners.get_mut(&self.listener) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                listeners.remove(&self.listener);
            }
        }
        debug!(listener = %self.listener, "Subscription dropped");
    }
}

/// A [`Subscription`] as a `futures::Stream`.
pub struct EventStream {
    listener: Cri,
    inner: BoxStream<'static, Event>,
}

impl EventStream {
    #[must_use]
    pub fn new(subscription: Subscription) -> Self {
        let listener = subscription.listener().clone();
        let inner = futures::stream::unfold(subscription, |mut subscription| async move {
            subscription.recv().await.map(|event| (event, subscription))
        })
        .boxed();
        Self { listener, inner }
    }

    #[must_use]
    pub fn listener(&self) -> &Cri {
        &self.listener
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
