//! # Stream Collaborators
//!
//! STREAM-scheme events are written twice: appended to a durable log and
//! published to live listeners. The endpoint only reports success when both
//! writes succeed.

use crate::error::StreamError;
use crate::publisher::InMemoryEventBus;
use crate::subscriber::Subscription;
use async_trait::async_trait;
use continuum_types::{Cri, Event};
use dashmap::DashMap;
use tracing::debug;

/// Live pub/sub for stream events.
#[async_trait]
pub trait StreamPublisher: Send + Sync {
    /// Publish to current listeners. Having no listeners is not an error.
    async fn publish(&self, event: Event) -> Result<(), StreamError>;

    /// Listen on a stream CRI, including its path.
    fn listen(&self, cri: &Cri) -> Subscription;
}

/// Durable append-only log per stream CRI.
#[async_trait]
pub trait StreamLog: Send + Sync {
    /// Append an event, returning its offset within the stream.
    async fn append(&self, event: &Event) -> Result<u64, StreamError>;

    /// Read every event at or after `from_offset`.
    async fn read(&self, cri: &Cri, from_offset: u64) -> Result<Vec<Event>, StreamError>;
}

#[async_trait]
impl StreamPublisher for InMemoryEventBus {
    async fn publish(&self, event: Event) -> Result<(), StreamError> {
        if self.is_closed() {
            return Err(StreamError::Publish {
                cri: event.cri().to_string(),
                reason: "event bus closed".to_string(),
            });
        }
        crate::publisher::EventBus::send(self, event).await;
        Ok(())
    }

    fn listen(&self, cri: &Cri) -> Subscription {
        self.subscribe(cri)
    }
}

/// In-memory [`StreamLog`].
#[derive(Default)]
pub struct InMemoryStreamLog {
    streams: DashMap<Cri, Vec<Event>>,
}

impl InMemoryStreamLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events stored for `cri`.
    #[must_use]
    pub fn len(&self, cri: &Cri) -> usize {
        self.streams.get(cri).map_or(0, |events| events.len())
    }

    #[must_use]
    pub fn is_empty(&self, cri: &Cri) -> bool {
        self.len(cri) == 0
    }
}

#[async_trait]
impl StreamLog for InMemoryStreamLog {
    async fn append(&self, event: &Event) -> Result<u64, StreamError> {
        let mut events = self.streams.entry(event.cri().clone()).or_default();
        let offset = events.len() as u64;
        events.push(event.clone());
        debug!(cri = %event.cri(), offset, "Event appended");
        Ok(offset)
    }

    async fn read(&self, cri: &Cri, from_offset: u64) -> Result<Vec<Event>, StreamError> {
        let start = usize::try_from(from_offset).unwrap_or(usize::MAX);
        Ok(self
            .streams
            .get(cri)
            .map(|events| events.iter().skip(start).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn cri(raw: &str) -> Cri {
        Cri::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_append_assigns_sequential_offsets() {
        let log = InMemoryStreamLog::new();
        let orders = cri("stream://acme@orders");

        assert_eq!(log.append(&Event::new(orders.clone(), "a")).await, Ok(0));
        assert_eq!(log.append(&Event::new(orders.clone(), "b")).await, Ok(1));
        assert_eq!(log.len(&orders), 2);

        let tail = log.read(&orders, 1).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].data().as_ref(), b"b");
    }

    #[tokio::test]
    async fn test_read_unknown_stream_is_empty() {
        let log = InMemoryStreamLog::new();
        let events = log.read(&cri("stream://acme@nothing"), 0).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_publish_reaches_path_listener() {
        let bus = InMemoryEventBus::new();
        let mut sub = StreamPublisher::listen(&bus, &cri("stream://tenantA@sensors/site-1/temp"));

        bus.publish(Event::new(cri("stream://tenantA@sensors/site-1/temp"), "21.5"))
            .await
            .unwrap();

        let event = timeout(Duration::from_millis(100), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.data().as_ref(), b"21.5");
    }

    #[tokio::test]
    async fn test_publish_without_listeners_succeeds() {
        let bus = InMemoryEventBus::new();
        assert!(bus
            .publish(Event::new(cri("stream://acme@orders"), "x"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_publish_on_closed_bus_fails() {
        let bus = InMemoryEventBus::new();
        bus.close();
        let result = bus.publish(Event::new(cri("stream://acme@orders"), "x")).await;
        assert!(matches!(result, Err(StreamError::Publish { .. })));
    }
}
