//! # Continuum Bus - Dispatch and Stream Collaborators
//!
//! Contracts the core requires from the messaging substrate, plus in-memory
//! implementations for single-node operation and tests.
//!
//! ## Collaborators
//!
//! ```text
//!   EndpointConnectionHandler / ServiceRegistry
//!        │ send / send_with_ack      │ publish          │ append
//!        ▼                           ▼                  ▼
//!   ┌──────────┐              ┌────────────────┐   ┌───────────┐
//!   │ EventBus │              │ StreamPublisher│   │ StreamLog │
//!   └──────────┘              └────────────────┘   └───────────┘
//!        │ listen(cri)               │ listen(cri)
//!        ▼                           ▼
//!   Subscription ──────────── delivers events whose CRI reaches the listener
//! ```
//!
//! ## Routing
//!
//! A listener on CRI `L` receives an event addressed to `E` when
//! `E.delivers_to(L)`: equal CRIs, `L` is the base or versioned resource of
//! `E`, or `L` carries wildcards that match `E`.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod error;
pub mod publisher;
pub mod stream;
pub mod subscriber;

pub use error::{BusError, StreamError};
pub use publisher::{EventBus, InMemoryEventBus};
pub use stream::{InMemoryStreamLog, StreamLog, StreamPublisher};
pub use subscriber::{EventStream, Subscription};

/// Maximum events buffered per listener before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1024);
    }
}
