//! Protocol-neutral connection endpoint.
//!
//! Every wire adapter (framed text, MQTT, HTTP) owns one
//! [`EndpointConnectionHandler`] per connection and forwards decoded frames
//! to it.

pub mod handler;
pub mod sink;

pub use handler::{
    ConnectionState, Credentials, EndpointConnectionHandler, EndpointServices, SessionHeaders,
};
pub use sink::EventSink;
