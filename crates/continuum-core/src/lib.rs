//! # Continuum Core - Registry, RPC and Connection Endpoints
//!
//! The addressing, authorization and dispatch core of a Continuum node.
//!
//! ## Architecture
//!
//! ```text
//!   wire adapter (STOMP / MQTT / REST)
//!        │ authenticate / send / subscribe
//!        ▼
//!   ┌────────────────────────────┐        ┌──────────────────┐
//!   │ EndpointConnectionHandler  │──────▶ │ SessionStore     │
//!   │  session + policy checks   │        │ SecurityService  │
//!   └────────────────────────────┘        └──────────────────┘
//!        │ srv://            │ stream://
//!        ▼                   ▼
//!   EventBus            StreamLog + StreamPublisher
//!        │
//!        ▼
//!   ┌────────────────────────────┐
//!   │ ServiceRegistry            │  one ActiveServiceHandler per identifier
//!   │  ServiceProxy ◀── replies  │  ReplyRouter → PendingRequestStore
//!   └────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`domain`] - identifiers, descriptors, sessions and access policies
//! - [`registry`] - single-handler service registry and proxy factory
//! - [`rpc`] - request handling, reply routing and argument codecs
//! - [`endpoint`] - per-connection authorization and routing
//! - [`ports`] / [`adapters`] - session storage and credential verification
//! - [`config`] - TOML configuration with environment overrides

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod endpoint;
pub mod error;
pub mod ports;
pub mod registry;
pub mod rpc;

pub use adapters::{sweep_task, InMemorySessionStore, StaticSecurityService};
pub use config::{ContinuumConfig, SERVICE_PROVIDER_ROLE};
pub use domain::{
    arg, AccessPolicy, CorrelationId, Param, ServiceDescriptor, ServiceDescriptorBuilder,
    ServiceFunction, ServiceIdentifier, Session,
};
pub use endpoint::{
    handler::parse_destination, ConnectionState, Credentials, EndpointConnectionHandler,
    EndpointServices, EventSink, SessionHeaders,
};
pub use error::{ConfigError, DescriptorError, EndpointError, RegistryError, RpcError};
pub use ports::{SecurityService, SessionStore};
pub use registry::ServiceRegistry;
pub use rpc::{RemoteException, RpcStream, ServiceProxy};
