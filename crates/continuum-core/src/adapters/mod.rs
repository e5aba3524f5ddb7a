//! Adapters for the Continuum core.
//!
//! In-memory implementations of the outbound ports, for single-node
//! deployments and tests.

pub mod security;
pub mod session_store;

pub use security::StaticSecurityService;
pub use session_store::{sweep_task, InMemorySessionStore};
