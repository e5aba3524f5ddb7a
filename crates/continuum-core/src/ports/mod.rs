//! Ports for the Continuum core.
//!
//! Outbound collaborators the endpoint depends on. The bus collaborators
//! live in `continuum-bus`.

pub mod outbound;

pub use outbound::{SecurityService, SessionStore};
