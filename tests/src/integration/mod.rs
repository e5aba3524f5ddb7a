//! Cross-crate integration flows.

pub mod fixtures;

mod endpoint_security;
mod registry_concurrency;
mod rpc_roundtrip;
