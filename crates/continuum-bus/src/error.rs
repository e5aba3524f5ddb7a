//! # Error Types
//!
//! Failures reported by the bus and stream collaborators.

use thiserror::Error;

/// Errors from the RPC dispatch bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// No listener covers the destination.
    #[error("No handlers listening for {cri}")]
    NoHandlers { cri: String },

    /// The bus was closed.
    #[error("Event bus closed")]
    Closed,
}

/// Errors from the live stream and durable log collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// Durable append failed.
    #[error("Append to {cri} failed: {reason}")]
    Append { cri: String, reason: String },

    /// Live publish failed.
    #[error("Publish to {cri} failed: {reason}")]
    Publish { cri: String, reason: String },
}
