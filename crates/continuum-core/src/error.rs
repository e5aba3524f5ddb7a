//! Error types for the Continuum core.
//!
//! Every error is returned through the `Result` of the call that detected
//! it. Protocol adapters translate these into their own wire-level errors.

use crate::domain::identifier::ServiceIdentifier;
use crate::rpc::response::RemoteException;
use continuum_types::CriError;
use std::time::Duration;
use thiserror::Error;

/// Registry protocol violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A handler is already active for this identifier.
    #[error("Service already registered: {0}")]
    AlreadyRegistered(ServiceIdentifier),

    /// No handler is active for this identifier.
    #[error("Service not registered: {0}")]
    NotRegistered(ServiceIdentifier),

    /// No argument codec for the requested content type.
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The configured node reply address is not a valid CRI.
    #[error("Invalid reply address: {0}")]
    ReplyAddress(#[from] CriError),
}

/// Descriptor construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// Two functions share a name. Overloads are not supported.
    #[error("Duplicate function '{function}' on {service}")]
    DuplicateFunction { service: String, function: String },

    #[error("Blank function name on {service}")]
    BlankFunctionName { service: String },

    #[error("Invalid service address: {0}")]
    Identifier(#[from] CriError),
}

/// RPC invocation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The target service has no function with this name.
    #[error("Unknown remote method '{function}' on {service}")]
    UnknownRemoteMethod { service: String, function: String },

    /// The remote function failed.
    #[error("Remote error: {0}")]
    Remote(RemoteException),

    /// No reply arrived in time.
    #[error("No reply from {service} for '{function}' within {timeout:?}")]
    Timeout {
        service: String,
        function: String,
        timeout: Duration,
    },

    /// Arguments or results could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Argument count or shape does not fit the function.
    #[error("Invalid arguments for '{function}': {reason}")]
    InvalidArguments { function: String, reason: String },

    /// The request could not be handed to the bus.
    #[error("Dispatch failed: {0}")]
    Dispatch(String),
}

/// Connection endpoint failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// The session's rules do not allow this send or subscribe.
    #[error("Not authorized to {action} {cri}")]
    NotAuthorized { action: &'static str, cri: String },

    /// Reply-to header fails the scoping rules.
    #[error("Invalid reply-to '{reply_to}': {reason}")]
    InvalidReplyTo { reply_to: String, reason: String },

    /// Presented session id is unknown or expired.
    #[error("Invalid session")]
    InvalidSession,

    /// Identity and secret were rejected.
    #[error("Authentication failed for '{identity}'")]
    AuthenticationFailed { identity: String },

    /// Destination scheme is not routable.
    #[error("Unsupported scheme in '{0}'")]
    UnsupportedScheme(String),

    /// Durable append or live publish of a stream event failed.
    #[error("Storage failure for {cri}")]
    StorageFailure { cri: String },

    /// No handler is listening for the service destination.
    #[error("Service unavailable: {cri}")]
    ServiceUnavailable { cri: String },

    /// Routing was attempted before `authenticate` succeeded.
    #[error("Connection is not authenticated")]
    NotAuthenticated,

    /// Malformed CRI.
    #[error(transparent)]
    Cri(CriError),
}

impl From<CriError> for EndpointError {
    fn from(err: CriError) -> Self {
        match err {
            CriError::InvalidScheme(raw) => Self::UnsupportedScheme(raw),
            other => Self::Cri(other),
        }
    }
}

/// Configuration loading and validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {error}")]
    Io { path: String, error: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid environment override {name}={value}")]
    InvalidOverride { name: String, value: String },

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("invalid session settings: {0}")]
    InvalidSession(String),

    #[error("invalid rpc settings: {0}")]
    InvalidRpc(String),

    #[error("invalid bus settings: {0}")]
    InvalidBus(String),

    #[error("invalid authorization template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },
}
