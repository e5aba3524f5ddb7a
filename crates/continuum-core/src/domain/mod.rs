//! Domain types for the Continuum core.
//!
//! Naming (identifiers, descriptors), correlation and the session
//! authorization model. Nothing here touches the bus.

pub mod correlation;
pub mod descriptor;
pub mod identifier;
pub mod policy;
pub mod session;

// Re-exports for convenience
pub use correlation::CorrelationId;
pub use descriptor::{
    arg, BoxError, FunctionOutput, Param, ServiceDescriptor, ServiceDescriptorBuilder,
    ServiceFunction, ValueStream,
};
pub use identifier::ServiceIdentifier;
pub use policy::{expand_template, AccessPolicy};
pub use session::{derive_session_id, generate_salt, validate_reply_to, Session};
