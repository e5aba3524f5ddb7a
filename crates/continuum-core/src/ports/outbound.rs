//! Outbound ports: session storage and credential verification.

use crate::domain::session::Session;
use crate::error::EndpointError;
use async_trait::async_trait;
use continuum_types::Participant;
use std::sync::Arc;
use std::time::Duration;

/// Owner of live session records.
///
/// Lookups never return an expired session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a new session and return the shared handle.
    async fn create(&self, session: Session) -> Arc<Session>;

    /// Find a live session by id.
    async fn find(&self, session_id: &str) -> Option<Arc<Session>>;

    /// Reset the session's idle clock. Returns `false` if it is gone.
    async fn touch(&self, session_id: &str) -> bool;

    /// Drop a session. Returns the removed record, if any.
    async fn remove(&self, session_id: &str) -> Option<Arc<Session>>;

    /// Drop sessions idle for longer than `timeout`. Returns how many.
    async fn sweep_expired(&self, timeout: Duration) -> usize;
}

/// Credential verification (IAM).
#[async_trait]
pub trait SecurityService: Send + Sync {
    /// Verify `identity`/`secret` and resolve the participant.
    ///
    /// # Errors
    ///
    /// [`EndpointError::AuthenticationFailed`] when the credentials are rejected.
    async fn authenticate(&self, identity: &str, secret: &str) -> Result<Participant, EndpointError>;
}
