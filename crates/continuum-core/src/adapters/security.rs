//! Static credential table.
//!
//! Secrets are held as HMAC-SHA256 tags under a per-instance random key and
//! compared in constant time, so a failed login takes the same time whether
//! the identity exists or not.

use crate::error::EndpointError;
use crate::ports::outbound::SecurityService;
use async_trait::async_trait;
use continuum_types::Participant;
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use rand::RngCore;
use sha2::Sha256;
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

struct Credential {
    digest: [u8; 32],
    participant: Participant,
}

/// In-memory [`SecurityService`].
pub struct StaticSecurityService {
    key: [u8; 32],
    credentials: RwLock<HashMap<String, Credential>>,
}

impl Default for StaticSecurityService {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticSecurityService {
    #[must_use]
    pub fn new() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self {
            key,
            credentials: RwLock::new(HashMap::new()),
        }
    }

    /// Add or replace the credential for `participant.id()`.
    pub fn add(&self, participant: Participant, secret: &str) {
        let credential = Credential {
            digest: self.digest(secret),
            participant,
        };
        self.credentials
            .write()
            .insert(credential.participant.id().to_string(), credential);
    }

    /// Builder form of [`add`](Self::add).
    #[must_use]
    pub fn with_credential(self, participant: Participant, secret: &str) -> Self {
        self.add(participant, secret);
        self
    }

    pub fn remove(&self, identity: &str) -> bool {
        self.credentials.write().remove(identity).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.read().is_empty()
    }

    fn digest(&self, secret: &str) -> [u8; 32] {
        // HMAC accepts keys of any length.
        let mut mac = match HmacSha256::new_from_slice(&self.key) {
            Ok(m) => m,
            Err(_) => return [0u8; 32],
        };
        mac.update(secret.as_bytes());
        mac.finalize().into_bytes().into()
    }
}

#[async_trait]
impl SecurityService for StaticSecurityService {
    async fn authenticate(&self, identity: &str, secret: &str) -> Result<Participant, EndpointError> {
        let presented = self.digest(secret);
        let credentials = self.credentials.read();

        // Unknown identities still pay for one comparison.
        let (expected, participant) = match credentials.get(identity) {
            Some(credential) => (credential.digest, Some(&credential.participant)),
            None => ([0u8; 32], None),
        };
        let matches: bool = presented[..].ct_eq(&expected[..]).into();

        match participant {
            Some(participant) if matches => {
                debug!(identity = identity, "Credentials accepted");
                Ok(participant.clone())
            }
            _ => {
                warn!(identity = identity, "Credentials rejected");
                Err(EndpointError::AuthenticationFailed {
                    identity: identity.to_string(),
                })
            }
        }
    }
}
