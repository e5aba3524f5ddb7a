//! Sessions and reply-to scoping.
//!
//! A [`Session`] is created when a connection authenticates and is shared
//! between the connection's send path, its subscription delivery tasks and
//! the touch timer. The allow-list and the touch clock are individually
//! concurrent so none of those paths serialize on a session-wide lock.
//!
//! ## Reply-to scoping
//!
//! A reply-to on an outgoing service request must name a private address of
//! the sender: no wildcards, and a scope that is either absent or the
//! sender's encoded id, optionally followed by `:suffix`.

use crate::domain::policy::AccessPolicy;
use crate::error::EndpointError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use continuum_types::{Cri, Participant};
use dashmap::DashSet;
use rand::RngCore;
use sha2::Sha256;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Derived session id length in bytes, before encoding.
pub const SESSION_ID_LEN: usize = 32;

/// Server-side record of an authenticated connection.
#[derive(Debug)]
pub struct Session {
    id: String,
    participant: Participant,
    policy: AccessPolicy,
    /// Raw CRIs this session may additionally send to.
    allow_list: DashSet<String>,
    created_at_ms: u64,
    last_touched_ms: AtomicU64,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>, participant: Participant, policy: AccessPolicy) -> Self {
        let now = now_ms();
        Self {
            id: id.into(),
            participant,
            policy,
            allow_list: DashSet::new(),
            created_at_ms: now,
            last_touched_ms: AtomicU64::new(now),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    #[must_use]
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    #[must_use]
    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    /// Static send rules, or an address granted at runtime.
    #[must_use]
    pub fn send_allowed(&self, cri: &Cri) -> bool {
        self.policy.allows_send(cri) || self.allow_list.contains(cri.raw())
    }

    /// Static subscribe rules only. Runtime grants never widen subscriptions.
    #[must_use]
    pub fn subscribe_allowed(&self, cri: &Cri) -> bool {
        self.policy.allows_subscribe(cri)
    }

    /// Allow sends to `cri`. Returns `true` if it was not granted before.
    pub fn grant_send(&self, cri: &Cri) -> bool {
        self.allow_list.insert(cri.raw().to_string())
    }

    #[must_use]
    pub fn allow_list_len(&self) -> usize {
        self.allow_list.len()
    }

    /// Reset the idle clock.
    pub fn touch(&self) {
        self.last_touched_ms.fetch_max(now_ms(), Ordering::Relaxed);
    }

    #[must_use]
    pub fn idle_for(&self) -> Duration {
        let last = self.last_touched_ms.load(Ordering::Relaxed);
        Duration::from_millis(now_ms().saturating_sub(last))
    }

    #[must_use]
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Check a reply-to header against the sender's identity.
///
/// # Errors
///
/// [`EndpointError::InvalidReplyTo`] when the address contains a wildcard,
/// does not parse, or is scoped to someone else.
pub fn validate_reply_to(participant: &Participant, raw: &str) -> Result<Cri, EndpointError> {
    let invalid = |reason: &str| EndpointError::InvalidReplyTo {
        reply_to: raw.to_string(),
        reason: reason.to_string(),
    };

    if raw.contains('*') {
        return Err(invalid("wildcards are not allowed"));
    }
    let cri = Cri::parse(raw).map_err(|e| invalid(&e.to_string()))?;

    if let Some(scope) = cri.scope() {
        let own = participant.encoded_id();
        let owned = scope == own
            || scope
                .strip_prefix(own.as_str())
                .is_some_and(|rest| rest.starts_with(':'));
        if !owned {
            return Err(invalid("scope does not belong to the sender"));
        }
    }
    Ok(cri)
}

/// Derive an unguessable session id from the login secret.
///
/// PBKDF2-HMAC-SHA256 over the secret and salt, base64url without padding.
#[must_use]
pub fn derive_session_id(secret: &[u8], salt: &[u8], iterations: u32) -> String {
    let mut key = [0u8; SESSION_ID_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret, salt, iterations, &mut key);
    URL_SAFE_NO_PAD.encode(key)
}

/// Fresh random salt for [`derive_session_id`].
#[must_use]
pub fn generate_salt(len: usize) -> Vec<u8> {
    let mut salt = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
