//! # Participant
//!
//! The authenticated identity behind a session. Participants travel with
//! events in the `sender` header as JSON and appear inside CRIs (reply-to
//! scopes, allow-list templates) in percent-encoded form.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Characters that cannot appear verbatim inside a CRI scope.
const CRI_RESERVED: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'%')
    .add(b':')
    .add(b'@')
    .add(b'/')
    .add(b'#')
    .add(b'*');

/// An authenticated actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    roles: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,
}

impl Participant {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tenant_id: None,
            roles: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Identifier safe to embed in a CRI scope.
    #[must_use]
    pub fn encoded_id(&self) -> String {
        encode_scope_segment(&self.id)
    }

    /// Tenant identifier safe to embed in a CRI scope.
    #[must_use]
    pub fn encoded_tenant_id(&self) -> Option<String> {
        self.tenant_id.as_deref().map(encode_scope_segment)
    }

    /// JSON form carried in the `sender` header.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn to_header(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse the `sender` header.
    ///
    /// # Errors
    ///
    /// Fails when the header is not a JSON participant.
    pub fn from_header(header: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(header)
    }
}

/// Percent-encode a value for use inside a CRI scope.
#[must_use]
pub fn encode_scope_segment(value: &str) -> String {
    utf8_percent_encode(value, CRI_RESERVED).to_string()
}

/// Reverse of [`encode_scope_segment`].
#[must_use]
pub fn decode_scope_segment(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}
