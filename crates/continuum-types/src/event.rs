//! # Event Envelope
//!
//! Protocol-neutral message: a target [`Cri`], ordered string metadata and
//! an opaque payload. Wire adapters translate their frames to and from this
//! shape; everything above them only sees `Event`.

use crate::cri::Cri;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Well-known metadata keys.
pub mod headers {
    /// JSON-encoded [`Participant`](crate::Participant) that sent the event.
    pub const SENDER: &str = "sender";
    /// CRI replies must be sent to.
    pub const REPLY_TO: &str = "replyTo";
    /// Correlates a reply with its request.
    pub const CORRELATION_ID: &str = "correlationId";
    /// Session identifier presented by a client.
    pub const SESSION: &str = "session";
    /// Present on replies that carry a remote exception.
    pub const ERROR: &str = "error";
    /// Media type of the payload.
    pub const CONTENT_TYPE: &str = "contentType";
    /// Stream control marker on streaming replies.
    pub const CONTROL: &str = "control";

    /// `control` value for one element of a streamed result.
    pub const CONTROL_ITEM: &str = "item";
    /// `control` value closing a streamed result.
    pub const CONTROL_COMPLETE: &str = "complete";
}

/// Ordered multimap of string headers.
///
/// Keeps insertion order and allows repeated keys, which is what STOMP and
/// MQTT user properties carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Vec<(String, String)>);

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value stored under `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Replace all values under `key` with a single value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.0.retain(|(k, _)| *k != key);
        self.0.push((key, value.into()));
    }

    /// Add a value under `key`, keeping existing ones.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// Remove every value under `key`, returning the first.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let mut removed = None;
        self.0.retain(|(k, v)| {
            if k != key {
                return true;
            }
            if removed.is_none() {
                removed = Some(v.clone());
            }
            false
        });
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A message addressed to a CRI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    cri: Cri,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    data: Bytes,
}

impl Event {
    #[must_use]
    pub fn new(cri: Cri, data: impl Into<Bytes>) -> Self {
        Self {
            cri,
            metadata: Metadata::new(),
            data: data.into(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Builder-style [`Metadata::insert`].
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key, value);
        self
    }

    #[must_use]
    pub fn cri(&self) -> &Cri {
        &self.cri
    }

    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    #[must_use]
    pub fn into_parts(self) -> (Cri, Metadata, Bytes) {
        (self.cri, self.metadata, self.data)
    }

    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.metadata.get(key)
    }

    #[must_use]
    pub fn reply_to(&self) -> Option<&str> {
        self.header(headers::REPLY_TO)
    }

    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.header(headers::CORRELATION_ID)
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(headers::CONTENT_TYPE)
    }

    /// Whether the event carries a remote exception.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.metadata.contains(headers::ERROR)
    }
}
