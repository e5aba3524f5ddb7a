//! Argument codecs.
//!
//! A codec turns positional arguments into request payload bytes and
//! function results into reply payload bytes. The `contentType` header
//! selects the codec on both sides.

use crate::error::{RegistryError, RpcError};
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Payload encoding for RPC arguments and results.
pub trait ArgumentCodec: Send + Sync {
    /// Content type this codec handles.
    fn content_type(&self) -> &str;

    fn encode_args(&self, args: &[Value]) -> Result<Bytes, RpcError>;

    fn decode_args(&self, payload: &[u8]) -> Result<Vec<Value>, RpcError>;

    fn encode_value(&self, value: &Value) -> Result<Bytes, RpcError>;

    fn decode_value(&self, payload: &[u8]) -> Result<Value, RpcError>;
}

/// Arguments as a JSON array, results as plain JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ArgumentCodec for JsonCodec {
    fn content_type(&self) -> &str {
        JSON_CONTENT_TYPE
    }

    fn encode_args(&self, args: &[Value]) -> Result<Bytes, RpcError> {
        serde_json::to_vec(args)
            .map(Bytes::from)
            .map_err(|e| RpcError::Codec(e.to_string()))
    }

    fn decode_args(&self, payload: &[u8]) -> Result<Vec<Value>, RpcError> {
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_slice(payload).map_err(|e| RpcError::Codec(e.to_string()))? {
            Value::Array(args) => Ok(args),
            other => Err(RpcError::Codec(format!(
                "expected a JSON array of arguments, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn encode_value(&self, value: &Value) -> Result<Bytes, RpcError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| RpcError::Codec(e.to_string()))
    }

    fn decode_value(&self, payload: &[u8]) -> Result<Value, RpcError> {
        if payload.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(payload).map_err(|e| RpcError::Codec(e.to_string()))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Codecs by content type.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn ArgumentCodec>>,
}

impl CodecRegistry {
    /// Registry with [`JsonCodec`].
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(JsonCodec));
        registry
    }

    /// Add or replace the codec for its content type.
    pub fn register(&mut self, codec: Arc<dyn ArgumentCodec>) {
        self.codecs.insert(codec.content_type().to_string(), codec);
    }

    /// # Errors
    ///
    /// [`RegistryError::UnsupportedContentType`] when no codec is registered.
    pub fn get(&self, content_type: &str) -> Result<Arc<dyn ArgumentCodec>, RegistryError> {
        self.codecs
            .get(content_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnsupportedContentType(content_type.to_string()))
    }

    pub fn content_types(&self) -> impl Iterator<Item = &str> {
        self.codecs.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("content_types", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}
