//! Reply shapes and their event encoding.
//!
//! | Response     | Headers                | Payload                 |
//! |--------------|------------------------|-------------------------|
//! | `Value`      | -                      | encoded value           |
//! | `Error`      | `error` = message      | JSON `RemoteException`  |
//! | `StreamItem` | `control` = `item`     | encoded value           |
//! | `StreamEnd`  | `control` = `complete` | empty                   |
//!
//! Every reply also carries `correlationId` and `contentType`.

use crate::domain::correlation::CorrelationId;
use crate::error::RpcError;
use crate::rpc::codec::ArgumentCodec;
use continuum_types::{headers, Cri, Event};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt;

pub const UNKNOWN_REMOTE_METHOD: &str = "UnknownRemoteMethod";
pub const INVALID_ARGUMENTS: &str = "InvalidArguments";

/// Serializable description of a failure on the remote side.
///
/// Carries only strings so any receiver can decode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteException {
    pub name: String,
    pub class: String,
    pub message: String,
    #[serde(default)]
    pub stack: Vec<String>,
}

impl RemoteException {
    /// Capture an error and its `source()` chain.
    ///
    /// `name` is the leading identifier of the error's `Debug` form (the
    /// variant or struct name), `class` is the static type name.
    pub fn from_error<E: Error + ?Sized>(err: &E) -> Self {
        let debug = format!("{err:?}");
        let name: String = debug
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();

        let mut stack = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push(format!("caused by: {cause}"));
            source = cause.source();
        }

        Self {
            name: if name.is_empty() { "Error".to_string() } else { name },
            class: std::any::type_name::<E>().to_string(),
            message: err.to_string(),
            stack,
        }
    }

    #[must_use]
    pub fn unknown_method(service: &str, function: &str) -> Self {
        Self {
            name: UNKNOWN_REMOTE_METHOD.to_string(),
            class: "continuum_core::RpcError".to_string(),
            message: format!("Unknown remote method '{function}' on {service}"),
            stack: Vec::new(),
        }
    }

    #[must_use]
    pub fn invalid_arguments(function: &str, reason: &str) -> Self {
        Self {
            name: INVALID_ARGUMENTS.to_string(),
            class: "continuum_core::RpcError".to_string(),
            message: format!("Invalid arguments for '{function}': {reason}"),
            stack: Vec::new(),
        }
    }

    /// Map to the caller-side error.
    ///
    /// An unknown-method reply becomes [`RpcError::UnknownRemoteMethod`],
    /// everything else [`RpcError::Remote`].
    #[must_use]
    pub fn into_rpc_error(self, service: &str, function: &str) -> RpcError {
        if self.name == UNKNOWN_REMOTE_METHOD {
            RpcError::UnknownRemoteMethod {
                service: service.to_string(),
                function: function.to_string(),
            }
        } else {
            RpcError::Remote(self)
        }
    }
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// One reply on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    Value(Value),
    Error(RemoteException),
    StreamItem(Value),
    StreamEnd,
}

impl RpcResponse {
    /// Whether no further replies follow for this correlation id.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::StreamItem(_))
    }

    /// Build the reply event.
    pub fn to_event(
        &self,
        reply_to: Cri,
        correlation_id: CorrelationId,
        codec: &dyn ArgumentCodec,
    ) -> Result<Event, RpcError> {
        let (data, header) = match self {
            Self::Value(value) => (codec.encode_value(value)?, None),
            Self::Error(exception) => {
                let data = serde_json::to_vec(exception).map_err(|e| RpcError::Codec(e.to_string()))?;
                (data.into(), Some((headers::ERROR, exception.message.clone())))
            }
            Self::StreamItem(value) => (
                codec.encode_value(value)?,
                Some((headers::CONTROL, headers::CONTROL_ITEM.to_string())),
            ),
            Self::StreamEnd => (
                bytes::Bytes::new(),
                Some((headers::CONTROL, headers::CONTROL_COMPLETE.to_string())),
            ),
        };

        let mut event = Event::new(reply_to, data)
            .with_header(headers::CORRELATION_ID, correlation_id.to_string())
            .with_header(headers::CONTENT_TYPE, codec.content_type());
        if let Some((key, value)) = header {
            event.metadata_mut().insert(key, value);
        }
        Ok(event)
    }

    /// Decode a reply event.
    pub fn from_event(event: &Event, codec: &dyn ArgumentCodec) -> Result<Self, RpcError> {
        if let Some(message) = event.header(headers::ERROR) {
            let exception = serde_json::from_slice(event.data()).unwrap_or_else(|_| RemoteException {
                name: "RemoteError".to_string(),
                class: String::new(),
                message: message.to_string(),
                stack: Vec::new(),
            });
            return Ok(Self::Error(exception));
        }

        match event.header(headers::CONTROL) {
            Some(headers::CONTROL_COMPLETE) => Ok(Self::StreamEnd),
            Some(headers::CONTROL_ITEM) => Ok(Self::StreamItem(codec.decode_value(event.data())?)),
            _ => Ok(Self::Value(codec.decode_value(event.data())?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::codec::JsonCodec;
    use serde_json::json;

    #[derive(Debug, thiserror::Error)]
    enum LedgerError {
        #[error("insufficient funds")]
        InsufficientFunds(#[source] std::io::Error),
    }

    fn reply_to() -> Cri {
        Cri::parse("srv://alice:1@continuum.rpc.reply").unwrap()
    }

    #[test]
    fn test_exception_from_error_chain() {
        let err = LedgerError::InsufficientFunds(std::io::Error::new(
            std::io::ErrorKind::Other,
            "balance 0",
        ));
        let exception = RemoteException::from_error(&err);
        assert_eq!(exception.name, "InsufficientFunds");
        assert!(exception.class.ends_with("LedgerError"));
        assert_eq!(exception.message, "insufficient funds");
        assert_eq!(exception.stack, vec!["caused by: balance 0".to_string()]);
    }

    #[test]
    fn test_unknown_method_maps_to_rpc_error() {
        let err = RemoteException::unknown_method("srv://Echo#1", "shout").into_rpc_error("srv://Echo#1", "shout");
        assert!(matches!(err, RpcError::UnknownRemoteMethod { function, .. } if function == "shout"));

        let err = RemoteException::invalid_arguments("echo", "expected 1").into_rpc_error("srv://Echo#1", "echo");
        assert!(matches!(err, RpcError::Remote(e) if e.name == INVALID_ARGUMENTS));
    }

    #[test]
    fn test_value_reply_event() {
        let id = CorrelationId::new();
        let event = RpcResponse::Value(json!("hi"))
            .to_event(reply_to(), id, &JsonCodec)
            .unwrap();
        assert_eq!(event.cri(), &reply_to());
        assert_eq!(event.correlation_id(), Some(id.to_string().as_str()));
        assert!(!event.is_error());
        assert_eq!(RpcResponse::from_event(&event, &JsonCodec).unwrap(), RpcResponse::Value(json!("hi")));
    }

    #[test]
    fn test_error_reply_event() {
        let exception = RemoteException::unknown_method("srv://Echo#1", "shout");
        let event = RpcResponse::Error(exception.clone())
            .to_event(reply_to(), CorrelationId::new(), &JsonCodec)
            .unwrap();
        assert!(event.is_error());
        assert_eq!(event.header(headers::ERROR), Some(exception.message.as_str()));
        assert_eq!(
            RpcResponse::from_event(&event, &JsonCodec).unwrap(),
            RpcResponse::Error(exception)
        );
    }

    #[test]
    fn test_error_reply_with_opaque_payload() {
        let event = Event::new(reply_to(), "not json").with_header(headers::ERROR, "boom");
        let RpcResponse::Error(exception) = RpcResponse::from_event(&event, &JsonCodec).unwrap() else {
            panic!("expected error");
        };
        assert_eq!(exception.message, "boom");
    }

    #[test]
    fn test_stream_reply_events() {
        let id = CorrelationId::new();
        let item = RpcResponse::StreamItem(json!(1)).to_event(reply_to(), id, &JsonCodec).unwrap();
        let end = RpcResponse::StreamEnd.to_event(reply_to(), id, &JsonCodec).unwrap();

        assert_eq!(item.header(headers::CONTROL), Some(headers::CONTROL_ITEM));
        assert_eq!(RpcResponse::from_event(&item, &JsonCodec).unwrap(), RpcResponse::StreamItem(json!(1)));
        assert_eq!(RpcResponse::from_event(&end, &JsonCodec).unwrap(), RpcResponse::StreamEnd);
        assert!(end.data().is_empty());
    }

    #[test]
    fn test_terminal_responses() {
        assert!(RpcResponse::Value(Value::Null).is_terminal());
        assert!(RpcResponse::StreamEnd.is_terminal());
        assert!(!RpcResponse::StreamItem(Value::Null).is_terminal());
    }
}
