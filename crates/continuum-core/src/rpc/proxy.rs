//! Service proxy: the caller side of RPC.
//!
//! A proxy turns `call(function, args)` into a request event on the
//! function's CRI and waits for the correlated reply on the node's reply
//! address. It does not require the target to be registered locally.

use crate::domain::correlation::CorrelationId;
use crate::domain::identifier::ServiceIdentifier;
use crate::error::RpcError;
use crate::registry::ServiceTable;
use crate::rpc::codec::ArgumentCodec;
use crate::rpc::pending::PendingRequestStore;
use crate::rpc::response::RpcResponse;
use continuum_bus::{BusError, EventBus};
use continuum_types::{headers, Cri, Event};
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// Stream of results from a streaming remote function.
pub type RpcStream = BoxStream<'static, Result<Value, RpcError>>;

/// Collaborators a proxy is built from.
pub(crate) struct ProxyParts {
    pub identifier: ServiceIdentifier,
    pub bus: Arc<dyn EventBus>,
    pub pending: Arc<PendingRequestStore>,
    pub codec: Arc<dyn ArgumentCodec>,
    pub reply_to: Cri,
    pub sender: Option<String>,
    pub timeout: Duration,
    pub local: ServiceTable,
}

/// Local call-through handle for one service identifier.
#[derive(Clone)]
pub struct ServiceProxy {
    inner: Arc<ProxyParts>,
}

impl ServiceProxy {
    pub(crate) fn new(parts: ProxyParts) -> Self {
        Self {
            inner: Arc::new(parts),
        }
    }

    #[must_use]
    pub fn identifier(&self) -> &ServiceIdentifier {
        &self.inner.identifier
    }

    /// Address replies to this proxy are sent to.
    #[must_use]
    pub fn reply_to(&self) -> &Cri {
        &self.inner.reply_to
    }

    #[must_use]
    pub fn content_type(&self) -> &str {
        self.inner.codec.content_type()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Invoke `function` and wait for its result.
    ///
    /// A streaming function's items are collected into a JSON array.
    ///
    /// # Errors
    ///
    /// - [`RpcError::UnknownRemoteMethod`] when the function is not known
    ///   locally or no handler is listening.
    /// - [`RpcError::Timeout`] when no reply arrives within the timeout.
    /// - [`RpcError::Remote`] when the function failed.
    pub async fn call(&self, function: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        let (correlation_id, mut replies) = self.dispatch(function, &args).await?;
        let mut items = Vec::new();

        loop {
            let response = match tokio::time::timeout(self.inner.timeout, replies.recv()).await {
                Ok(Some(response)) => response,
                Ok(None) | Err(_) => {
                    self.inner.pending.cancel(&correlation_id);
                    return Err(self.timeout_error(function));
                }
            };
            match response {
                RpcResponse::Value(value) => return Ok(value),
                RpcResponse::Error(exception) => {
                    return Err(exception.into_rpc_error(self.service(), function))
                }
                RpcResponse::StreamItem(value) => items.push(value),
                RpcResponse::StreamEnd => return Ok(Value::Array(items)),
            }
        }
    }

    /// [`call`](Self::call) and deserialize the result.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call), plus [`RpcError::Codec`] when the result
    /// does not fit `T`.
    pub async fn call_typed<T: DeserializeOwned>(&self, function: &str, args: Vec<Value>) -> Result<T, RpcError> {
        let value = self.call(function, args).await?;
        serde_json::from_value(value).map_err(|e| RpcError::Codec(e.to_string()))
    }

    /// Invoke a streaming function.
    ///
    /// The stream ends after the last item, or after yielding one error.
    /// The timeout applies to the gap between replies.
    ///
    /// # Errors
    ///
    /// Dispatch failures are returned before any stream is produced.
    pub async fn call_stream(&self, function: &str, args: Vec<Value>) -> Result<RpcStream, RpcError> {
        let (correlation_id, replies) = self.dispatch(function, &args).await?;
        let replies = tokio_stream::StreamExt::timeout(
            UnboundedReceiverStream::new(replies),
            self.inner.timeout,
        );

        let proxy = self.clone();
        let function = function.to_string();
        let state = (Box::pin(replies), proxy, function, false);

        let stream = stream::unfold(state, move |(mut replies, proxy, function, done)| async move {
            if done {
                return None;
            }
            let item = match replies.next().await {
                Some(Ok(RpcResponse::StreamItem(value) | RpcResponse::Value(value))) => {
                    return Some((Ok(value), (replies, proxy, function, false)));
                }
                Some(Ok(RpcResponse::StreamEnd)) => return None,
                Some(Ok(RpcResponse::Error(exception))) => {
                    Err(exception.into_rpc_error(proxy.service(), &function))
                }
                Some(Err(_)) | None => {
                    proxy.inner.pending.cancel(&correlation_id);
                    Err(proxy.timeout_error(&function))
                }
            };
            Some((item, (replies, proxy, function, true)))
        });
        Ok(stream.boxed())
    }

    /// Send the request and return the reply channel.
    async fn dispatch(
        &self,
        function: &str,
        args: &[Value],
    ) -> Result<(CorrelationId, mpsc::UnboundedReceiver<RpcResponse>), RpcError> {
        let inner = &*self.inner;
        if let Some(entry) = inner.local.get(&inner.identifier) {
            if !entry.descriptor().has_function(function) {
                return Err(self.unknown_method(function));
            }
        }

        let cri = inner
            .identifier
            .function_cri(function)
            .map_err(|e| RpcError::InvalidArguments {
                function: function.to_string(),
                reason: e.to_string(),
            })?;
        let payload = inner.codec.encode_args(args)?;

        let (correlation_id, replies) = inner.pending.register(function, Some(inner.timeout));
        let mut event = Event::new(cri, payload)
            .with_header(headers::CORRELATION_ID, correlation_id.to_string())
            .with_header(headers::REPLY_TO, inner.reply_to.raw())
            .with_header(headers::CONTENT_TYPE, inner.codec.content_type());
        if let Some(sender) = &inner.sender {
            event.metadata_mut().insert(headers::SENDER, sender.as_str());
        }

        debug!(
            correlation_id = %correlation_id,
            service = %inner.identifier,
            function = function,
            "Dispatching RPC request"
        );
        match inner.bus.send_with_ack(event).await {
            Ok(_) => Ok((correlation_id, replies)),
            Err(BusError::NoHandlers { .. }) => {
                inner.pending.cancel(&correlation_id);
                Err(self.unknown_method(function))
            }
            Err(e) => {
                inner.pending.cancel(&correlation_id);
                Err(RpcError::Dispatch(e.to_string()))
            }
        }
    }

    fn service(&self) -> &str {
        self.inner.identifier.cri().raw()
    }

    fn unknown_method(&self, function: &str) -> RpcError {
        RpcError::UnknownRemoteMethod {
            service: self.service().to_string(),
            function: function.to_string(),
        }
    }

    fn timeout_error(&self, function: &str) -> RpcError {
        RpcError::Timeout {
            service: self.service().to_string(),
            function: function.to_string(),
            timeout: self.inner.timeout,
        }
    }
}

impl std::fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("identifier", &self.inner.identifier.cri().raw())
            .field("reply_to", &self.inner.reply_to.raw())
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}
