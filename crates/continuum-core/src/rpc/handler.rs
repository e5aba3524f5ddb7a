//! Active service handler: the server side of RPC.
//!
//! One handler per registered identifier. It listens on the identifier's
//! base resource, runs each request in its own task and sends the replies
//! to the request's reply-to address.

use crate::domain::correlation::CorrelationId;
use crate::domain::descriptor::{FunctionOutput, ServiceDescriptor};
use crate::domain::identifier::ServiceIdentifier;
use crate::rpc::codec::{ArgumentCodec, CodecRegistry, JsonCodec};
use crate::rpc::response::{RemoteException, RpcResponse};
use continuum_bus::{EventBus, Subscription};
use continuum_telemetry::metrics::{record, RPC_INVOCATIONS, RPC_INVOCATION_DURATION};
use continuum_types::{headers, Cri, Event, Participant};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

/// Everything a request task needs.
struct HandlerContext {
    descriptor: Arc<ServiceDescriptor>,
    bus: Arc<dyn EventBus>,
    codecs: CodecRegistry,
    default_content_type: String,
}

/// Running listener for one registered service.
pub struct ActiveServiceHandler {
    identifier: ServiceIdentifier,
    listener: Cri,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ActiveServiceHandler {
    /// Subscribe and start serving.
    ///
    /// The bus registration is in place when this returns.
    pub fn start(
        descriptor: Arc<ServiceDescriptor>,
        bus: Arc<dyn EventBus>,
        codecs: CodecRegistry,
        default_content_type: &str,
    ) -> Self {
        let identifier = descriptor.identifier().clone();
        let listener = identifier.cri().base_resource();
        let subscription = bus.listen(&listener);

        let context = Arc::new(HandlerContext {
            descriptor,
            bus,
            codecs,
            default_content_type: default_content_type.to_string(),
        });
        let task = tokio::spawn(serve(subscription, context));

        debug!(service = %identifier, listener = %listener, "Service handler started");
        Self {
            identifier,
            listener,
            task: Mutex::new(Some(task)),
        }
    }

    #[must_use]
    pub fn identifier(&self) -> &ServiceIdentifier {
        &self.identifier
    }

    #[must_use]
    pub fn listener(&self) -> &Cri {
        &self.listener
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop listening and abort in-flight requests.
    ///
    /// The bus subscription is gone when this returns. Idempotent.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
            // Cancellation is the expected outcome.
            let _ = task.await;
            debug!(service = %self.identifier, "Service handler stopped");
        }
    }
}

impl Drop for ActiveServiceHandler {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

async fn serve(mut subscription: Subscription, context: Arc<HandlerContext>) {
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => {
                    in_flight.spawn(handle_request(Arc::clone(&context), event));
                }
                None => break,
            },
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }
    while in_flight.join_next().await.is_some() {}
}

/// Where and how to answer one request.
struct ReplyRoute {
    reply_to: Cri,
    correlation_id: CorrelationId,
    codec: Arc<dyn ArgumentCodec>,
}

async fn handle_request(context: Arc<HandlerContext>, event: Event) {
    let identifier = context.descriptor.identifier();
    let cri = event.cri();
    if !identifier.addresses(cri) {
        return;
    }
    let Some(function_name) = cri.last_path_segment().map(str::to_string) else {
        debug!(service = %identifier, cri = %cri, "Ignoring event without a function path");
        return;
    };

    let route = reply_route(&context, &event);
    let codec = match context
        .codecs
        .get(event.content_type().unwrap_or(context.default_content_type.as_str()))
    {
        Ok(codec) => codec,
        Err(e) => {
            warn!(service = %identifier, error = %e, "Cannot decode request");
            reply(&context, route.as_ref(), RpcResponse::Error(RemoteException::from_error(&e))).await;
            return;
        }
    };

    let Some(function) = context.descriptor.function(&function_name) else {
        warn!(service = %identifier, function = %function_name, "Unknown remote method");
        record(&RPC_INVOCATIONS, &["unknown_method"]);
        let exception = RemoteException::unknown_method(&identifier.to_string(), &function_name);
        reply(&context, route.as_ref(), RpcResponse::Error(exception)).await;
        return;
    };

    let caller = event
        .header(headers::SENDER)
        .and_then(|header| Participant::from_header(header).ok());
    let resolved = codec
        .decode_args(event.data())
        .map_err(|e| e.to_string())
        .and_then(|payload| {
            let count = payload.len();
            function
                .resolve_args(payload, caller.as_ref())
                .ok_or_else(|| format!("expected {} arguments, got {count}", function.arity()))
        });
    let args = match resolved {
        Ok(args) => args,
        Err(reason) => {
            record(&RPC_INVOCATIONS, &["invalid_arguments"]);
            let exception = RemoteException::invalid_arguments(&function_name, &reason);
            reply(&context, route.as_ref(), RpcResponse::Error(exception)).await;
            return;
        }
    };

    debug!(service = %identifier, function = %function_name, "Invoking service function");
    let _timer = continuum_telemetry::time_histogram!(RPC_INVOCATION_DURATION);
    match function.invoke(args).await {
        Ok(FunctionOutput::Value(value)) => {
            record(&RPC_INVOCATIONS, &["ok"]);
            reply(&context, route.as_ref(), RpcResponse::Value(value)).await;
        }
        Ok(FunctionOutput::Stream(mut stream)) => {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(value) => reply(&context, route.as_ref(), RpcResponse::StreamItem(value)).await,
                    Err(e) => {
                        record(&RPC_INVOCATIONS, &["error"]);
                        let exception = RemoteException::from_error(&*e);
                        reply(&context, route.as_ref(), RpcResponse::Error(exception)).await;
                        return;
                    }
                }
            }
            record(&RPC_INVOCATIONS, &["ok"]);
            reply(&context, route.as_ref(), RpcResponse::StreamEnd).await;
        }
        Err(e) => {
            debug!(service = %identifier, function = %function_name, error = %e, "Service function failed");
            record(&RPC_INVOCATIONS, &["error"]);
            reply(&context, route.as_ref(), RpcResponse::Error(RemoteException::from_error(&*e))).await;
        }
    }
}

/// Reply address, correlation id and codec of a request.
///
/// `None` for fire-and-forget requests, which are still executed.
fn reply_route(context: &HandlerContext, event: &Event) -> Option<ReplyRoute> {
    let reply_to = event.reply_to()?;
    let reply_to = Cri::parse(reply_to)
        .inspect_err(|e| warn!(reply_to = reply_to, error = %e, "Unroutable reply-to"))
        .ok()?;
    let correlation_id = event
        .correlation_id()
        .and_then(|id| CorrelationId::parse(id).ok())
        .or_else(|| {
            warn!(reply_to = %reply_to, "Request without a valid correlation id");
            None
        })?;
    let codec = event
        .content_type()
        .and_then(|ct| context.codecs.get(ct).ok())
        .unwrap_or_else(|| Arc::new(JsonCodec));

    Some(ReplyRoute {
        reply_to,
        correlation_id,
        codec,
    })
}

async fn reply(context: &HandlerContext, route: Option<&ReplyRoute>, response: RpcResponse) {
    let Some(route) = route else {
        return;
    };
    match response.to_event(route.reply_to.clone(), route.correlation_id, route.codec.as_ref()) {
        Ok(event) => {
            if context.bus.send(event).await == 0 {
                debug!(
                    correlation_id = %route.correlation_id,
                    reply_to = %route.reply_to,
                    "Reply had no listener"
                );
            }
        }
        Err(e) => warn!(correlation_id = %route.correlation_id, error = %e, "Failed to encode reply"),
    }
}
