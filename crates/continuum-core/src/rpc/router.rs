//! Reply router: feeds reply events into the pending request store.

use crate::domain::correlation::CorrelationId;
use crate::rpc::codec::{ArgumentCodec, CodecRegistry, JsonCodec};
use crate::rpc::pending::PendingRequestStore;
use crate::rpc::response::RpcResponse;
use continuum_bus::{EventBus, Subscription};
use continuum_types::{Cri, Event};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Listener on a node's reply addresses.
pub struct ReplyRouter {
    listener: Cri,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReplyRouter {
    /// Listen on `listener` (usually a wildcard over every proxy of the node).
    pub fn start(
        bus: &dyn EventBus,
        listener: Cri,
        pending: Arc<PendingRequestStore>,
        codecs: CodecRegistry,
    ) -> Self {
        let subscription = bus.listen(&listener);
        let task = tokio::spawn(route(subscription, pending, codecs));
        debug!(listener = %listener, "Reply router started");
        Self {
            listener,
            task: Mutex::new(Some(task)),
        }
    }

    #[must_use]
    pub fn listener(&self) -> &Cri {
        &self.listener
    }

    /// Stop routing. Idempotent.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
            debug!(listener = %self.listener, "Reply router stopped");
        }
    }
}

impl Drop for ReplyRouter {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

async fn route(mut subscription: Subscription, pending: Arc<PendingRequestStore>, codecs: CodecRegistry) {
    while let Some(event) = subscription.recv().await {
        dispatch(&event, &pending, &codecs);
    }
}

fn dispatch(event: &Event, pending: &PendingRequestStore, codecs: &CodecRegistry) {
    let Some(correlation_id) = event
        .correlation_id()
        .and_then(|id| CorrelationId::parse(id).ok())
    else {
        warn!(cri = %event.cri(), "Reply without a valid correlation id");
        return;
    };

    let codec: Arc<dyn ArgumentCodec> = event
        .content_type()
        .and_then(|ct| codecs.get(ct).ok())
        .unwrap_or_else(|| Arc::new(JsonCodec));

    match RpcResponse::from_event(event, codec.as_ref()) {
        Ok(response) => {
            pending.deliver(correlation_id, response);
        }
        Err(e) => {
            warn!(correlation_id = %correlation_id, error = %e, "Undecodable reply");
        }
    }
}
