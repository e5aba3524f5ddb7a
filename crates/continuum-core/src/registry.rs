//! # Service Registry
//!
//! Maps each [`ServiceIdentifier`] to exactly one active handler and hands
//! out proxies for calling services by identifier.
//!
//! ## Single active handler
//!
//! Registration is an atomic insert-if-absent on a sharded map: the vacant
//! entry stays locked while the handler starts, so two concurrent
//! registrations of one identifier cannot both win. The loser gets
//! [`RegistryError::AlreadyRegistered`] and the winner is untouched.
//!
//! ## Replies
//!
//! Every proxy of this registry gets a private reply address
//! `srv://{node}:{proxy}@{reply_resource}`. One reply router, started with
//! the first proxy, listens on `srv://{node}:*@{reply_resource}` and hands
//! replies to the pending request store by correlation id.

use crate::config::RpcConfig;
use crate::domain::descriptor::ServiceDescriptor;
use crate::domain::identifier::ServiceIdentifier;
use crate::error::RegistryError;
use crate::rpc::codec::CodecRegistry;
use crate::rpc::handler::ActiveServiceHandler;
use crate::rpc::pending::{cleanup_task, PendingRequestStore};
use crate::rpc::proxy::{ProxyParts, ServiceProxy};
use crate::rpc::router::ReplyRouter;
use continuum_bus::EventBus;
use continuum_telemetry::metrics::{record, REGISTRY_ACTIVE_SERVICES, REGISTRY_OPERATIONS};
use continuum_types::{encode_scope_segment, Cri, Participant, Scheme};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifier → running service.
pub(crate) type ServiceTable = Arc<DashMap<ServiceIdentifier, RegisteredService>>;

/// A registered descriptor and its running handler.
pub(crate) struct RegisteredService {
    descriptor: Arc<ServiceDescriptor>,
    handler: ActiveServiceHandler,
}

impl RegisteredService {
    pub(crate) fn descriptor(&self) -> &Arc<ServiceDescriptor> {
        &self.descriptor
    }
}

/// Reply router plus the pending-request cleanup loop.
struct ReplyPath {
    router: ReplyRouter,
    cleanup: JoinHandle<()>,
}

impl Drop for ReplyPath {
    fn drop(&mut self) {
        self.cleanup.abort();
    }
}

/// Registry of locally served services.
pub struct ServiceRegistry {
    services: ServiceTable,
    bus: Arc<dyn EventBus>,
    codecs: CodecRegistry,
    config: RpcConfig,
    pending: Arc<PendingRequestStore>,
    reply_path: Mutex<Option<ReplyPath>>,
}

impl ServiceRegistry {
    /// Registry with the default codecs.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, config: RpcConfig) -> Self {
        Self::with_codecs(bus, config, CodecRegistry::with_defaults())
    }

    #[must_use]
    pub fn with_codecs(bus: Arc<dyn EventBus>, config: RpcConfig, codecs: CodecRegistry) -> Self {
        Self {
            services: Arc::new(DashMap::new()),
            bus,
            codecs,
            pending: Arc::new(PendingRequestStore::new(config.request_timeout)),
            config,
            reply_path: Mutex::new(None),
        }
    }

    /// Register a descriptor and start its handler.
    ///
    /// The handler is listening when this returns.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyRegistered`] when a handler for the same
    /// identifier is active. The existing handler is left as is.
    pub async fn register(&self, descriptor: ServiceDescriptor) -> Result<(), RegistryError> {
        let identifier = descriptor.identifier().clone();

        match self.services.entry(identifier.clone()) {
            Entry::Occupied(_) => {
                record(&REGISTRY_OPERATIONS, &["register", "already_registered"]);
                warn!(service = %identifier, "Service already registered");
                Err(RegistryError::AlreadyRegistered(identifier))
            }
            Entry::Vacant(slot) => {
                let descriptor = Arc::new(descriptor);
                let handler = ActiveServiceHandler::start(
                    Arc::clone(&descriptor),
                    Arc::clone(&self.bus),
                    self.codecs.clone(),
                    &self.config.default_content_type,
                );
                slot.insert(RegisteredService { descriptor, handler });

                REGISTRY_ACTIVE_SERVICES.inc();
                record(&REGISTRY_OPERATIONS, &["register", "ok"]);
                info!(service = %identifier, "Service registered");
                Ok(())
            }
        }
    }

    /// Remove and stop the handler for `identifier`.
    ///
    /// No deliveries reach the handler after this returns.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotRegistered`] when no handler is active.
    pub async fn unregister(&self, identifier: &ServiceIdentifier) -> Result<(), RegistryError> {
        let Some((_, service)) = self.services.remove(identifier) else {
            record(&REGISTRY_OPERATIONS, &["unregister", "not_registered"]);
            return Err(RegistryError::NotRegistered(identifier.clone()));
        };

        service.handler.stop().await;
        REGISTRY_ACTIVE_SERVICES.dec();
        record(&REGISTRY_OPERATIONS, &["unregister", "ok"]);
        info!(service = %identifier, "Service unregistered");
        Ok(())
    }

    /// Build a call-through proxy for `identifier`.
    ///
    /// The target does not have to be registered here. `content_type`
    /// defaults to the configured one.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnsupportedContentType`] when no codec handles
    ///   the content type.
    /// - [`RegistryError::ReplyAddress`] when the configured reply resource
    ///   cannot form a CRI.
    pub fn service_proxy(
        &self,
        identifier: &ServiceIdentifier,
        content_type: Option<&str>,
    ) -> Result<ServiceProxy, RegistryError> {
        let codec = self
            .codecs
            .get(content_type.unwrap_or(self.config.default_content_type.as_str()))?;

        let node = encode_scope_segment(&self.config.node_participant);
        let proxy_id = Uuid::new_v4().simple().to_string();
        let reply_to = self.reply_cri(&format!("{node}:{proxy_id}"))?;
        self.ensure_reply_path(&node)?;

        let sender = Participant::new(self.config.node_participant.as_str())
            .to_header()
            .inspect_err(|e| warn!(error = %e, "Cannot encode node participant"))
            .ok();

        debug!(service = %identifier, reply_to = %reply_to, "Service proxy created");
        Ok(ServiceProxy::new(ProxyParts {
            identifier: identifier.clone(),
            bus: Arc::clone(&self.bus),
            pending: Arc::clone(&self.pending),
            codec,
            reply_to,
            sender,
            timeout: self.config.request_timeout,
            local: Arc::clone(&self.services),
        }))
    }

    fn reply_cri(&self, scope: &str) -> Result<Cri, RegistryError> {
        Ok(Cri::create(
            Scheme::Service,
            Some(scope),
            &self.config.reply_resource,
            None,
            None,
        )?)
    }

    fn ensure_reply_path(&self, node: &str) -> Result<(), RegistryError> {
        let mut reply_path = self.reply_path.lock();
        if reply_path.is_some() {
            return Ok(());
        }

        let listener = self.reply_cri(&format!("{node}:*"))?;
        let router = ReplyRouter::start(
            self.bus.as_ref(),
            listener,
            Arc::clone(&self.pending),
            self.codecs.clone(),
        );
        let cleanup = tokio::spawn(cleanup_task(
            Arc::clone(&self.pending),
            self.config.request_timeout,
        ));
        *reply_path = Some(ReplyPath { router, cleanup });
        Ok(())
    }

    #[must_use]
    pub fn is_registered(&self, identifier: &ServiceIdentifier) -> bool {
        self.services.contains_key(identifier)
    }

    /// Registered identifiers, sorted.
    #[must_use]
    pub fn registered_identifiers(&self) -> Vec<ServiceIdentifier> {
        let mut identifiers: Vec<_> = self.services.iter().map(|e| e.key().clone()).collect();
        identifiers.sort();
        identifiers
    }

    #[must_use]
    pub fn descriptor(&self, identifier: &ServiceIdentifier) -> Option<Arc<ServiceDescriptor>> {
        self.services
            .get(identifier)
            .map(|service| Arc::clone(&service.descriptor))
    }

    #[must_use]
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// In-flight proxy calls.
    #[must_use]
    pub fn pending(&self) -> &Arc<PendingRequestStore> {
        &self.pending
    }

    /// Stop every handler and the reply router. Idempotent.
    pub async fn shutdown(&self) {
        let identifiers = self.registered_identifiers();
        for identifier in &identifiers {
            if let Some((_, service)) = self.services.remove(identifier) {
                service.handler.stop().await;
                REGISTRY_ACTIVE_SERVICES.dec();
            }
        }

        let reply_path = self.reply_path.lock().take();
        if let Some(reply_path) = reply_path {
            reply_path.router.stop().await;
        }
        if !identifiers.is_empty() {
            info!(stopped = identifiers.len(), "Service registry shut down");
        }
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.registered_identifiers())
            .field("codecs", &self.codecs)
            .finish_non_exhaustive()
    }
}
