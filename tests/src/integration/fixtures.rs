//! Single-node wiring used by the integration flows.

use continuum_bus::{InMemoryEventBus, InMemoryStreamLog};
use continuum_core::config::SERVICE_PROVIDER_ROLE;
use continuum_core::{
    ContinuumConfig, Credentials, EndpointConnectionHandler, EndpointServices, EventSink,
    InMemorySessionStore, ServiceRegistry, StaticSecurityService,
};
use continuum_types::{Cri, Event, Participant};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Identity and secret of every fixture participant.
pub const ALICE: (&str, &str) = ("alice", "alice-secret");
pub const BOB: (&str, &str) = ("bob", "bob-secret");
pub const MALLORY: (&str, &str) = ("mallory", "mallory-secret");
pub const PROVIDER: (&str, &str) = ("billing-svc", "provider-secret");

/// A node: bus, stream log, sessions, registry and the endpoint services
/// every connection shares.
pub struct TestNode {
    pub bus: Arc<InMemoryEventBus>,
    pub log: Arc<InMemoryStreamLog>,
    pub sessions: Arc<InMemorySessionStore>,
    pub registry: ServiceRegistry,
    pub services: EndpointServices,
}

impl TestNode {
    pub fn new() -> Self {
        Self::with_request_timeout(Duration::from_secs(2))
    }

    pub fn with_request_timeout(timeout: Duration) -> Self {
        let mut config = ContinuumConfig::default();
        config.session.kdf_iterations = 1_000;
        config.rpc.request_timeout = timeout;

        let security = StaticSecurityService::new()
            .with_credential(Participant::new(ALICE.0).with_tenant("acme"), ALICE.1)
            .with_credential(Participant::new(BOB.0).with_tenant("acme"), BOB.1)
            .with_credential(Participant::new(MALLORY.0).with_tenant("globex"), MALLORY.1)
            .with_credential(
                Participant::new(PROVIDER.0).with_role(SERVICE_PROVIDER_ROLE),
                PROVIDER.1,
            );

        let bus = Arc::new(InMemoryEventBus::new());
        let log = Arc::new(InMemoryStreamLog::new());
        let sessions = Arc::new(InMemorySessionStore::new(config.session.timeout));
        let registry = ServiceRegistry::new(bus.clone(), config.rpc.clone());
        let services = EndpointServices::new(
            sessions.clone(),
            Arc::new(security),
            bus.clone(),
            bus.clone(),
            log.clone(),
            Arc::new(config),
        );

        Self {
            bus,
            log,
            sessions,
            registry,
            services,
        }
    }

    /// A logged-in connection.
    pub async fn connect(&self, (identity, secret): (&str, &str)) -> anyhow::Result<EndpointConnectionHandler> {
        let mut handler = EndpointConnectionHandler::new(self.services.clone());
        handler
            .authenticate(Credentials::Login {
                identity: identity.to_string(),
                secret: secret.to_string(),
            })
            .await?;
        Ok(handler)
    }
}

impl Default for TestNode {
    fn default() -> Self {
        Self::new()
    }
}

pub fn cri(raw: &str) -> Cri {
    Cri::parse(raw).expect("fixture CRI must parse")
}

pub fn channel_sink() -> (Arc<dyn EventSink>, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    (Arc::new(tx), rx)
}

/// Next event, or `None` after a short wait.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Option<Event> {
    tokio::time::timeout(Duration::from_millis(500), rx.recv())
        .await
        .ok()
        .flatten()
}
