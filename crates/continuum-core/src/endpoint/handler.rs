//! # Connection Handler
//!
//! One [`EndpointConnectionHandler`] per client connection. It owns the
//! connection's session and subscriptions and applies authorization to every
//! send and subscribe before anything reaches the bus.
//!
//! ## Routing
//!
//! | Scheme | Send | Subscribe |
//! |--------|------|-----------|
//! | `srv://` | acknowledged bus send, reply-to checked | base resource, reply-to auto-granted |
//! | `stream://` | durable append and live publish | exact CRI |
//!
//! ## Auto-grant
//!
//! When a service request reaches a provider's subscription, the request's
//! reply-to is added to the provider's allow-list so the provider can answer
//! a caller-private address it could not otherwise send to.

use crate::config::ContinuumConfig;
use crate::domain::policy::AccessPolicy;
use crate::domain::session::{derive_session_id, generate_salt, validate_reply_to, Session};
use crate::endpoint::sink::EventSink;
use crate::error::EndpointError;
use crate::ports::outbound::{SecurityService, SessionStore};
use continuum_bus::{EventBus, StreamLog, StreamPublisher, Subscription};
use continuum_telemetry::metrics::{
    record, GaugeGuard, AUTHORIZATION_DENIALS, ENDPOINT_SENDS, ENDPOINT_SUBSCRIPTIONS_ACTIVE,
    SESSIONS_CREATED,
};
use continuum_types::{headers, Cri, Event, Metadata, Scheme};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What a client presents to `authenticate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Resume an existing session.
    SessionId(String),
    /// Log in and create a new session.
    Login { identity: String, secret: String },
}

/// Headers returned to the client after authentication.
///
/// Carries the session id and the sender header the endpoint stamps on
/// every outgoing event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHeaders(Metadata);

impl SessionHeaders {
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.0.get(headers::SESSION)
    }

    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.0.get(headers::SENDER)
    }

    #[must_use]
    pub fn into_metadata(self) -> Metadata {
        self.0
    }
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Authenticated,
    Closed,
}

/// Collaborators shared by every connection on a node.
#[derive(Clone)]
pub struct EndpointServices {
    pub session_store: Arc<dyn SessionStore>,
    pub security: Arc<dyn SecurityService>,
    pub bus: Arc<dyn EventBus>,
    pub streams: Arc<dyn StreamPublisher>,
    pub stream_log: Arc<dyn StreamLog>,
    pub config: Arc<ContinuumConfig>,
}

impl EndpointServices {
    #[must_use]
    pub fn new(
        session_store: Arc<dyn SessionStore>,
        security: Arc<dyn SecurityService>,
        bus: Arc<dyn EventBus>,
        streams: Arc<dyn StreamPublisher>,
        stream_log: Arc<dyn StreamLog>,
        config: Arc<ContinuumConfig>,
    ) -> Self {
        Self {
            session_store,
            security,
            bus,
            streams,
            stream_log,
            config,
        }
    }
}

/// A delivery task plus the gate that stops it.
///
/// The task delivers only while holding the gate with the flag set, so once
/// `cancel` returns no further event reaches the sink.
struct ActiveSubscription {
    cri: Cri,
    gate: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
    _gauge: GaugeGuard,
}

impl ActiveSubscription {
    fn cancel(&self) {
        *self.gate.lock() = false;
        self.task.abort();
    }
}

/// Per-connection state machine between a wire adapter and the node.
pub struct EndpointConnectionHandler {
    services: EndpointServices,
    session: Option<Arc<Session>>,
    sender_header: Option<String>,
    state: ConnectionState,
    subscriptions: HashMap<String, ActiveSubscription>,
    /// Replaced subscriptions whose tasks still need cancelling at shutdown.
    orphans: Vec<ActiveSubscription>,
    touch_timer: Option<JoinHandle<()>>,
}

impl EndpointConnectionHandler {
    #[must_use]
    pub fn new(services: EndpointServices) -> Self {
        Self {
            services,
            session: None,
            sender_header: None,
            state: ConnectionState::Unauthenticated,
            subscriptions: HashMap::new(),
            orphans: Vec::new(),
            touch_timer: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Resume a session or log in.
    ///
    /// On success the session's idle clock is kept fresh for as long as the
    /// connection lives.
    ///
    /// # Errors
    ///
    /// - [`EndpointError::InvalidSession`] for an unknown or expired session id
    /// - [`EndpointError::AuthenticationFailed`] for rejected credentials
    pub async fn authenticate(
        &mut self,
        credentials: Credentials,
    ) -> Result<SessionHeaders, EndpointError> {
        if self.state == ConnectionState::Closed {
            return Err(EndpointError::InvalidSession);
        }

        let session = match credentials {
            Credentials::SessionId(id) => self
                .services
                .session_store
                .find(&id)
                .await
                .ok_or(EndpointError::InvalidSession)?,
            Credentials::Login { identity, secret } => self.login(&identity, &secret).await?,
        };

        let sender = session.participant().to_header().map_err(|e| {
            error!(participant = %session.participant().id(), error = %e, "Failed to encode sender header");
            EndpointError::AuthenticationFailed {
                identity: session.participant().id().to_string(),
            }
        })?;

        let mut metadata = Metadata::new();
        metadata.insert(headers::SESSION, session.id());
        metadata.insert(headers::SENDER, sender.clone());

        info!(
            session = %session.id(),
            participant = %session.participant().id(),
            "Connection authenticated"
        );

        self.start_touch_timer(session.id());
        self.session = Some(session);
        self.sender_header = Some(sender);
        self.state = ConnectionState::Authenticated;

        Ok(SessionHeaders(metadata))
    }

    async fn login(&self, identity: &str, secret: &str) -> Result<Arc<Session>, EndpointError> {
        let participant = self
            .services
            .security
            .authenticate(identity, secret)
            .await
            .inspect_err(|_| warn!(identity = %identity, "Login rejected"))?;

        let config = &self.services.config;
        let policy = AccessPolicy::for_participant(&config.authorization, &participant);
        let salt = generate_salt(config.session.salt_len);
        let id = derive_session_id(secret.as_bytes(), &salt, config.session.kdf_iterations);

        let session = self
            .services
            .session_store
            .create(Session::new(id, participant, policy))
            .await;
        SESSIONS_CREATED.inc();
        Ok(session)
    }

    fn start_touch_timer(&mut self, session_id: &str) {
        if let Some(previous) = self.touch_timer.take() {
            previous.abort();
        }

        let store = self.services.session_store.clone();
        let session_id = session_id.to_string();
        let period = self.services.config.session.touch_interval();

        self.touch_timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !store.touch(&session_id).await {
                    debug!(session = %session_id, "Session gone, touch timer stopped");
                    break;
                }
            }
        }));
    }

    fn require_session(&self) -> Result<&Arc<Session>, EndpointError> {
        match (&self.session, self.state) {
            (Some(session), ConnectionState::Authenticated) => Ok(session),
            _ => {
                error!(state = ?self.state, "Routing attempted without an authenticated session");
                Err(EndpointError::NotAuthenticated)
            }
        }
    }

    /// Route an event from the client.
    ///
    /// The sender header is always replaced with the session's participant.
    ///
    /// # Errors
    ///
    /// - [`EndpointError::NotAuthenticated`] before `authenticate`
    /// - [`EndpointError::NotAuthorized`] when the send rules deny the CRI
    /// - [`EndpointError::InvalidReplyTo`] for a reply-to the sender does not own
    /// - [`EndpointError::ServiceUnavailable`] when no service handler listens
    /// - [`EndpointError::StorageFailure`] when either stream write fails
    pub async fn send(&self, mut event: Event) -> Result<(), EndpointError> {
        let session = self.require_session()?;
        let cri = event.cri().clone();
        let scheme = cri.scheme().as_str();

        if !session.send_allowed(&cri) {
            record(&AUTHORIZATION_DENIALS, &["send"]);
            record(&ENDPOINT_SENDS, &[scheme, "denied"]);
            warn!(
                participant = %session.participant().id(),
                cri = %cri,
                "Send denied"
            );
            return Err(EndpointError::NotAuthorized {
                action: "send",
                cri: cri.to_string(),
            });
        }

        if let Some(sender) = &self.sender_header {
            event.metadata_mut().insert(headers::SENDER, sender.clone());
        }

        let result = match cri.scheme() {
            Scheme::Service => self.send_service(session, event).await,
            Scheme::Stream => self.send_stream(event).await,
        };

        let outcome = match &result {
            Ok(()) => "ok",
            Err(_) => "failed",
        };
        record(&ENDPOINT_SENDS, &[scheme, outcome]);
        result
    }

    async fn send_service(&self, session: &Session, event: Event) -> Result<(), EndpointError> {
        if let Some(reply_to) = event.reply_to() {
            validate_reply_to(session.participant(), reply_to).inspect_err(|e| {
                record(&AUTHORIZATION_DENIALS, &["reply_to"]);
                warn!(participant = %session.participant().id(), error = %e, "Reply-to rejected");
            })?;
        }

        let cri = event.cri().to_string();
        match self.services.bus.send_with_ack(event).await {
            Ok(listeners) => {
                debug!(cri = %cri, listeners, "Service event dispatched");
                Ok(())
            }
            Err(e) => {
                warn!(cri = %cri, error = %e, "Service event not delivered");
                Err(EndpointError::ServiceUnavailable { cri })
            }
        }
    }

    async fn send_stream(&self, event: Event) -> Result<(), EndpointError> {
        let cri = event.cri().to_string();
        let append = self.services.stream_log.append(&event);
        let publish = self.services.streams.publish(event.clone());

        match tokio::try_join!(append, publish) {
            Ok((offset, ())) => {
                debug!(cri = %cri, offset, "Stream event written");
                Ok(())
            }
            Err(e) => {
                warn!(cri = %cri, error = %e, "Stream write failed");
                Err(EndpointError::StorageFailure { cri })
            }
        }
    }

    /// Start delivering events for `cri` to `sink` under `subscription_id`.
    ///
    /// Reusing an id replaces the earlier subscription.
    ///
    /// # Errors
    ///
    /// - [`EndpointError::NotAuthenticated`] before `authenticate`
    /// - [`EndpointError::NotAuthorized`] when the subscribe rules deny the CRI
    pub fn subscribe(
        &mut self,
        cri: Cri,
        subscription_id: impl Into<String>,
        sink: Arc<dyn EventSink>,
    ) -> Result<(), EndpointError> {
        let session = self.require_session()?.clone();
        let subscription_id = subscription_id.into();

        if !session.subscribe_allowed(&cri) {
            record(&AUTHORIZATION_DENIALS, &["subscribe"]);
            warn!(
                participant = %session.participant().id(),
                cri = %cri,
                "Subscribe denied"
            );
            return Err(EndpointError::NotAuthorized {
                action: "subscribe",
                cri: cri.to_string(),
            });
        }

        let gate = Arc::new(Mutex::new(true));
        let task = match cri.scheme() {
            Scheme::Service => {
                let subscription = self.services.bus.listen(&cri.base_resource());
                let filter = cri.versioned_resource();
                tokio::spawn(deliver_service(
                    subscription,
                    filter,
                    session,
                    subscription_id.clone(),
                    sink,
                    gate.clone(),
                ))
            }
            Scheme::Stream => {
                let subscription = self.services.streams.listen(&cri);
                tokio::spawn(deliver_stream(
                    subscription,
                    subscription_id.clone(),
                    sink,
                    gate.clone(),
                ))
            }
        };

        info!(subscription = %subscription_id, cri = %cri, "Subscribed");
        let active = ActiveSubscription {
            cri,
            gate,
            task,
            _gauge: GaugeGuard::new(&ENDPOINT_SUBSCRIPTIONS_ACTIVE),
        };
        if let Some(replaced) = self.subscriptions.insert(subscription_id, active) {
            debug!(cri = %replaced.cri, "Subscription id reused, previous subscription kept until shutdown");
            self.orphans.push(replaced);
        }
        Ok(())
    }

    /// Stop a subscription. Returns `false` for an unknown id.
    pub fn unsubscribe(&mut self, subscription_id: &str) -> bool {
        match self.subscriptions.remove(subscription_id) {
            Some(active) => {
                active.cancel();
                info!(subscription = %subscription_id, cri = %active.cri, "Unsubscribed");
                true
            }
            None => {
                debug!(subscription = %subscription_id, "Unsubscribe for unknown subscription");
                false
            }
        }
    }

    /// Invalidate the session in the store (logout).
    pub async fn remove_session(&mut self) {
        if let Some(timer) = self.touch_timer.take() {
            timer.abort();
        }
        match self.session.take() {
            Some(session) => {
                self.services.session_store.remove(session.id()).await;
                info!(session = %session.id(), "Session removed");
            }
            None => error!("remove_session called without a session"),
        }
        self.sender_header = None;
        if self.state == ConnectionState::Authenticated {
            self.state = ConnectionState::Unauthenticated;
        }
    }

    /// Cancel every subscription and the touch timer. Idempotent.
    ///
    /// The session itself stays in the store so it can be resumed.
    pub fn shutdown(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if let Some(timer) = self.touch_timer.take() {
            timer.abort();
        }
        for (_, active) in self.subscriptions.drain() {
            active.cancel();
        }
        for active in self.orphans.drain(..) {
            active.cancel();
        }
        self.state = ConnectionState::Closed;
        debug!("Connection handler shut down");
    }
}

impl Drop for EndpointConnectionHandler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Parse a client-supplied destination.
///
/// # Errors
///
/// [`EndpointError::UnsupportedScheme`] for anything but `srv` and `stream`,
/// [`EndpointError::Cri`] for other malformed input.
pub fn parse_destination(raw: &str) -> Result<Cri, EndpointError> {
    Ok(Cri::parse(raw)?)
}

/// Hand one event to the sink unless the subscription was cancelled.
fn deliver_gated(gate: &Mutex<bool>, sink: &dyn EventSink, id: &str, event: Event) -> bool {
    let open = gate.lock();
    *open && sink.deliver(id, event)
}

async fn deliver_stream(
    mut subscription: Subscription,
    id: String,
    sink: Arc<dyn EventSink>,
    gate: Arc<Mutex<bool>>,
) {
    while let Some(event) = subscription.recv().await {
        if !deliver_gated(&gate, sink.as_ref(), &id, event) {
            break;
        }
    }
    debug!(subscription = %id, "Stream delivery ended");
}

async fn deliver_service(
    mut subscription: Subscription,
    filter: Cri,
    session: Arc<Session>,
    id: String,
    sink: Arc<dyn EventSink>,
    gate: Arc<Mutex<bool>>,
) {
    while let Some(event) = subscription.recv().await {
        if !event.cri().delivers_to(&filter) {
            continue;
        }
        if let Some(reply_to) = event.reply_to() {
            if reply_to.contains('*') {
                warn!(subscription = %id, reply_to = %reply_to, "Dropping request with wildcard reply-to");
                continue;
            }
            match Cri::parse(reply_to) {
                Ok(reply) => {
                    if session.grant_send(&reply) {
                        debug!(session = %session.id(), reply_to = %reply, "Reply address granted");
                    }
                }
                Err(e) => {
                    warn!(subscription = %id, error = %e, "Dropping request with malformed reply-to");
                    continue;
                }
            }
        }
        if !deliver_gated(&gate, sink.as_ref(), &id, event) {
            break;
        }
    }
    debug!(subscription = %id, "Service delivery ended");
}
