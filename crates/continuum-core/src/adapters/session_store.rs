//! In-memory session store.

use crate::domain::session::Session;
use crate::ports::outbound::SessionStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Statistics for the session store
#[derive(Debug, Default)]
pub struct SessionStats {
    pub total_created: AtomicU64,
    pub total_removed: AtomicU64,
    pub total_expired: AtomicU64,
}

/// Session records keyed by session id.
///
/// Sessions idle for longer than `timeout` are invisible to lookups and
/// dropped by [`SessionStore::sweep_expired`].
pub struct InMemorySessionStore {
    sessions: DashMap<String, Arc<Session>>,
    timeout: Duration,
    stats: SessionStats,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            timeout,
            stats: SessionStats::default(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    fn live(&self, session_id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.get(session_id).map(|s| Arc::clone(&s))?;
        if session.is_expired(self.timeout) {
            self.sessions.remove_if(session_id, |_, s| s.is_expired(self.timeout));
            self.stats.total_expired.fetch_add(1, Ordering::Relaxed);
            debug!(session_id = session_id, "Session expired on lookup");
            return None;
        }
        Some(session)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.sessions
            .insert(session.id().to_string(), Arc::clone(&session));
        self.stats.total_created.fetch_add(1, Ordering::Relaxed);
        debug!(
            session_id = session.id(),
            participant = session.participant().id(),
            "Session created"
        );
        session
    }

    async fn find(&self, session_id: &str) -> Option<Arc<Session>> {
        self.live(session_id)
    }

    async fn touch(&self, session_id: &str) -> bool {
        match self.live(session_id) {
            Some(session) => {
                session.touch();
                true
            }
            None => false,
        }
    }

    async fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(session_id).map(|(_, s)| s);
        if removed.is_some() {
            self.stats.total_removed.fetch_add(1, Ordering::Relaxed);
            debug!(session_id = session_id, "Session removed");
        }
        removed
    }

    async fn sweep_expired(&self, timeout: Duration) -> usize {
        let mut removed = 0;
        self.sessions.retain(|id, session| {
            if session.is_expired(timeout) {
                debug!(session_id = %id, idle_ms = session.idle_for().as_millis(), "Sweeping expired session");
                removed += 1;
                false
            } else {
                true
            }
        });
        self.stats
            .total_expired
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }
}

/// Background task that drops expired sessions every `interval`.
pub async fn sweep_task(store: Arc<dyn SessionStore>, timeout: Duration, interval: Duration) {
    let mut sweep_interval = tokio::time::interval(interval);
    sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        sweep_interval.tick().await;
        let removed = store.sweep_expired(timeout).await;
        if removed > 0 {
            debug!(removed = removed, "Swept expired sessions");
        }
    }
}
