//! Pending request store: correlation id → reply channel.
//!
//! Maps the correlation ids of in-flight proxy calls to the channel their
//! caller is waiting on. Streaming calls receive many replies, so the
//! channel is an unbounded mpsc rather than a oneshot.

use crate::domain::correlation::CorrelationId;
use crate::rpc::response::RpcResponse;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A pending request waiting for replies
struct PendingRequest {
    /// Channel to the waiting caller
    sender: mpsc::UnboundedSender<RpcResponse>,
    /// When the request was registered
    created_at: Instant,
    /// Last reply received (stream items extend the deadline)
    last_activity: Instant,
    /// Function name (for logging)
    function: String,
    /// Idle timeout for this request
    timeout: Duration,
}

/// Statistics for pending request store
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total requests registered
    pub total_registered: AtomicU64,
    /// Total requests completed
    pub total_completed: AtomicU64,
    /// Total stream items forwarded
    pub total_stream_items: AtomicU64,
    /// Total requests timed out
    pub total_timeouts: AtomicU64,
    /// Total requests cancelled (dropped)
    pub total_cancelled: AtomicU64,
}

/// Pending request store for reply routing.
///
/// Flow:
/// 1. Proxy calls `register()` and gets a correlation id plus a receiver
/// 2. Proxy sends the request event with that correlation id
/// 3. The reply router calls `deliver()` for every reply event
/// 4. A terminal reply (value, error, stream end) removes the entry
pub struct PendingRequestStore {
    pending: DashMap<CorrelationId, PendingRequest>,
    default_timeout: Duration,
    stats: Arc<PendingStats>,
}

impl PendingRequestStore {
    #[must_use]
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            default_timeout,
            stats: Arc::new(PendingStats::default()),
        }
    }

    /// Register a pending request and get a receiver for its replies.
    pub fn register(
        &self,
        function: &str,
        timeout: Option<Duration>,
    ) -> (CorrelationId, mpsc::UnboundedReceiver<RpcResponse>) {
        let correlation_id = CorrelationId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let now = Instant::now();

        let request = PendingRequest {
            sender: tx,
            created_at: now,
            last_activity: now,
            function: function.to_string(),
            timeout: timeout.unwrap_or(self.default_timeout),
        };

        self.pending.insert(correlation_id, request);
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(
            correlation_id = %correlation_id,
            function = function,
            "Registered pending request"
        );

        (correlation_id, rx)
    }

    /// Forward one reply to the waiting caller.
    ///
    /// Returns true if the request was found and the caller is still listening.
    pub fn deliver(&self, correlation_id: CorrelationId, response: RpcResponse) -> bool {
        if response.is_terminal() {
            return self.complete(correlation_id, response);
        }

        let Some(mut pending) = self.pending.get_mut(&correlation_id) else {
            warn!(correlation_id = %correlation_id, "Stream item for unknown or expired correlation ID");
            return false;
        };
        pending.last_activity = Instant::now();
        if pending.sender.send(response).is_ok() {
            self.stats.total_stream_items.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        drop(pending);

        // Receiver was dropped (caller stopped reading the stream)
        self.cancel(&correlation_id);
        false
    }

    fn complete(&self, correlation_id: CorrelationId, response: RpcResponse) -> bool {
        let Some((_, pending)) = self.pending.remove(&correlation_id) else {
            warn!(
                correlation_id = %correlation_id,
                "Response for unknown or expired correlation ID"
            );
            return false;
        };

        let response_time = pending.created_at.elapsed();
        match pending.sender.send(response) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    function = pending.function,
                    response_time_ms = response_time.as_millis(),
                    "Completed pending request"
                );
                true
            }
            Err(_) => {
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    function = pending.function,
                    "Pending request receiver dropped"
                );
                false
            }
        }
    }

    /// Remove requests idle past their timeout (TTL cleanup).
    ///
    /// Returns the number of requests removed.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.pending.retain(|id, request| {
            let idle = now.duration_since(request.last_activity);
            if idle > request.timeout {
                warn!(
                    correlation_id = %id,
                    function = request.function,
                    idle_ms = idle.as_millis(),
                    timeout_ms = request.timeout.as_millis(),
                    "Removing expired pending request"
                );
                self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                removed += 1;
                false
            } else {
                true
            }
        });

        removed
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    #[must_use]
    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    /// Cancel a pending request
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        if self.pending.remove(correlation_id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

/// Background task to clean up expired requests
pub async fn cleanup_task(store: Arc<PendingRequestStore>, interval: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let removed = store.remove_expired();
        if removed > 0 {
            debug!(removed = removed, "Cleaned up expired pending requests");
        }
    }
}
