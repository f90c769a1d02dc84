//! Per-user, strictly ordered delivery of celebration events to the UI.
//!
//! The queue tolerates the sink being absent (app backgrounded): events are
//! buffered per user and flushed in order when a sink attaches or the UI
//! drains explicitly. `enqueue` never blocks. An optional per-user bound
//! drops the oldest event with a logged warning rather than waiting; nothing
//! is ever dropped silently. The engine guarantees order, not pacing —
//! sequential presentation of one modal at a time is the consumer's concern.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::{debug, warn};

use crate::engine::errors::EngineError;
use crate::engine::types::NotificationEvent;
use crate::metrics;

/// UI-layer consumer. Rendering, timing, and dismissal are entirely the
/// sink's responsibility; the engine's contract ends at handing over a
/// well-ordered event.
pub trait NotificationSink: Send + Sync {
    fn on_event(&self, user_id: &str, event: &NotificationEvent) -> Result<(), EngineError>;
}

/// Per-user FIFO buffers plus an optional push sink.
pub struct NotificationQueue {
    queues: Mutex<HashMap<String, VecDeque<NotificationEvent>>>,
    sink: RwLock<Option<Arc<dyn NotificationSink>>>,
    /// Users currently being drained through the sink. Sink calls happen
    /// outside the buffer lock, so this is what keeps two threads from
    /// interleaving one user's deliveries.
    flushing: Mutex<HashSet<String>>,
    /// When set, a user's buffer never exceeds this length; the oldest
    /// event is dropped (with a warning) to make room.
    max_buffered_per_user: Option<usize>,
}

impl NotificationQueue {
    pub fn new(max_buffered_per_user: Option<usize>) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            sink: RwLock::new(None),
            flushing: Mutex::new(HashSet::new()),
            max_buffered_per_user,
        }
    }

    fn lock_queues(&self) -> MutexGuard<'_, HashMap<String, VecDeque<NotificationEvent>>> {
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_flushing(&self) -> MutexGuard<'_, HashSet<String>> {
        self.flushing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_sink(&self) -> Option<Arc<dyn NotificationSink>> {
        self.sink
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Attach a push sink and flush everything already buffered through it.
    pub fn attach_sink(&self, sink: Arc<dyn NotificationSink>) {
        {
            let mut guard = self
                .sink
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = Some(sink);
        }
        let users: Vec<String> = self.lock_queues().keys().cloned().collect();
        for user_id in users {
            self.flush_user(&user_id);
        }
    }

    /// Detach the sink; subsequent events buffer until a sink returns.
    pub fn detach_sink(&self) {
        let mut guard = self
            .sink
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = None;
    }

    /// Append an event for a user. Non-blocking: delivers through the sink
    /// when one is attached and accepting, buffers otherwise.
    pub fn enqueue(&self, user_id: &str, event: NotificationEvent) {
        self.buffer(user_id, event);
        if self.current_sink().is_some() {
            self.flush_user(user_id);
        }
    }

    fn buffer(&self, user_id: &str, event: NotificationEvent) {
        let mut queues = self.lock_queues();
        let queue = queues.entry(user_id.to_string()).or_default();
        if let Some(max) = self.max_buffered_per_user {
            while queue.len() >= max {
                let dropped = queue.pop_front();
                metrics::inc_notifications_dropped();
                warn!(
                    "notification buffer full for {} (max {}); dropped oldest event {:?}",
                    user_id, max, dropped
                );
            }
        }
        queue.push_back(event);
        metrics::inc_notifications_buffered();
    }

    /// Push buffered events for one user through the sink, preserving order.
    /// At most one thread drains a given user at a time; a concurrent caller
    /// leaves its event buffered for the active drainer, so deliveries for
    /// one user never interleave. On a delivery failure the event stays at
    /// the head of the buffer for a later retry; statistics and ledger state
    /// are already correct, so the failure is logged and swallowed.
    fn flush_user(&self, user_id: &str) {
        loop {
            if !self.lock_flushing().insert(user_id.to_string()) {
                return;
            }
            let clean = self.deliver_all(user_id);
            self.lock_flushing().remove(user_id);
            // An event may have landed between the last pop and the guard
            // release; re-check so nothing is stranded.
            if !clean || self.pending(user_id) == 0 {
                return;
            }
        }
    }

    /// Drain one user's buffer through the sink. Returns false when delivery
    /// stopped early (no sink, or the sink refused an event).
    fn deliver_all(&self, user_id: &str) -> bool {
        let Some(sink) = self.current_sink() else {
            return false;
        };
        loop {
            let next = {
                let mut queues = self.lock_queues();
                match queues.get_mut(user_id) {
                    Some(queue) => queue.pop_front(),
                    None => None,
                }
            };
            let Some(event) = next else {
                return true;
            };
            match sink.on_event(user_id, &event) {
                Ok(()) => metrics::inc_notifications_delivered(),
                Err(e) => {
                    warn!(
                        "notification delivery failed for {}: {}; event requeued",
                        user_id, e
                    );
                    let mut queues = self.lock_queues();
                    queues.entry(user_id.to_string()).or_default().push_front(event);
                    return false;
                }
            }
        }
    }

    /// Consume every buffered event for a user, in order.
    pub fn drain(&self, user_id: &str) -> Vec<NotificationEvent> {
        let mut queues = self.lock_queues();
        let drained: Vec<NotificationEvent> = queues
            .remove(user_id)
            .map(|queue| queue.into_iter().collect())
            .unwrap_or_default();
        for _ in &drained {
            metrics::inc_notifications_delivered();
        }
        drained
    }

    /// Number of buffered events for a user.
    pub fn pending(&self, user_id: &str) -> usize {
        self.lock_queues()
            .get(user_id)
            .map(|queue| queue.len())
            .unwrap_or(0)
    }

    /// Discard a user's buffer on sign-out. Intentional drops are logged at
    /// debug, not warn.
    pub fn drop_user(&self, user_id: &str) {
        if let Some(queue) = self.lock_queues().remove(user_id) {
            if !queue.is_empty() {
                debug!(
                    "dropping {} pending notifications for signed-out user {}",
                    queue.len(),
                    user_id
                );
            }
        }
    }
}
