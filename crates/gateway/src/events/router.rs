//! Event router — filtered fan-out to per-subscriber bounded queues.
//!
//! Subscriptions are partitioned by `contextId`. Each subscription owns a
//! bounded mpsc sender; `route` never blocks on a sink. A full queue
//! means the subscriber fell behind — it is removed (with a warning)
//! rather than head-of-line blocking the producer. Closed sinks are
//! removed opportunistically.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use aw_domain::event::{AgentEvent, BufferedEvent};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Filter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-subscription event filter. All set conditions must pass, in the
/// order: task match, internal gate, include set, exclude set.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub task_id: Option<String>,
    pub include_kinds: Option<HashSet<String>>,
    pub exclude_kinds: Option<HashSet<String>>,
    /// `internal:`-prefixed events are suppressed unless this is set.
    pub allow_internal: bool,
}

impl EventFilter {
    pub fn matches(&self, event: &AgentEvent) -> bool {
        if let Some(task_id) = &self.task_id {
            if &event.task_id != task_id {
                return false;
            }
        }
        if event.is_internal() && !self.allow_internal {
            return false;
        }
        let kind = event.kind();
        if let Some(include) = &self.include_kinds {
            if !include.contains(kind) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude_kinds {
            if exclude.contains(kind) {
                return false;
            }
        }
        true
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Subscription
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A filtered view over one session's event stream, bound to a sink.
pub struct Subscription {
    pub id: String,
    pub context_id: String,
    pub filter: EventFilter,
    pub sink: mpsc::Sender<BufferedEvent>,
}

/// Counters for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterStats {
    pub sessions: usize,
    pub subscriptions: usize,
}

/// Unsubscribes when dropped. Held by the SSE response stream so a
/// client disconnect (or natural stream end) releases the subscription.
pub struct SubscriptionGuard {
    router: std::sync::Arc<EventRouter>,
    subscription_id: String,
    context_id: String,
}

impl SubscriptionGuard {
    pub fn new(
        router: std::sync::Arc<EventRouter>,
        subscription_id: String,
        context_id: String,
    ) -> Self {
        Self {
            router,
            subscription_id,
            context_id,
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.router
            .unsubscribe(&self.subscription_id, &self.context_id);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct EventRouter {
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscription: Subscription) {
        tracing::debug!(
            subscription_id = %subscription.id,
            context_id = %subscription.context_id,
            "subscriber registered"
        );
        self.subscriptions
            .write()
            .entry(subscription.context_id.clone())
            .or_default()
            .push(subscription);
    }

    pub fn unsubscribe(&self, subscription_id: &str, context_id: &str) {
        let mut subscriptions = self.subscriptions.write();
        if let Some(list) = subscriptions.get_mut(context_id) {
            list.retain(|s| s.id != subscription_id);
            if list.is_empty() {
                subscriptions.remove(context_id);
            }
        }
    }

    /// Deliver one buffered event to every matching subscription of its
    /// session. Returns the number of successful deliveries.
    ///
    /// Delivery is isolated per subscription: a full or closed sink only
    /// affects that subscription (it is removed), never its peers and
    /// never the producer.
    pub fn route(&self, context_id: &str, buffered: &BufferedEvent) -> usize {
        let mut delivered = 0usize;
        let mut dead: Vec<String> = Vec::new();

        {
            let subscriptions = self.subscriptions.read();
            let Some(list) = subscriptions.get(context_id) else {
                return 0;
            };
            for subscription in list {
                if !subscription.filter.matches(&buffered.event) {
                    continue;
                }
                match subscription.sink.try_send(buffered.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            subscription_id = %subscription.id,
                            context_id,
                            "subscriber queue full — dropping slow subscriber"
                        );
                        dead.push(subscription.id.clone());
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        tracing::debug!(
                            subscription_id = %subscription.id,
                            context_id,
                            "subscriber sink closed — removing"
                        );
                        dead.push(subscription.id.clone());
                    }
                }
            }
        }

        for id in dead {
            self.unsubscribe(&id, context_id);
        }
        delivered
    }

    pub fn clear(&self) {
        self.subscriptions.write().clear();
    }

    pub fn stats(&self) -> RouterStats {
        let subscriptions = self.subscriptions.read();
        RouterStats {
            sessions: subscriptions.len(),
            subscriptions: subscriptions.values().map(Vec::len).sum(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
