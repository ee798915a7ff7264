//! Session coordinator — thin glue over the buffer and router.
//!
//! Admits at most one active turn per session, provides the single
//! emit/subscribe API (every delivered event passes through the buffer
//! first — there is no skip-buffer path), and runs the periodic sweep
//! that expires buffered events and reclaims idle sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use aw_domain::config::Config;
use aw_domain::event::{AgentEvent, BufferedEvent};
use aw_domain::{Error, Result};

use crate::events::buffer::EventBuffer;
use crate::events::router::{EventFilter, EventRouter, Subscription, SubscriptionGuard};
use crate::runtime::cancel::CancelToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn admission
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ActiveTurn {
    task_id: String,
    cancel: CancelToken,
}

/// Exclusive hold on a session's turn slot; releasing the guard (drop)
/// re-admits the session.
pub struct TurnGuard {
    coordinator: Arc<SessionCoordinator>,
    context_id: String,
    task_id: String,
    cancel: CancelToken,
}

impl TurnGuard {
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.coordinator.turns.lock().remove(&self.context_id);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Coordinator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionCoordinator {
    buffer: Arc<EventBuffer>,
    router: Arc<EventRouter>,
    turns: Mutex<HashMap<String, ActiveTurn>>,
    subscriber_queue_cap: usize,
    idle_ttl: Duration,
    /// Unix-ms of the most recent emit (for the health probe).
    last_update_ms: AtomicI64,
    draining: AtomicBool,
}

impl SessionCoordinator {
    pub fn new(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            buffer: Arc::new(EventBuffer::new(&config.buffer)),
            router: Arc::new(EventRouter::new()),
            turns: Mutex::new(HashMap::new()),
            subscriber_queue_cap: config.session.subscriber_queue_cap,
            idle_ttl: config.session.idle_ttl(),
            last_update_ms: AtomicI64::new(chrono::Utc::now().timestamp_millis()),
            draining: AtomicBool::new(false),
        })
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    // ── emit ────────────────────────────────────────────────────────

    /// Buffer an event, then fan it out. The only delivery path.
    pub fn emit(&self, event: AgentEvent) -> BufferedEvent {
        let context_id = event.context_id.clone();
        let buffered = self.buffer.add(event);
        let delivered = self.router.route(&context_id, &buffered);
        self.last_update_ms
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
        tracing::trace!(
            event_id = %buffered.id,
            kind = buffered.event.kind(),
            delivered,
            "event emitted"
        );
        buffered
    }

    // ── turn admission ──────────────────────────────────────────────

    /// Admit a new turn for the session. Fails with
    /// [`Error::TurnConflict`] while another turn is active, and with
    /// [`Error::Draining`] during shutdown.
    pub fn begin_turn(self: &Arc<Self>, context_id: &str) -> Result<TurnGuard> {
        if self.draining.load(Ordering::Acquire) {
            return Err(Error::Draining);
        }

        let mut turns = self.turns.lock();
        if turns.contains_key(context_id) {
            return Err(Error::TurnConflict(context_id.to_string()));
        }

        let task_id = Uuid::new_v4().to_string();
        let cancel = CancelToken::new();
        turns.insert(
            context_id.to_string(),
            ActiveTurn {
                task_id: task_id.clone(),
                cancel: cancel.clone(),
            },
        );

        Ok(TurnGuard {
            coordinator: self.clone(),
            context_id: context_id.to_string(),
            task_id,
            cancel,
        })
    }

    pub fn has_active_turn(&self, context_id: &str) -> bool {
        self.turns.lock().contains_key(context_id)
    }

    /// The task ID of the session's active turn, if any.
    pub fn active_task(&self, context_id: &str) -> Option<String> {
        self.turns
            .lock()
            .get(context_id)
            .map(|turn| turn.task_id.clone())
    }

    pub fn is_busy(&self) -> bool {
        !self.turns.lock().is_empty()
    }

    /// Request cancellation of a session's running turn. Returns whether
    /// a turn was active.
    pub fn cancel_turn(&self, context_id: &str) -> bool {
        match self.turns.lock().get(context_id) {
            Some(turn) => {
                turn.cancel.cancel();
                true
            }
            None => false,
        }
    }

    // ── subscribe ───────────────────────────────────────────────────

    /// Attach a subscriber to a session's stream.
    ///
    /// The live sink is registered with the router *before* the replay
    /// snapshot is taken, so no event can fall between the two; the SSE
    /// stream deduplicates the overlap by seq. Returns the replay batch
    /// (empty unless `last_event_id` resolves inside the retained
    /// window), the live receiver, and the unsubscribe guard.
    pub fn subscribe(
        &self,
        context_id: &str,
        filter: EventFilter,
        last_event_id: Option<&str>,
    ) -> (
        Vec<BufferedEvent>,
        mpsc::Receiver<BufferedEvent>,
        SubscriptionGuard,
    ) {
        let subscription_id = Uuid::new_v4().to_string();
        let (sink, live) = mpsc::channel(self.subscriber_queue_cap);

        self.router.subscribe(Subscription {
            id: subscription_id.clone(),
            context_id: context_id.to_string(),
            filter: filter.clone(),
            sink,
        });
        let guard = SubscriptionGuard::new(
            self.router.clone(),
            subscription_id,
            context_id.to_string(),
        );

        let replay = match last_event_id {
            Some(id) => self
                .buffer
                .get_events_since(context_id, id)
                .into_iter()
                .filter(|b| filter.matches(&b.event))
                .collect(),
            None => Vec::new(),
        };

        (replay, live, guard)
    }

    // ── maintenance ─────────────────────────────────────────────────

    /// One sweep pass: expire buffered events past their TTL and drop
    /// sessions idle beyond the idle TTL (unless a turn is running).
    pub fn sweep(&self) {
        self.buffer.cleanup();
        for context_id in self.buffer.idle_sessions(self.idle_ttl) {
            if self.has_active_turn(&context_id) {
                continue;
            }
            tracing::info!(context_id, "reclaiming idle session");
            self.buffer.clear(&context_id);
        }
    }

    /// Spawn the periodic sweep task.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if coordinator.draining.load(Ordering::Acquire) {
                    break;
                }
                coordinator.sweep();
            }
        })
    }

    /// Stop admitting turns, cancel the running ones, and tear down all
    /// subscriptions and buffers.
    pub fn shutdown(&self) {
        self.draining.store(true, Ordering::Release);
        for turn in self.turns.lock().values() {
            turn.cancel.cancel();
        }
        self.router.clear();
        self.buffer.shutdown();
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub fn last_update_ms(&self) -> i64 {
        self.last_update_ms.load(Ordering::Relaxed)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
