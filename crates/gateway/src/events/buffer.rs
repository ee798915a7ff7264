//! Per-session event buffer — recent events with monotonic IDs and replay.
//!
//! Each session keeps a bounded ring of [`BufferedEvent`]s. IDs are
//! `"{contextId}-{seq}"` with a 1-based, strictly increasing `seq` per
//! session; evicted IDs are never reused. Retention is whichever evicts
//! first: the size cap (FIFO) or the TTL (swept by [`EventBuffer::cleanup`]).
//!
//! Replay answers "give me everything after event X". An unknown or
//! malformed X — including one that predates the retained window — yields
//! an empty list: the client gives up on resume and sees a normal
//! new-subscriber stream instead of a possibly huge dump.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use aw_domain::config::BufferConfig;
use aw_domain::event::{AgentEvent, BufferedEvent};

/// Format the buffered-event ID for a (session, seq) pair.
pub fn event_id(context_id: &str, seq: u64) -> String {
    format!("{context_id}-{seq}")
}

/// Parse the `seq` out of an event ID for the given session. Returns
/// `None` when the ID is malformed or belongs to another session.
pub fn parse_event_seq(context_id: &str, id: &str) -> Option<u64> {
    id.strip_prefix(context_id)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-session ring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Interior state of one session: the event ring plus the seq counter.
/// The counter survives eviction so IDs stay strictly increasing.
struct SessionBuffer {
    events: VecDeque<BufferedEvent>,
    next_seq: u64,
    last_add: chrono::DateTime<Utc>,
}

impl SessionBuffer {
    fn new() -> Self {
        Self {
            events: VecDeque::new(),
            next_seq: 1,
            last_add: Utc::now(),
        }
    }

    fn front_seq(&self) -> Option<u64> {
        self.events.front().map(|e| e.seq)
    }

    fn back_seq(&self) -> Option<u64> {
        self.events.back().map(|e| e.seq)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Buffer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process-wide buffer, partitioned by `contextId`. Cross-session calls
/// never contend on the same lock: the outer map lock is held only to
/// fetch the per-session mutex.
pub struct EventBuffer {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionBuffer>>>>,
    max_size: usize,
    ttl: Duration,
}

impl EventBuffer {
    pub fn new(config: &BufferConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_size: config.max_size,
            ttl: config.ttl(),
        }
    }

    /// Fetch (or lazily create) the session's ring.
    fn session(&self, context_id: &str) -> Arc<Mutex<SessionBuffer>> {
        if let Some(session) = self.sessions.read().get(context_id) {
            return session.clone();
        }
        self.sessions
            .write()
            .entry(context_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(SessionBuffer::new())))
            .clone()
    }

    /// Store an event, allocating the session's next seq. Evicts the
    /// oldest entry when the ring exceeds the size cap. O(1) amortized.
    pub fn add(&self, event: AgentEvent) -> BufferedEvent {
        let session = self.session(&event.context_id);
        let mut session = session.lock();

        let seq = session.next_seq;
        session.next_seq += 1;
        session.last_add = Utc::now();

        let buffered = BufferedEvent {
            id: event_id(&event.context_id, seq),
            seq,
            event,
            stored_at: session.last_add,
        };
        session.events.push_back(buffered.clone());

        while session.events.len() > self.max_size {
            session.events.pop_front();
        }

        buffered
    }

    /// All retained events with `seq > seq(event_id)`, in order.
    ///
    /// Returns an empty list when the ID is malformed, belongs to another
    /// session, or is no longer (or not yet) in the retained window.
    pub fn get_events_since(&self, context_id: &str, last_event_id: &str) -> Vec<BufferedEvent> {
        let Some(since) = parse_event_seq(context_id, last_event_id) else {
            return Vec::new();
        };

        let Some(session) = self.sessions.read().get(context_id).cloned() else {
            return Vec::new();
        };
        let session = session.lock();

        // The resume point must still be inside the retained window;
        // anything older was evicted and anything newer never existed.
        let known = match (session.front_seq(), session.back_seq()) {
            (Some(front), Some(back)) => since >= front && since <= back,
            _ => false,
        };
        if !known {
            return Vec::new();
        }

        session
            .events
            .iter()
            .filter(|e| e.seq > since)
            .cloned()
            .collect()
    }

    /// Snapshot of all retained events for a session, in order.
    pub fn get_all(&self, context_id: &str) -> Vec<BufferedEvent> {
        match self.sessions.read().get(context_id) {
            Some(session) => session.lock().events.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Drop a session entirely (events and seq counter).
    pub fn clear(&self, context_id: &str) {
        self.sessions.write().remove(context_id);
    }

    /// Expire events older than the TTL. Idempotent; callable from tests
    /// as well as the background sweep.
    pub fn cleanup(&self) {
        let sessions: Vec<Arc<Mutex<SessionBuffer>>> =
            self.sessions.read().values().cloned().collect();

        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero());
        let mut expired = 0usize;
        for session in sessions {
            let mut session = session.lock();
            while session
                .events
                .front()
                .is_some_and(|e| e.stored_at < cutoff)
            {
                session.events.pop_front();
                expired += 1;
            }
        }
        if expired > 0 {
            tracing::debug!(expired, "expired buffered events past TTL");
        }
    }

    /// Sessions whose most recent add is older than `idle_ttl`.
    pub fn idle_sessions(&self, idle_ttl: Duration) -> Vec<String> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(idle_ttl).unwrap_or(chrono::Duration::zero());
        self.sessions
            .read()
            .iter()
            .filter(|(_, session)| session.lock().last_add < cutoff)
            .map(|(context_id, _)| context_id.clone())
            .collect()
    }

    /// Drop everything (server shutdown).
    pub fn shutdown(&self) {
        self.sessions.write().clear();
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
