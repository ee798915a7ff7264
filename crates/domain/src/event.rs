//! The event model streamed to clients.
//!
//! Every event is an envelope (`contextId`, `taskId`, `timestamp`) around a
//! kind-discriminated payload. The `kind` field is the single source of
//! truth for filtering and SSE event names; unknown kinds are rejected at
//! deserialization time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tag attributes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An attribute value on a reasoning tag: a single string, or an array
/// when the same key appeared more than once (order preserved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    One(String),
    Many(Vec<String>),
}

impl AttrValue {
    /// Fold another occurrence of the same key into this value.
    pub fn push(&mut self, value: String) {
        match self {
            Self::One(first) => {
                let first = std::mem::take(first);
                *self = Self::Many(vec![first, value]);
            }
            Self::Many(values) => values.push(value),
        }
    }
}

/// Attributes parsed from a reasoning tag, keyed by attribute name.
pub type Attributes = BTreeMap<String, AttrValue>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Working,
    Completed,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Token usage counters reported by the upstream model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounters {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// Kind-specific payload of an [`AgentEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventPayload {
    #[serde(rename = "task-created")]
    TaskCreated,

    #[serde(rename = "task-status", rename_all = "camelCase")]
    TaskStatus {
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    #[serde(rename = "task-complete")]
    TaskComplete,

    #[serde(rename = "content-delta")]
    ContentDelta { delta: String },

    #[serde(rename = "content-complete")]
    ContentComplete,

    #[serde(rename = "thought-stream")]
    ThoughtStream {
        content: String,
        #[serde(default)]
        attributes: Attributes,
    },

    #[serde(rename = "tool-call", rename_all = "camelCase")]
    ToolCall {
        call_id: String,
        name: String,
        arguments_json: String,
    },

    #[serde(rename = "tool-result", rename_all = "camelCase")]
    ToolResult {
        call_id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    #[serde(rename = "llm-usage")]
    LlmUsage {
        #[serde(flatten)]
        usage: UsageCounters,
    },

    /// Internal diagnostic events. Never delivered to subscribers unless
    /// the subscription filter sets `allow_internal`.
    #[serde(rename = "internal:trace")]
    InternalTrace { message: String },
}

impl EventPayload {
    /// The wire-level `kind` string, which is also the SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TaskCreated => "task-created",
            Self::TaskStatus { .. } => "task-status",
            Self::TaskComplete => "task-complete",
            Self::ContentDelta { .. } => "content-delta",
            Self::ContentComplete => "content-complete",
            Self::ThoughtStream { .. } => "thought-stream",
            Self::ToolCall { .. } => "tool-call",
            Self::ToolResult { .. } => "tool-result",
            Self::LlmUsage { .. } => "llm-usage",
            Self::InternalTrace { .. } => "internal:trace",
        }
    }

    pub fn is_internal(&self) -> bool {
        self.kind().starts_with("internal:")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single event within a session's stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "contextId")]
    pub context_id: String,
    #[serde(rename = "taskId")]
    pub task_id: String,
    /// ISO-8601 UTC.
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl AgentEvent {
    pub fn new(
        context_id: impl Into<String>,
        task_id: impl Into<String>,
        payload: EventPayload,
    ) -> Self {
        Self {
            context_id: context_id.into(),
            task_id: task_id.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    pub fn is_internal(&self) -> bool {
        self.payload.is_internal()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Buffered event
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An event as retained by the per-session buffer: the event plus its
/// assigned ID (`"{contextId}-{seq}"`) and the wall-clock time it was
/// stored (used for TTL expiry).
#[derive(Debug, Clone, Serialize)]
pub struct BufferedEvent {
    pub id: String,
    pub seq: u64,
    pub event: AgentEvent,
    pub stored_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
