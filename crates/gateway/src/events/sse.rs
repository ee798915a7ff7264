//! SSE transport — frames buffered events onto an HTTP event stream.
//!
//! Each event goes out as
//! ```text
//! id: {contextId}-{seq}
//! event: {kind}
//! data: {json-encoded event}
//! ```
//! The JSON encoder escapes newlines inside strings, so `data` is always
//! a single line. Heartbeats are comment lines (`: keepalive`) emitted by
//! the keep-alive layer; they carry no ID and are never buffered.
//!
//! Reconnection: the caller resolves `Last-Event-ID` into a replay batch
//! before handing over to [`event_stream`]; the live half of the stream
//! drops anything with a seq at or below the replay horizon, so the
//! replay/live seam has no duplicates and no gaps.

use std::convert::Infallible;
use std::time::Duration;

use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use aw_domain::event::{AgentEvent, BufferedEvent, EventPayload, TaskStatus};

use super::router::SubscriptionGuard;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Header parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read the `Last-Event-ID` header, leniently: a missing, empty, or
/// non-UTF-8 value is treated as absent. Whether the ID itself resolves
/// to anything is the buffer's concern.
pub fn parse_last_event_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("last-event-id")?.to_str().ok()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream termination
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Whether this event ends the SSE response. A completed turn closes on
/// `task-complete` (which follows `task-status: completed`); failed and
/// canceled turns close on their terminal `task-status` directly.
pub fn is_stream_end(event: &AgentEvent) -> bool {
    match &event.payload {
        EventPayload::TaskComplete => true,
        EventPayload::TaskStatus { status, .. } => {
            matches!(status, TaskStatus::Failed | TaskStatus::Canceled)
        }
        _ => false,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Merged replay + live stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Yield the replay batch, then live events, deduplicated by seq and
/// terminated after a terminal lifecycle event.
///
/// The `guard` is held for the lifetime of the stream; dropping the
/// stream (client disconnect, or natural end) unsubscribes from the
/// router and releases the subscription's queue.
pub fn event_stream(
    replay: Vec<BufferedEvent>,
    mut live: mpsc::Receiver<BufferedEvent>,
    guard: SubscriptionGuard,
) -> impl Stream<Item = BufferedEvent> {
    async_stream::stream! {
        // Moved into the generator so the drop runs when the response
        // body is dropped, not when the handler returns.
        let _guard = guard;

        let mut last_seq = 0u64;
        for buffered in replay {
            last_seq = buffered.seq;
            let done = is_stream_end(&buffered.event);
            yield buffered;
            if done {
                return;
            }
        }

        while let Some(buffered) = live.recv().await {
            // The live subscription was registered before the replay
            // snapshot was taken, so the overlap shows up here.
            if buffered.seq <= last_seq {
                continue;
            }
            last_seq = buffered.seq;
            let done = is_stream_end(&buffered.event);
            yield buffered;
            if done {
                return;
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Framing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn frame(buffered: &BufferedEvent) -> Event {
    Event::default()
        .id(&buffered.id)
        .event(buffered.event.kind())
        .data(serde_json::to_string(&buffered.event).unwrap_or_default())
}

/// Build the SSE response for a subscription: replay, then live, with an
/// optional keep-alive heartbeat.
pub fn sse_response(
    replay: Vec<BufferedEvent>,
    live: mpsc::Receiver<BufferedEvent>,
    guard: SubscriptionGuard,
    heartbeat: Option<Duration>,
) -> axum::response::Response {
    let stream = event_stream(replay, live, guard)
        .map(|buffered| Ok::<_, Infallible>(frame(&buffered)));

    let sse = Sse::new(stream);
    match heartbeat {
        Some(interval) => sse
            .keep_alive(KeepAlive::new().interval(interval).text("keepalive"))
            .into_response(),
        None => sse.into_response(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
