//! Invocation endpoint — submit a prompt, stream the turn's events.
//!
//! `POST /invocations` (canonical; `/invocation` aliased):
//! - `X-Session-Id` header names the session (`contextId`); required.
//! - Body `{"prompt": "...", ...}`; extra fields are forwarded to the
//!   agent source as metadata.
//! - A request carrying `Last-Event-ID` resumes the session's existing
//!   stream (buffer replay, then live) instead of starting a new turn —
//!   this is what an SSE client reconnect looks like. A malformed or
//!   out-of-window ID falls back to a fresh turn.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use aw_domain::Error;

use crate::events::router::EventFilter;
use crate::events::sse::{parse_last_event_id, sse_response};
use crate::runtime::turn::spawn_turn;
use crate::state::AppState;

/// Header carrying the session's `contextId`.
pub const SESSION_HEADER: &str = "x-session-id";

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

pub async fn invoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Response {
    let context_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let Some(context_id) = context_id else {
        return error_response(StatusCode::BAD_REQUEST, "missing X-Session-Id header");
    };

    let Ok(Json(body)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "invalid request body");
    };

    let heartbeat = state.config.sse.heartbeat_interval();
    let filter = EventFilter {
        // External subscribers never see internal events unless the
        // deployment flips the router default.
        allow_internal: !state.config.router.default_filter_internal,
        ..EventFilter::default()
    };

    // ── Reconnect path ──────────────────────────────────────────────
    if let Some(last_event_id) = parse_last_event_id(&headers) {
        let (replay, live, guard) =
            state
                .coordinator
                .subscribe(context_id, filter.clone(), Some(&last_event_id));

        // Resume only when there is something to resume: a replay batch
        // within the retained window, or a turn still in flight. An
        // unknown ID with nothing running degrades to a fresh turn.
        if !replay.is_empty() || state.coordinator.has_active_turn(context_id) {
            tracing::debug!(
                context_id,
                last_event_id,
                replayed = replay.len(),
                "resuming event stream"
            );
            return sse_response(replay, live, guard, heartbeat);
        }
    }

    // ── New turn ────────────────────────────────────────────────────
    let prompt = body
        .get("prompt")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let Some(prompt) = prompt else {
        return error_response(StatusCode::BAD_REQUEST, "prompt must be a non-empty string");
    };
    let prompt = prompt.to_string();

    let turn = match state.coordinator.begin_turn(context_id) {
        Ok(guard) => guard,
        Err(Error::TurnConflict(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "another turn is active on this session",
            );
        }
        Err(Error::Draining) => {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "server is refusing new turns",
            );
        }
        Err(e) => {
            tracing::error!(context_id, error = %e, "turn admission failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "turn admission failed");
        }
    };

    // Subscribe before the turn starts so the stream observes every
    // event from `task-created` on.
    let (replay, live, guard) = state.coordinator.subscribe(context_id, filter, None);

    tracing::info!(
        context_id,
        task_id = turn.task_id(),
        "turn started"
    );
    spawn_turn(
        state.coordinator.clone(),
        state.source.clone(),
        turn,
        prompt,
        body,
    );

    sse_response(replay, live, guard, heartbeat)
}
