//! Turn driver — transforms one upstream delta stream into the session's
//! event sequence.
//!
//! Text deltas pass through the inline-tag extractor (content vs
//! reasoning), tool-call fragments through the assembler. Every produced
//! event goes through [`SessionCoordinator::emit`], so subscribers see
//! the exact buffered order. The turn ends with `content-complete`,
//! `task-status: completed` and `task-complete` on success, or a single
//! terminal `task-status: failed` / `canceled` otherwise.

use std::sync::Arc;

use futures_util::StreamExt;

use aw_domain::delta::{AssembledToolCall, ModelDelta};
use aw_domain::event::{AgentEvent, EventPayload, TaskStatus};
use aw_stream::{TagEvent, ToolCallAssembler, TagExtractor};

use crate::runtime::coordinator::{SessionCoordinator, TurnGuard};
use crate::runtime::source::{AgentSource, TurnRequest};

/// Run a turn to completion on the current task. Holds the admission
/// guard for the duration; dropping it re-admits the session.
pub async fn run_turn(
    coordinator: Arc<SessionCoordinator>,
    source: Arc<dyn AgentSource>,
    guard: TurnGuard,
    prompt: String,
    metadata: serde_json::Value,
) {
    let context_id = guard.context_id().to_string();
    let task_id = guard.task_id().to_string();
    let cancel = guard.cancel_token();

    let emit = |payload: EventPayload| {
        coordinator.emit(AgentEvent::new(context_id.clone(), task_id.clone(), payload));
    };

    emit(EventPayload::TaskCreated);
    emit(EventPayload::InternalTrace {
        message: format!("turn admitted ({} prompt chars)", prompt.len()),
    });
    emit(EventPayload::TaskStatus {
        status: TaskStatus::Working,
        error: None,
    });

    let request = TurnRequest {
        context_id: context_id.clone(),
        task_id: task_id.clone(),
        prompt,
        metadata,
    };

    let mut upstream = match source.stream_turn(request).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(context_id, error = %e, "agent source refused the turn");
            emit(EventPayload::TaskStatus {
                status: TaskStatus::Failed,
                error: Some(e.to_string()),
            });
            return;
        }
    };

    let mut assembler = ToolCallAssembler::new();
    let mut extractor = TagExtractor::new();

    let emit_tag_events = |events: Vec<TagEvent>| {
        for event in events {
            match event {
                TagEvent::Content(delta) => emit(EventPayload::ContentDelta { delta }),
                TagEvent::Tag(tag) => emit(EventPayload::ThoughtStream {
                    content: tag.content.unwrap_or_default(),
                    attributes: tag.attributes,
                }),
            }
        }
    };
    let emit_tool_call = |call: AssembledToolCall| {
        emit(EventPayload::ToolCall {
            call_id: call.id,
            name: call.name,
            arguments_json: call.arguments,
        });
    };

    while let Some(delta) = upstream.next().await {
        if cancel.is_cancelled() {
            tracing::info!(context_id, task_id, "turn canceled");
            assembler.discard();
            emit(EventPayload::TaskStatus {
                status: TaskStatus::Canceled,
                error: None,
            });
            return;
        }

        match delta {
            Ok(ModelDelta::Text { delta }) => {
                emit_tag_events(extractor.push(&delta));
            }
            Ok(ModelDelta::ToolCall(fragment)) => {
                if let Some(call) = assembler.push(&fragment) {
                    emit_tool_call(call);
                }
            }
            Ok(ModelDelta::Usage(usage)) => {
                emit(EventPayload::LlmUsage { usage });
            }
            Ok(ModelDelta::Done { finish_reason }) => {
                tracing::debug!(
                    context_id,
                    task_id,
                    finish_reason = finish_reason.as_deref().unwrap_or(""),
                    "upstream done"
                );
                break;
            }
            Err(e) => {
                // Partial assemblies are never emitted on failure.
                tracing::warn!(context_id, task_id, error = %e, "upstream stream error");
                assembler.discard();
                emit(EventPayload::TaskStatus {
                    status: TaskStatus::Failed,
                    error: Some(e.to_string()),
                });
                return;
            }
        }
    }

    if cancel.is_cancelled() {
        assembler.discard();
        emit(EventPayload::TaskStatus {
            status: TaskStatus::Canceled,
            error: None,
        });
        return;
    }

    // Upstream complete: flush both transducers, then close out.
    emit_tag_events(extractor.finish());
    for call in assembler.finish() {
        emit_tool_call(call);
    }

    emit(EventPayload::ContentComplete);
    emit(EventPayload::TaskStatus {
        status: TaskStatus::Completed,
        error: None,
    });
    emit(EventPayload::TaskComplete);
}

/// Fire-and-forget wrapper used by the invocation endpoint.
pub fn spawn_turn(
    coordinator: Arc<SessionCoordinator>,
    source: Arc<dyn AgentSource>,
    guard: TurnGuard,
    prompt: String,
    metadata: serde_json::Value,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_turn(coordinator, source, guard, prompt, metadata))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
