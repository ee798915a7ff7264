//! The agent-source seam.
//!
//! The gateway consumes an agent-produced stream of model deltas; how
//! those deltas are obtained (which provider, which prompt assembly) is
//! outside this workspace. Deployments plug in their own source; the
//! bundled [`EchoSource`] scripts a deterministic stream from the prompt
//! so the whole pipeline runs end-to-end in dev and tests.

use async_trait::async_trait;

use aw_domain::delta::{BoxStream, ModelDelta, ToolCallFragment};
use aw_domain::event::UsageCounters;
use aw_domain::Result;

/// One turn's input, as resolved by the invocation endpoint.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub context_id: String,
    pub task_id: String,
    pub prompt: String,
    /// Extra body fields forwarded verbatim.
    pub metadata: serde_json::Value,
}

/// Produces the upstream delta stream for a turn.
#[async_trait]
pub trait AgentSource: Send + Sync {
    async fn stream_turn(
        &self,
        request: TurnRequest,
    ) -> Result<BoxStream<'static, Result<ModelDelta>>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Echo source (dev / tests)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Streams a canned response: a short inline reasoning tag, the prompt
/// echoed back in small chunks, and usage counters.
#[derive(Debug, Default)]
pub struct EchoSource;

#[async_trait]
impl AgentSource for EchoSource {
    async fn stream_turn(
        &self,
        request: TurnRequest,
    ) -> Result<BoxStream<'static, Result<ModelDelta>>> {
        let prompt = request.prompt;
        let stream = async_stream::stream! {
            yield Ok(ModelDelta::Text {
                delta: "<thought>echoing the prompt</thought>".into(),
            });

            // Echo in word-sized chunks, like a real token stream.
            let words: Vec<String> = prompt.split_inclusive(' ').map(String::from).collect();
            let total = words.len() as u32;
            for word in words {
                yield Ok(ModelDelta::Text { delta: word });
            }

            yield Ok(ModelDelta::Usage(UsageCounters {
                input_tokens: total,
                output_tokens: total,
                total_tokens: total * 2,
            }));
            yield Ok(ModelDelta::Done {
                finish_reason: Some("stop".into()),
            });
        };
        Ok(Box::pin(stream))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted source (tests)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Replays a fixed delta script. Used by tests to drive the turn driver
/// through exact upstream sequences, including errors.
pub struct ScriptedSource {
    deltas: Vec<Result<ModelDelta>>,
}

impl ScriptedSource {
    pub fn new(deltas: Vec<Result<ModelDelta>>) -> Self {
        Self { deltas }
    }

    /// A script that emits one chunked tool call (id, name, then split
    /// arguments) followed by a clean end.
    pub fn tool_call_script(name: &str, arguments: &str) -> Self {
        let midpoint = arguments.len() / 2;
        let (head, tail) = arguments.split_at(midpoint);
        Self::new(vec![
            Ok(ModelDelta::ToolCall(ToolCallFragment::id(0, "call_1"))),
            Ok(ModelDelta::ToolCall(ToolCallFragment::name(0, name))),
            Ok(ModelDelta::ToolCall(ToolCallFragment::arguments(0, head))),
            Ok(ModelDelta::ToolCall(ToolCallFragment::arguments(0, tail))),
            Ok(ModelDelta::Done {
                finish_reason: Some("tool_calls".into()),
            }),
        ])
    }
}

#[async_trait]
impl AgentSource for ScriptedSource {
    async fn stream_turn(
        &self,
        _request: TurnRequest,
    ) -> Result<BoxStream<'static, Result<ModelDelta>>> {
        // Results are not Clone (errors aren't); re-encode the script.
        let deltas: Vec<Result<ModelDelta>> = self
            .deltas
            .iter()
            .map(|item| match item {
                Ok(delta) => Ok(delta.clone()),
                Err(e) => Err(aw_domain::Error::Upstream(e.to_string())),
            })
            .collect();
        let stream = async_stream::stream! {
            for delta in deltas {
                yield delta;
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn echo_source_ends_with_done() {
        let source = EchoSource;
        let request = TurnRequest {
            context_id: "ctx".into(),
            task_id: "task".into(),
            prompt: "hello world".into(),
            metadata: serde_json::Value::Null,
        };
        let deltas: Vec<_> = source
            .stream_turn(request)
            .await
            .unwrap()
            .collect()
            .await;

        assert!(matches!(
            deltas.last(),
            Some(Ok(ModelDelta::Done { .. }))
        ));
        // Echoed text reassembles to the prompt.
        let text: String = deltas
            .iter()
            .filter_map(|d| match d {
                Ok(ModelDelta::Text { delta }) => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert!(text.ends_with("hello world"));
    }

    #[tokio::test]
    async fn scripted_source_replays_errors() {
        let source = ScriptedSource::new(vec![
            Ok(ModelDelta::Text { delta: "x".into() }),
            Err(aw_domain::Error::Upstream("provider died".into())),
        ]);
        let request = TurnRequest {
            context_id: "ctx".into(),
            task_id: "task".into(),
            prompt: "p".into(),
            metadata: serde_json::Value::Null,
        };
        let deltas: Vec<_> = source
            .stream_turn(request)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(deltas.len(), 2);
        assert!(deltas[1].is_err());
    }
}
