//! Wire shape of streamed model output.
//!
//! Providers emit these deltas over SSE; the streaming aggregator turns
//! them into well-formed [`crate::event::AgentEvent`]s. Only the shape
//! matters here — concrete provider clients live outside this workspace.

use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::event::UsageCounters;

/// A boxed async stream, used for upstream model streaming.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool-call fragments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Partial function payload within a tool-call fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Partial arguments text; concatenated across fragments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// One streamed delta of a tool call. `index` identifies the call slot
/// within a single model response; fragments with the same index
/// accumulate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub call_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionFragment>,
}

impl ToolCallFragment {
    /// Convenience constructor for an arguments-only fragment.
    pub fn arguments(index: u32, arguments: impl Into<String>) -> Self {
        Self {
            index,
            function: Some(FunctionFragment {
                name: None,
                arguments: Some(arguments.into()),
            }),
            ..Self::default()
        }
    }

    /// Convenience constructor for a name-only fragment.
    pub fn name(index: u32, name: impl Into<String>) -> Self {
        Self {
            index,
            function: Some(FunctionFragment {
                name: Some(name.into()),
                arguments: None,
            }),
            ..Self::default()
        }
    }

    /// Convenience constructor for an id-only fragment.
    pub fn id(index: u32, id: impl Into<String>) -> Self {
        Self {
            index,
            id: Some(id.into()),
            ..Self::default()
        }
    }
}

/// A tool call the assembler has accepted: the name is known and the
/// arguments form a complete JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledToolCall {
    pub index: u32,
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub name: String,
    /// Complete, parseable JSON arguments text.
    pub arguments: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model deltas
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One upstream streaming delta, as split by the provider's SSE chunking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelDelta {
    /// A chunk of assistant text. May split anywhere, including inside an
    /// inline reasoning tag.
    Text { delta: String },
    /// A tool-call fragment.
    ToolCall(ToolCallFragment),
    /// Token usage counters (typically once, near the end).
    Usage(UsageCounters),
    /// The provider signalled the end of the response.
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_deserializes_openai_shape() {
        let raw = r#"{"index":0,"id":"call_1","type":"function","function":{"name":"get_weather","arguments":"{\"loc"}}"#;
        let frag: ToolCallFragment = serde_json::from_str(raw).unwrap();
        assert_eq!(frag.index, 0);
        assert_eq!(frag.id.as_deref(), Some("call_1"));
        assert_eq!(frag.call_type.as_deref(), Some("function"));
        let function = frag.function.unwrap();
        assert_eq!(function.name.as_deref(), Some("get_weather"));
        assert_eq!(function.arguments.as_deref(), Some("{\"loc"));
    }

    #[test]
    fn fragment_fields_all_optional() {
        let frag: ToolCallFragment = serde_json::from_str(r#"{"index":3}"#).unwrap();
        assert_eq!(frag.index, 3);
        assert!(frag.id.is_none());
        assert!(frag.function.is_none());
    }

    #[test]
    fn delta_round_trip() {
        let deltas = vec![
            ModelDelta::Text {
                delta: "hi".into(),
            },
            ModelDelta::ToolCall(ToolCallFragment::id(0, "call_1")),
            ModelDelta::Usage(UsageCounters {
                input_tokens: 1,
                output_tokens: 2,
                total_tokens: 3,
            }),
            ModelDelta::Done {
                finish_reason: Some("stop".into()),
            },
        ];
        for delta in deltas {
            let json = serde_json::to_string(&delta).unwrap();
            let back: ModelDelta = serde_json::from_str(&json).unwrap();
            assert_eq!(back, delta);
        }
    }
}
