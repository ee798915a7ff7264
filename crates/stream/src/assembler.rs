//! Tool-call assembly — collapses streamed fragments into complete calls.
//!
//! Providers split one tool call across many deltas: the id in one chunk,
//! the name in another, the JSON arguments scattered over the rest. Each
//! fragment carries an `index` naming the call slot within the response;
//! fragments with the same index accumulate into one slot.
//!
//! A slot is emitted as soon as its name is known and its arguments parse
//! as a complete JSON document, so downstream tool execution can overlap
//! with the rest of the generation. Slots that never become valid are
//! discarded at the end of the stream.

use std::collections::BTreeMap;

use aw_domain::delta::{AssembledToolCall, ToolCallFragment};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-index accumulator.
#[derive(Debug, Default)]
struct Slot {
    id: Option<String>,
    call_type: Option<String>,
    name: String,
    arguments: String,
    emitted: bool,
}

impl Slot {
    /// Emit the slot if the predicate holds: non-empty name, and
    /// arguments that are non-empty and valid JSON after a trim.
    fn try_emit(&mut self, index: u32) -> Option<AssembledToolCall> {
        if self.emitted || self.name.is_empty() {
            return None;
        }
        let arguments = self.arguments.trim();
        if arguments.is_empty() {
            return None;
        }
        if serde_json::from_str::<serde_json::Value>(arguments).is_err() {
            return None;
        }

        self.emitted = true;
        Some(AssembledToolCall {
            index,
            id: self
                .id
                .clone()
                .unwrap_or_else(|| index.to_string()),
            call_type: self
                .call_type
                .clone()
                .unwrap_or_else(|| "function".into()),
            name: self.name.clone(),
            arguments: arguments.to_string(),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Assembler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lazy transducer over tool-call fragments.
///
/// Feed fragments with [`push`](Self::push) as they arrive; call
/// [`finish`](Self::finish) when the upstream completes to flush any slot
/// that only just became valid. Each slot emits at most once.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    slots: BTreeMap<u32, Slot>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment into its slot. Returns the assembled call if
    /// this fragment completed the slot.
    pub fn push(&mut self, fragment: &ToolCallFragment) -> Option<AssembledToolCall> {
        let slot = self.slots.entry(fragment.index).or_default();

        if let Some(id) = &fragment.id {
            slot.id = Some(id.clone());
        }
        if let Some(call_type) = &fragment.call_type {
            slot.call_type = Some(call_type.clone());
        }
        if let Some(function) = &fragment.function {
            if let Some(name) = &function.name {
                slot.name = name.clone();
            }
            if let Some(arguments) = &function.arguments {
                slot.arguments.push_str(arguments);
            }
        }

        slot.try_emit(fragment.index)
    }

    /// Upstream completed: re-test every un-emitted slot once, in index
    /// order, and discard the rest. Partial calls are never emitted.
    pub fn finish(&mut self) -> Vec<AssembledToolCall> {
        let mut completed = Vec::new();
        for (index, slot) in self.slots.iter_mut() {
            if let Some(call) = slot.try_emit(*index) {
                completed.push(call);
            } else if !slot.emitted {
                tracing::debug!(
                    index,
                    name = %slot.name,
                    arguments_len = slot.arguments.len(),
                    "discarding incomplete tool-call slot"
                );
            }
        }
        self.slots.clear();
        completed
    }

    /// Drop all state without emitting (used on cancellation or upstream
    /// failure).
    pub fn discard(&mut self) {
        self.slots.clear();
    }

    /// Number of slots still accumulating (un-emitted).
    pub fn pending(&self) -> usize {
        self.slots.values().filter(|s| !s.emitted).count()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
