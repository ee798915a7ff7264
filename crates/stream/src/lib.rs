//! Streaming transducers for AgentWire.
//!
//! Two pure, incremental parsers sit between raw model output and the
//! event stream: the tool-call assembler (collapses fragmented tool-call
//! deltas into complete calls) and the inline-tag extractor (splits a
//! chunked text stream into user content and embedded reasoning tags).
//! Both tolerate arbitrary chunk boundaries and flush on completion.

pub mod assembler;
pub mod tags;

pub use assembler::ToolCallAssembler;
pub use tags::{Tag, TagEvent, TagExtractor};
