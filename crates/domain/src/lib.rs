//! Shared domain types for AgentWire.
//!
//! Everything here is plain data: the event model streamed to clients,
//! the wire shape of upstream model deltas, configuration, and the shared
//! error type. No IO, no runtime state.

pub mod config;
pub mod delta;
pub mod error;
pub mod event;

pub use error::{Error, Result};
