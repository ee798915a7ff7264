pub mod cancel;
pub mod coordinator;
pub mod source;
pub mod turn;

pub use cancel::CancelToken;
pub use coordinator::{SessionCoordinator, TurnGuard};
pub use source::{AgentSource, EchoSource, TurnRequest};
