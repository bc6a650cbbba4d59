//! Agent orchestration: the turn-driving state machine, tool dispatch with
//! exclusion-class scheduling, and the built-in tool set.

pub mod backoff;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod tools;
pub mod truncate;

pub use error::EngineError;
pub use orchestrator::{AgentState, Orchestrator};
