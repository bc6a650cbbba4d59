//! Shared vocabulary for the strand agent core: the canonical event model,
//! conversation messages, token accounting, the provider-adapter and tool
//! contracts, session state, and the configuration surface.

pub mod adapter;
pub mod config;
pub mod errors;
pub mod events;
pub mod ids;
pub mod messages;
pub mod session;
pub mod tokens;
pub mod tools;
