use strand_core::errors::ProviderError;
use strand_core::events::ErrorInfo;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The turn never opened: a fatal error or retries exhausted.
    /// Orchestration moves to the Failed state.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A committed stream ended in error (interruption, malformed frame).
    /// Partial output is preserved and the session stays resumable.
    #[error("turn failed: {} ({})", .0.message, .0.kind)]
    TurnFailed(ErrorInfo),

    /// Cancellation was requested and honored.
    #[error("aborted")]
    Aborted,

    /// A new turn was started while one was in flight.
    #[error("a turn is already in flight")]
    Busy,

    #[error("max turns exceeded: {0}")]
    MaxTurnsExceeded(u32),

    #[error("{0}")]
    Internal(String),
}
