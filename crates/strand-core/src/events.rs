use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;
use crate::messages::{Message, Role, StopReason, ToolCallBlock};

/// The canonical event vocabulary. Every adapter emits it, every consumer
/// reads it. Strict ordering contract within one agent run:
///
/// AgentStart → (TurnStart → message events → TurnEnd)+ → AgentEnd
///
/// For each role, MessageStart is followed by zero or more MessageUpdate
/// events and exactly one MessageEnd before another MessageStart of that
/// role may occur. Sequence order is the only ordering guarantee.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    #[serde(rename = "agent_start")]
    AgentStart,

    #[serde(rename = "turn_start")]
    TurnStart { turn: u32 },

    #[serde(rename = "message_start")]
    MessageStart { role: Role },

    #[serde(rename = "message_update")]
    MessageUpdate { role: Role, delta: MessageDelta },

    /// The full message snapshot is authoritative even when deltas were
    /// incomplete or never arrived. Consumers render and store from it.
    #[serde(rename = "message_end")]
    MessageEnd { role: Role, message: Message },

    #[serde(rename = "turn_end")]
    TurnEnd {
        stop_reason: StopReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorInfo>,
    },

    #[serde(rename = "agent_end")]
    AgentEnd,
}

/// Incremental content inside a MessageUpdate. Tool calls only ever appear
/// here complete and parseable; argument fragments are accumulated inside
/// the adapter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum MessageDelta {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking { text: String },
    #[serde(rename = "tool_call")]
    ToolCall { tool_call: ToolCallBlock },
}

/// Lightweight error info carried on turn_end events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
    pub transient: bool,
}

impl From<&ProviderError> for ErrorInfo {
    fn from(e: &ProviderError) -> Self {
        Self {
            kind: e.error_kind().to_string(),
            message: e.to_string(),
            transient: e.is_transient(),
        }
    }
}

impl AgentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AgentStart => "agent_start",
            Self::TurnStart { .. } => "turn_start",
            Self::MessageStart { .. } => "message_start",
            Self::MessageUpdate { .. } => "message_update",
            Self::MessageEnd { .. } => "message_end",
            Self::TurnEnd { .. } => "turn_end",
            Self::AgentEnd => "agent_end",
        }
    }

    /// Terminal events close out the current turn or the whole run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TurnEnd { .. } | Self::AgentEnd)
    }

    pub fn turn_end_ok(stop_reason: StopReason) -> Self {
        Self::TurnEnd { stop_reason, error: None }
    }

    pub fn turn_end_error(error: &ProviderError) -> Self {
        let stop_reason = if matches!(error, ProviderError::Cancelled) {
            StopReason::Cancelled
        } else {
            StopReason::Error
        };
        Self::TurnEnd {
            stop_reason,
            error: Some(ErrorInfo::from(error)),
        }
    }
}
