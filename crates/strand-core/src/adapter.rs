use std::pin::Pin;
use std::str::FromStr;

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderError;
use crate::events::AgentEvent;
use crate::messages::Message;
use crate::tokens::Pricing;
use crate::tools::ToolDefinition;

/// A lazy, finite, non-restartable sequence of canonical events, terminated
/// by a turn_end (success or error).
pub type EventStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

/// Everything a provider needs to run one turn: the transcript, the system
/// prompt, and the tools the model may call.
#[derive(Clone, Debug, Default)]
pub struct TurnContext {
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    pub tools: Vec<ToolDefinition>,
}

impl TurnContext {
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            system_prompt: None,
            tools: Vec::new(),
        }
    }
}

/// Options controlling generation behavior.
#[derive(Clone, Debug)]
pub struct GenerationOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub thinking: ThinkingLevel,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: None,
            temperature: None,
            thinking: ThinkingLevel::Medium,
            stop_sequences: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingLevel {
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

impl ThinkingLevel {
    /// Thinking token budget for providers that take one. Minimal disables
    /// extended thinking entirely.
    pub fn budget_tokens(&self) -> Option<u32> {
        match self {
            Self::Minimal => None,
            Self::Low => Some(2_000),
            Self::Medium => Some(8_000),
            Self::High => Some(16_000),
            Self::Xhigh => Some(32_000),
        }
    }
}

impl FromStr for ThinkingLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimal" => Ok(Self::Minimal),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "xhigh" => Ok(Self::Xhigh),
            other => Err(format!("unknown thinking level: {other}")),
        }
    }
}

/// Trait implemented by each provider adapter (Anthropic, OpenAI, mock).
///
/// Contract for `open`:
/// - message_start precedes any message_update/message_end for that role;
/// - on transport interruption mid-stream the adapter emits a synthetic
///   message_end carrying whatever partial content is known, then
///   turn_end{error}; output already received is never silently dropped;
/// - tool-call argument fragments are accumulated internally and only
///   surface as complete, parseable calls; unparseable accumulated
///   arguments surface as turn_end{error};
/// - triggering the cancellation token closes the stream, yielding the
///   synthetic message_end / turn_end{cancelled} pair.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn context_window(&self) -> usize;
    fn pricing(&self) -> Pricing;
    fn supports_thinking(&self) -> bool;

    async fn open(
        &self,
        context: &TurnContext,
        options: &GenerationOptions,
        cancel: &CancellationToken,
    ) -> Result<EventStream, ProviderError>;
}
