use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use strand_core::adapter::{
    EventStream, GenerationOptions, ProviderAdapter, TurnContext,
};
use strand_core::errors::ProviderError;
use strand_core::events::{AgentEvent, MessageDelta};
use strand_core::ids::ToolCallId;
use strand_core::messages::{
    AssistantContent, AssistantMessage, Message, Role, StopReason, ToolCallBlock,
};
use strand_core::tokens::{Pricing, TokenUsage};

/// Pre-programmed turns for deterministic testing without API calls.
pub enum MockTurn {
    /// Yield a fixed sequence of canonical events.
    Events(Vec<AgentEvent>),
    /// Fail the open() call itself.
    OpenError(ProviderError),
    /// Wait a duration, then yield the inner turn.
    Delay(Duration, Box<MockTurn>),
}

impl MockTurn {
    /// A complete text-only assistant turn.
    pub fn text(text: &str) -> Self {
        let message = AssistantMessage {
            content: vec![AssistantContent::Text { text: text.into() }],
            usage: Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                ..Default::default()
            }),
            stop_reason: Some(StopReason::EndTurn),
        };
        Self::Events(vec![
            AgentEvent::MessageStart { role: Role::Assistant },
            AgentEvent::MessageUpdate {
                role: Role::Assistant,
                delta: MessageDelta::Text { text: text.into() },
            },
            AgentEvent::MessageEnd {
                role: Role::Assistant,
                message: Message::Assistant(message),
            },
            AgentEvent::turn_end_ok(StopReason::EndTurn),
        ])
    }

    /// A turn requesting one tool call.
    pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        let tool_call = ToolCallBlock {
            id: ToolCallId::from_raw(id),
            name: name.into(),
            arguments,
        };
        let message = AssistantMessage {
            content: vec![AssistantContent::ToolCall(tool_call.clone())],
            usage: Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                ..Default::default()
            }),
            stop_reason: Some(StopReason::ToolUse),
        };
        Self::Events(vec![
            AgentEvent::MessageStart { role: Role::Assistant },
            AgentEvent::MessageUpdate {
                role: Role::Assistant,
                delta: MessageDelta::ToolCall { tool_call },
            },
            AgentEvent::MessageEnd {
                role: Role::Assistant,
                message: Message::Assistant(message),
            },
            AgentEvent::turn_end_ok(StopReason::ToolUse),
        ])
    }

    /// A stream that drops mid-message: partial text, then the synthetic
    /// message_end / turn_end{error} pair an adapter must produce.
    pub fn interrupted(partial_text: &str, error: ProviderError) -> Self {
        let message = AssistantMessage {
            content: vec![AssistantContent::Text { text: partial_text.into() }],
            usage: Some(TokenUsage::default()),
            stop_reason: Some(StopReason::Error),
        };
        Self::Events(vec![
            AgentEvent::MessageStart { role: Role::Assistant },
            AgentEvent::MessageUpdate {
                role: Role::Assistant,
                delta: MessageDelta::Text { text: partial_text.into() },
            },
            AgentEvent::MessageEnd {
                role: Role::Assistant,
                message: Message::Assistant(message),
            },
            AgentEvent::turn_end_error(&error),
        ])
    }

    /// A snapshot-only turn: message_start then message_end, no deltas.
    pub fn snapshot_only(text: &str) -> Self {
        Self::Events(vec![
            AgentEvent::MessageStart { role: Role::Assistant },
            AgentEvent::MessageEnd {
                role: Role::Assistant,
                message: Message::assistant_text(text),
            },
            AgentEvent::turn_end_ok(StopReason::EndTurn),
        ])
    }

    pub fn delayed(delay: Duration, inner: MockTurn) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock adapter that returns pre-programmed turns in sequence.
pub struct MockAdapter {
    turns: Mutex<Vec<Option<MockTurn>>>,
    call_count: AtomicUsize,
    context_window: usize,
}

impl MockAdapter {
    pub fn new(turns: Vec<MockTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().map(Some).collect()),
            call_count: AtomicUsize::new(0),
            context_window: 200_000,
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    fn pricing(&self) -> Pricing {
        Pricing {
            input_cents_per_mtok: 100.0,
            output_cents_per_mtok: 500.0,
        }
    }

    fn supports_thinking(&self) -> bool {
        true
    }

    async fn open(
        &self,
        _context: &TurnContext,
        _options: &GenerationOptions,
        _cancel: &CancellationToken,
    ) -> Result<EventStream, ProviderError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        let turn = self.turns.lock().get_mut(idx).and_then(Option::take);

        let mut turn = turn.ok_or_else(|| {
            ProviderError::InvalidRequest(format!("MockAdapter: no turn configured for call {idx}"))
        })?;

        loop {
            match turn {
                MockTurn::Events(events) => {
                    return Ok(Box::pin(stream::iter(events)));
                }
                MockTurn::OpenError(e) => return Err(e),
                MockTurn::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    turn = *inner;
                }
            }
        }
    }
}
