use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use strand_core::adapter::{
    EventStream, GenerationOptions, ProviderAdapter, ThinkingLevel, TurnContext,
};
use strand_core::config::Backend;
use strand_core::errors::ProviderError;
use strand_core::events::AgentEvent;
use strand_core::messages::{
    AssistantContent, Message, StopReason, ToolResultContent, UserContent,
};
use strand_core::tokens::Pricing;

use crate::assemble::StreamAssembler;
use crate::models::{self, ModelInfo};
use crate::wire::{FrameParser, WireStream};

const API_URL: &str = "https://api.openai.com";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Adapter for the OpenAI chat-completions API (chunked streaming with
/// `data:` lines and a `[DONE]` sentinel).
pub struct OpenAiAdapter {
    client: Client,
    api_key: SecretString,
    model_info: &'static ModelInfo,
    base_url: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: SecretString, model: Option<&str>) -> Result<Self, ProviderError> {
        let model_info = match model {
            Some(name) => models::find_model(Backend::OpenAi, name)
                .ok_or_else(|| ProviderError::UnsupportedModel(name.to_string()))?,
            None => models::default_model(Backend::OpenAi),
        };
        Ok(Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .map_err(|e| ProviderError::NetworkError(e.to_string()))?,
            api_key,
            model_info,
            base_url: API_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_request_body(&self, context: &TurnContext, options: &GenerationOptions) -> Value {
        let mut body = json!({
            "model": self.model_info.name,
            "stream": true,
            "stream_options": {"include_usage": true},
            "messages": convert_messages(context),
        });

        if !context.tools.is_empty() {
            body["tools"] = context
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters_schema,
                        },
                    })
                })
                .collect();
        }
        if let Some(max_tokens) = options.max_tokens {
            body["max_completion_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if !options.stop_sequences.is_empty() {
            body["stop"] = json!(options.stop_sequences);
        }
        if self.model_info.supports_thinking {
            body["reasoning_effort"] = json!(reasoning_effort(options.thinking));
        }
        body
    }
}

fn reasoning_effort(level: ThinkingLevel) -> &'static str {
    match level {
        ThinkingLevel::Minimal => "minimal",
        ThinkingLevel::Low => "low",
        ThinkingLevel::Medium => "medium",
        ThinkingLevel::High | ThinkingLevel::Xhigh => "high",
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        self.model_info.name
    }

    fn context_window(&self) -> usize {
        self.model_info.context_window
    }

    fn pricing(&self) -> Pricing {
        self.model_info.pricing
    }

    fn supports_thinking(&self) -> bool {
        self.model_info.supports_thinking
    }

    #[instrument(skip(self, context, options, cancel), fields(model = %self.model_info.name))]
    async fn open(
        &self,
        context: &TurnContext,
        options: &GenerationOptions,
        cancel: &CancellationToken,
    ) -> Result<EventStream, ProviderError> {
        let body = self.build_request_body(context, options);
        let url = format!("{}/v1/chat/completions", self.base_url);

        let resp = self
            .client
            .post(&url)
            .header(
                "authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("accept", "text/event-stream")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let stream = WireStream::new(
            resp.bytes_stream(),
            ChunkFrameParser::new(),
            IDLE_TIMEOUT,
            cancel,
        );
        Ok(Box::pin(stream))
    }
}

/// Convert the canonical transcript into chat-completions wire messages.
/// The system prompt rides as a leading system message; tool results are
/// role "tool" entries keyed by tool_call_id on this wire.
fn convert_messages(context: &TurnContext) -> Vec<Value> {
    let mut wire = Vec::with_capacity(context.messages.len() + 1);
    if let Some(system) = &context.system_prompt {
        wire.push(json!({"role": "system", "content": system}));
    }
    for msg in &context.messages {
        match msg {
            Message::User(user) => {
                let text: String = user
                    .content
                    .iter()
                    .map(|c| match c {
                        UserContent::Text { text } => text.as_str(),
                    })
                    .collect::<Vec<_>>()
                    .join("");
                wire.push(json!({"role": "user", "content": text}));
            }
            Message::Assistant(assistant) => {
                let text = assistant.text_content();
                let tool_calls: Vec<Value> = assistant
                    .tool_calls()
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id.as_str(),
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments.to_string(),
                            },
                        })
                    })
                    .collect();
                let mut entry = json!({"role": "assistant"});
                entry["content"] = if text.is_empty() { Value::Null } else { json!(text) };
                if !tool_calls.is_empty() {
                    entry["tool_calls"] = json!(tool_calls);
                }
                wire.push(entry);
            }
            Message::Tool(result) => {
                let text: String = result
                    .content
                    .iter()
                    .map(|c| match c {
                        ToolResultContent::Text { text } => text.as_str(),
                    })
                    .collect::<Vec<_>>()
                    .join("");
                wire.push(json!({
                    "role": "tool",
                    "tool_call_id": result.tool_call_id.as_str(),
                    "content": text,
                }));
            }
        }
    }
    wire
}

/// Parses chat-completions streaming chunks and drives the assembler.
/// Tool-call argument fragments arrive keyed by index; a change of index
/// closes the previous call.
pub(crate) struct ChunkFrameParser {
    current_tool_index: Option<u64>,
}

impl ChunkFrameParser {
    pub(crate) fn new() -> Self {
        Self {
            current_tool_index: None,
        }
    }

    fn apply_chunk(
        &mut self,
        data: &str,
        assembler: &mut StreamAssembler,
    ) -> Result<Vec<AgentEvent>, ProviderError> {
        if data == "[DONE]" {
            return assembler.finish();
        }

        let chunk: ChatChunk = serde_json::from_str(data)
            .map_err(|e| ProviderError::MalformedResponse(format!("bad chunk: {e}")))?;

        let mut events = Vec::new();

        if let Some(usage) = chunk.usage {
            let cached = usage
                .prompt_tokens_details
                .and_then(|d| d.cached_tokens)
                .unwrap_or(0);
            let prompt = usage.prompt_tokens.unwrap_or(0);
            assembler.set_input_usage(prompt.saturating_sub(cached), cached, 0);
            assembler.set_output_tokens(usage.completion_tokens.unwrap_or(0));
        }

        for choice in chunk.choices {
            if let Some(delta) = choice.delta {
                if let Some(content) = delta.content {
                    if !content.is_empty() {
                        events.extend(assembler.text_delta(&content));
                    }
                }
                for fragment in delta.tool_calls.unwrap_or_default() {
                    if self.current_tool_index != Some(fragment.index) {
                        events.extend(assembler.end_block()?);
                        let id = fragment.id.as_deref().unwrap_or("");
                        let name = fragment
                            .function
                            .as_ref()
                            .and_then(|f| f.name.as_deref())
                            .unwrap_or("");
                        events.extend(assembler.begin_tool_call(id, name)?);
                        self.current_tool_index = Some(fragment.index);
                    }
                    if let Some(arguments) =
                        fragment.function.as_ref().and_then(|f| f.arguments.as_deref())
                    {
                        assembler.tool_arguments_delta(arguments);
                    }
                }
            }
            if let Some(reason) = choice.finish_reason {
                assembler.set_stop_reason(map_finish_reason(&reason));
            }
        }

        Ok(events)
    }
}

impl FrameParser for ChunkFrameParser {
    fn drain(
        &mut self,
        buffer: &mut String,
        assembler: &mut StreamAssembler,
    ) -> Result<Vec<AgentEvent>, ProviderError> {
        let mut events = Vec::new();
        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim().to_string();
            buffer.replace_range(..pos + 1, "");
            if let Some(data) = line.strip_prefix("data: ") {
                events.extend(self.apply_chunk(data, assembler)?);
            }
        }
        Ok(events)
    }

    fn finish_buffer(
        &mut self,
        buffer: &mut String,
        assembler: &mut StreamAssembler,
    ) -> Result<Vec<AgentEvent>, ProviderError> {
        let remaining = std::mem::take(buffer).trim().to_string();
        if let Some(data) = remaining.strip_prefix("data: ") {
            return self.apply_chunk(data, assembler);
        }
        Ok(Vec::new())
    }
}

fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "tool_calls" => StopReason::ToolUse,
        "length" => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    }
}

// --- Deserialization types for chat-completions chunks ---

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<ChunkUsage>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallFragment>>,
}

#[derive(Deserialize)]
struct ToolCallFragment {
    index: u64,
    id: Option<String>,
    function: Option<FunctionFragment>,
}

#[derive(Deserialize)]
struct FunctionFragment {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct ChunkUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Deserialize)]
struct PromptTokensDetails {
    cached_tokens: Option<u32>,
}
