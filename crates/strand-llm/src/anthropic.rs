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

const API_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const SSE_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Adapter for the Anthropic messages API (SSE streaming).
pub struct AnthropicAdapter {
    client: Client,
    api_key: SecretString,
    model_info: &'static ModelInfo,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new(api_key: SecretString, model: Option<&str>) -> Result<Self, ProviderError> {
        let model_info = match model {
            Some(name) => models::find_model(Backend::Anthropic, name)
                .ok_or_else(|| ProviderError::UnsupportedModel(name.to_string()))?,
            None => models::default_model(Backend::Anthropic),
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
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": true,
            "messages": convert_messages(&context.messages),
        });

        if let Some(system) = &context.system_prompt {
            body["system"] = json!(system);
        }
        if !context.tools.is_empty() {
            body["tools"] = context
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters_schema,
                    })
                })
                .collect();
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if !options.stop_sequences.is_empty() {
            body["stop_sequences"] = json!(options.stop_sequences);
        }
        if self.model_info.supports_thinking {
            if let Some(budget) = options.thinking.budget_tokens() {
                body["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
            }
        }
        body
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
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
        let url = format!("{}/v1/messages", self.base_url);

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("accept", "application/json")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = resp.text().await.unwrap_or_default();
            let mut err = ProviderError::from_status(status, body);
            if let ProviderError::RateLimited { retry_after: ra } = &mut err {
                *ra = retry_after;
            }
            return Err(err);
        }

        let stream = WireStream::new(
            resp.bytes_stream(),
            SseFrameParser::new(),
            SSE_IDLE_TIMEOUT,
            cancel,
        );
        Ok(Box::pin(stream))
    }
}

/// Convert the canonical transcript into Anthropic wire messages. Tool
/// results travel as user-role tool_result blocks on this wire.
fn convert_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| match msg {
            Message::User(user) => {
                let content: Vec<Value> = user
                    .content
                    .iter()
                    .map(|c| match c {
                        UserContent::Text { text } => json!({"type": "text", "text": text}),
                    })
                    .collect();
                json!({"role": "user", "content": content})
            }
            Message::Assistant(assistant) => {
                let content: Vec<Value> = assistant
                    .content
                    .iter()
                    .map(|c| match c {
                        AssistantContent::Text { text } => {
                            json!({"type": "text", "text": text})
                        }
                        AssistantContent::Thinking { text, signature } => {
                            let mut block = json!({"type": "thinking", "thinking": text});
                            if let Some(sig) = signature {
                                block["signature"] = json!(sig);
                            }
                            block
                        }
                        AssistantContent::ToolCall(tc) => json!({
                            "type": "tool_use",
                            "id": tc.id.as_str(),
                            "name": tc.name,
                            "input": tc.arguments,
                        }),
                    })
                    .collect();
                json!({"role": "assistant", "content": content})
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
                json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": result.tool_call_id.as_str(),
                        "content": [{"type": "text", "text": text}],
                        "is_error": result.is_error,
                    }],
                })
            }
        })
        .collect()
}

/// Parses Anthropic SSE frames (event/data line pairs separated by blank
/// lines) and drives the assembler.
pub(crate) struct SseFrameParser {
    _private: (),
}

impl SseFrameParser {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }

    fn apply_frame(
        &mut self,
        event_type: &str,
        data: &str,
        assembler: &mut StreamAssembler,
    ) -> Result<Vec<AgentEvent>, ProviderError> {
        match event_type {
            "message_start" => {
                if let Ok(msg) = serde_json::from_str::<MessageStartEvent>(data) {
                    if let Some(usage) = msg.message.usage {
                        assembler.set_input_usage(
                            usage.input_tokens.unwrap_or(0),
                            usage.cache_read_input_tokens.unwrap_or(0),
                            usage.cache_creation_input_tokens.unwrap_or(0),
                        );
                    }
                }
                Ok(assembler.begin_message())
            }

            "content_block_start" => {
                let block: ContentBlockStartEvent = serde_json::from_str(data).map_err(|e| {
                    ProviderError::MalformedResponse(format!("bad content_block_start: {e}"))
                })?;
                match block.content_block.get("type").and_then(|t| t.as_str()) {
                    Some("text") | Some("thinking") => Ok(assembler.begin_message()),
                    Some("tool_use") => {
                        let id = block
                            .content_block
                            .get("id")
                            .and_then(|v| v.as_str())
                            .unwrap_or("");
                        let name = block
                            .content_block
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or("");
                        assembler.begin_tool_call(id, name)
                    }
                    _ => Ok(Vec::new()),
                }
            }

            "content_block_delta" => {
                let delta: ContentBlockDeltaEvent = serde_json::from_str(data).map_err(|e| {
                    ProviderError::MalformedResponse(format!("bad content_block_delta: {e}"))
                })?;
                match delta.delta.get("type").and_then(|t| t.as_str()) {
                    Some("text_delta") => {
                        let text = delta.delta.get("text").and_then(|t| t.as_str()).unwrap_or("");
                        Ok(assembler.text_delta(text))
                    }
                    Some("thinking_delta") => {
                        let text = delta
                            .delta
                            .get("thinking")
                            .and_then(|t| t.as_str())
                            .unwrap_or("");
                        Ok(assembler.thinking_delta(text))
                    }
                    Some("input_json_delta") => {
                        let partial = delta
                            .delta
                            .get("partial_json")
                            .and_then(|t| t.as_str())
                            .unwrap_or("");
                        assembler.tool_arguments_delta(partial);
                        Ok(Vec::new())
                    }
                    Some("signature_delta") => {
                        let sig = delta
                            .delta
                            .get("signature")
                            .and_then(|t| t.as_str())
                            .unwrap_or("");
                        assembler.thinking_signature(sig);
                        Ok(Vec::new())
                    }
                    _ => Ok(Vec::new()),
                }
            }

            "content_block_stop" => assembler.end_block(),

            "message_delta" => {
                if let Ok(delta) = serde_json::from_str::<MessageDeltaEvent>(data) {
                    if let Some(usage) = delta.usage {
                        assembler.set_output_tokens(usage.output_tokens.unwrap_or(0));
                    }
                    if let Some(reason) = delta
                        .delta
                        .as_ref()
                        .and_then(|d| d.get("stop_reason"))
                        .and_then(|r| r.as_str())
                    {
                        assembler.set_stop_reason(map_stop_reason(reason));
                    }
                }
                Ok(Vec::new())
            }

            "message_stop" => assembler.finish(),

            "error" => {
                let err: ErrorEvent = serde_json::from_str(data).map_err(|e| {
                    ProviderError::MalformedResponse(format!("bad error event: {e}"))
                })?;
                Err(classify_error(&err))
            }

            _ => Ok(Vec::new()), // ping, etc.
        }
    }
}

impl FrameParser for SseFrameParser {
    fn drain(
        &mut self,
        buffer: &mut String,
        assembler: &mut StreamAssembler,
    ) -> Result<Vec<AgentEvent>, ProviderError> {
        let mut events = Vec::new();
        while let Some(pos) = buffer.find("\n\n") {
            let chunk = buffer[..pos].to_string();
            buffer.replace_range(..pos + 2, "");
            if let Some((event_type, data)) = parse_sse_frame(&chunk) {
                events.extend(self.apply_frame(&event_type, &data, assembler)?);
            }
        }
        Ok(events)
    }

    fn finish_buffer(
        &mut self,
        buffer: &mut String,
        assembler: &mut StreamAssembler,
    ) -> Result<Vec<AgentEvent>, ProviderError> {
        let remaining = std::mem::take(buffer);
        if let Some((event_type, data)) = parse_sse_frame(&remaining) {
            return self.apply_frame(&event_type, &data, assembler);
        }
        Ok(Vec::new())
    }
}

/// Extract (event, data) from one SSE frame's lines.
fn parse_sse_frame(chunk: &str) -> Option<(String, String)> {
    let mut event_type = None;
    let mut data = String::new();
    for line in chunk.lines() {
        if let Some(event) = line.strip_prefix("event: ") {
            event_type = Some(event.to_string());
        } else if let Some(d) = line.strip_prefix("data: ") {
            data.push_str(d);
        }
    }
    event_type.map(|e| (e, data))
}

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "tool_use" => StopReason::ToolUse,
        "max_tokens" => StopReason::MaxTokens,
        "stop_sequence" => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

fn classify_error(err: &ErrorEvent) -> ProviderError {
    match err.error.error_type.as_str() {
        "overloaded_error" => ProviderError::ProviderOverloaded,
        "rate_limit_error" => ProviderError::RateLimited { retry_after: None },
        "authentication_error" => ProviderError::AuthenticationFailed(err.error.message.clone()),
        "invalid_request_error" => ProviderError::InvalidRequest(err.error.message.clone()),
        _ => ProviderError::ServerError {
            status: 500,
            body: err.error.message.clone(),
        },
    }
}

// --- Deserialization types for Anthropic SSE events ---

#[derive(Deserialize)]
struct MessageStartEvent {
    message: MessageStartPayload,
}

#[derive(Deserialize)]
struct MessageStartPayload {
    usage: Option<UsagePayload>,
}

#[derive(Deserialize)]
struct UsagePayload {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
    cache_read_input_tokens: Option<u32>,
    cache_creation_input_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ContentBlockStartEvent {
    #[allow(dead_code)]
    index: usize,
    content_block: Value,
}

#[derive(Deserialize)]
struct ContentBlockDeltaEvent {
    delta: Value,
}

#[derive(Deserialize)]
struct MessageDeltaEvent {
    delta: Option<Value>,
    usage: Option<UsagePayload>,
}

#[derive(Deserialize)]
struct ErrorEvent {
    error: ErrorPayload,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}
