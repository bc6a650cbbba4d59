use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::messages::{AssistantContent, Message, ToolResultContent, UserContent};
use crate::tokens::{
    estimate_transcript_tokens, AccumulatedUsage, Pricing, TokenUsage,
};

/// The conversation state for one agent session: transcript, usage totals,
/// and the compaction watermark. Owned exclusively by the orchestrator;
/// mutated only inside a single turn's processing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    backend: String,
    model: String,
    transcript: Vec<Message>,
    usage: AccumulatedUsage,
    /// Transcript index below which history has already been summarized.
    compaction_watermark: usize,
    created_at: String,
    updated_at: String,
}

/// Usage snapshot exposed to callers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionUsage {
    pub context_tokens: u32,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost_cents: f64,
    pub turn_count: u32,
}

impl Session {
    pub fn new(backend: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: SessionId::new(),
            backend: backend.into(),
            model: model.into(),
            transcript: Vec::new(),
            usage: AccumulatedUsage::default(),
            compaction_watermark: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn compaction_watermark(&self) -> usize {
        self.compaction_watermark
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn append(&mut self, message: Message) {
        self.transcript.push(message);
        self.updated_at = Utc::now().to_rfc3339();
    }

    /// Record a finished turn's provider-reported usage.
    pub fn record_usage(&mut self, usage: &TokenUsage, pricing: &Pricing) {
        self.usage.record(usage, pricing);
        self.updated_at = Utc::now().to_rfc3339();
    }

    pub fn usage(&self) -> SessionUsage {
        SessionUsage {
            context_tokens: self.context_tokens(),
            total_input_tokens: self.usage.total_input_tokens,
            total_output_tokens: self.usage.total_output_tokens,
            total_cost_cents: self.usage.total_cost_cents,
            turn_count: self.usage.turn_count,
        }
    }

    /// Current context size: the provider's last report when available,
    /// otherwise an estimate from the transcript.
    fn context_tokens(&self) -> u32 {
        if self.usage.last_context_tokens > 0 {
            self.usage.last_context_tokens
        } else {
            estimate_transcript_tokens(&self.transcript)
        }
    }

    /// True once accumulated context tokens exceed the configured threshold.
    pub fn needs_compaction(&self, threshold_tokens: u32) -> bool {
        self.context_tokens() > threshold_tokens
    }

    /// Replace the transcript prefix (beyond the watermark, excluding the
    /// `keep_recent` tail) with a single synthetic summary message. Pure
    /// transformation of the transcript; idempotent because the watermark
    /// advances past the summarized prefix. Returns whether anything changed.
    pub fn compact(
        &mut self,
        summarizer: &dyn TranscriptSummarizer,
        keep_recent: usize,
    ) -> bool {
        let len = self.transcript.len();
        if len <= keep_recent {
            return false;
        }
        let prefix_end = len - keep_recent;
        if prefix_end <= self.compaction_watermark {
            return false;
        }

        let summary = summarizer.summarize(&self.transcript[..prefix_end]);
        let summary_msg = Message::user_text(format!("[conversation summary]\n{summary}"));

        let tail = self.transcript.split_off(prefix_end);
        self.transcript = Vec::with_capacity(1 + tail.len());
        self.transcript.push(summary_msg);
        self.transcript.extend(tail);
        self.compaction_watermark = 1;
        self.usage.last_context_tokens = 0; // stale after rewriting history
        self.updated_at = Utc::now().to_rfc3339();
        true
    }

    /// Rebuild a session from persisted parts. Used by the store; restoring
    /// must reproduce the saved session exactly.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: SessionId,
        backend: String,
        model: String,
        transcript: Vec<Message>,
        usage: AccumulatedUsage,
        compaction_watermark: usize,
        created_at: String,
        updated_at: String,
    ) -> Self {
        Self {
            id,
            backend,
            model,
            transcript,
            usage,
            compaction_watermark,
            created_at,
            updated_at,
        }
    }

    pub fn accumulated_usage(&self) -> &AccumulatedUsage {
        &self.usage
    }

    pub fn updated_at(&self) -> &str {
        &self.updated_at
    }
}

/// Strategy producing the synthetic summary text for a compacted prefix.
pub trait TranscriptSummarizer: Send + Sync {
    fn summarize(&self, messages: &[Message]) -> String;
}

/// Deterministic digest summarizer: one line per message with role and a
/// clipped preview. No model call involved.
pub struct DigestSummarizer {
    preview_chars: usize,
}

impl DigestSummarizer {
    pub fn new() -> Self {
        Self { preview_chars: 120 }
    }
}

impl Default for DigestSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptSummarizer for DigestSummarizer {
    fn summarize(&self, messages: &[Message]) -> String {
        let mut lines = Vec::with_capacity(messages.len());
        for msg in messages {
            let line = match msg {
                Message::User(user) => {
                    let text = user
                        .content
                        .iter()
                        .map(|c| match c {
                            UserContent::Text { text } => text.as_str(),
                        })
                        .collect::<Vec<_>>()
                        .join(" ");
                    format!("user: {}", clip(&text, self.preview_chars))
                }
                Message::Assistant(assistant) => {
                    let mut parts = Vec::new();
                    let text = assistant.text_content();
                    if !text.is_empty() {
                        parts.push(clip(&text, self.preview_chars));
                    }
                    for tc in assistant.tool_calls() {
                        parts.push(format!("called {}", tc.name));
                    }
                    format!("assistant: {}", parts.join("; "))
                }
                Message::Tool(result) => {
                    let text = result
                        .content
                        .iter()
                        .map(|c| match c {
                            ToolResultContent::Text { text } => text.as_str(),
                        })
                        .collect::<Vec<_>>()
                        .join(" ");
                    let marker = if result.is_error { "tool (error)" } else { "tool" };
                    format!("{marker}: {}", clip(&text, self.preview_chars))
                }
            };
            lines.push(line);
        }
        lines.join("\n")
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let clipped: String = text.chars().take(max_chars).collect();
        format!("{clipped}…")
    }
}
