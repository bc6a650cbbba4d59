use serde::{Deserialize, Serialize};

use crate::messages::{AssistantContent, Message, ToolResultContent, UserContent};

/// Per-turn token usage, raw from the provider.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_read_tokens: u32,
    pub cache_creation_tokens: u32,
}

impl TokenUsage {
    /// Total context window consumption for this turn.
    /// Cache reads and creations count toward the window; providers that
    /// fold them into input_tokens report zeros here, so the sum is safe.
    pub fn context_window_tokens(&self) -> u32 {
        self.input_tokens + self.cache_read_tokens + self.cache_creation_tokens
    }
}

/// Per-model pricing in cents per million tokens.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Pricing {
    pub input_cents_per_mtok: f64,
    pub output_cents_per_mtok: f64,
}

impl Pricing {
    pub fn cost_cents(&self, usage: &TokenUsage) -> f64 {
        let input = (usage.input_tokens + usage.cache_read_tokens + usage.cache_creation_tokens)
            as f64;
        let output = usage.output_tokens as f64;
        input / 1_000_000.0 * self.input_cents_per_mtok
            + output / 1_000_000.0 * self.output_cents_per_mtok
    }
}

/// Session-level accumulated totals (incremented per turn).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AccumulatedUsage {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cache_read_tokens: u64,
    pub total_cache_creation_tokens: u64,
    pub last_context_tokens: u32,
    pub total_cost_cents: f64,
    pub turn_count: u32,
}

impl AccumulatedUsage {
    /// Incorporate a new turn's token usage into session totals.
    pub fn record(&mut self, usage: &TokenUsage, pricing: &Pricing) {
        self.total_input_tokens += usage.input_tokens as u64;
        self.total_output_tokens += usage.output_tokens as u64;
        self.total_cache_read_tokens += usage.cache_read_tokens as u64;
        self.total_cache_creation_tokens += usage.cache_creation_tokens as u64;
        self.last_context_tokens = usage.context_window_tokens();
        self.total_cost_cents += pricing.cost_cents(usage);
        self.turn_count += 1;
    }
}

/// Estimate token count for text content. Approximation: chars / 4.
pub fn estimate_text_tokens(text: &str) -> u32 {
    (text.len() as u32).div_ceil(4)
}

/// Estimate tokens for a single message.
pub fn estimate_message_tokens(msg: &Message) -> u32 {
    let mut total = 4u32; // per-message overhead
    match msg {
        Message::User(user) => {
            for content in &user.content {
                total += match content {
                    UserContent::Text { text } => estimate_text_tokens(text),
                };
            }
        }
        Message::Assistant(assistant) => {
            for content in &assistant.content {
                total += match content {
                    AssistantContent::Text { text } => estimate_text_tokens(text),
                    AssistantContent::Thinking { text, .. } => estimate_text_tokens(text),
                    AssistantContent::ToolCall(tc) => {
                        estimate_text_tokens(&tc.name)
                            + estimate_text_tokens(&tc.arguments.to_string())
                    }
                };
            }
        }
        Message::Tool(result) => {
            for content in &result.content {
                total += match content {
                    ToolResultContent::Text { text } => estimate_text_tokens(text),
                };
            }
        }
    }
    total
}

/// Estimate tokens for an entire transcript.
pub fn estimate_transcript_tokens(messages: &[Message]) -> u32 {
    messages.iter().map(estimate_message_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_window_sums_cache_tokens() {
        let usage = TokenUsage {
            input_tokens: 1000,
            output_tokens: 500,
            cache_read_tokens: 2000,
            cache_creation_tokens: 3000,
        };
        assert_eq!(usage.context_window_tokens(), 6000);
    }

    #[test]
    fn pricing_cost() {
        let pricing = Pricing {
            input_cents_per_mtok: 300.0,
            output_cents_per_mtok: 1500.0,
        };
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
            cache_read_tokens: 0,
            cache_creation_tokens: 0,
        };
        let cost = pricing.cost_cents(&usage);
        assert!((cost - 1800.0).abs() < f64::EPSILON, "got {cost}");
    }

    #[test]
    fn accumulated_usage_multi_turn() {
        let pricing = Pricing {
            input_cents_per_mtok: 100.0,
            output_cents_per_mtok: 500.0,
        };
        let mut acc = AccumulatedUsage::default();

        acc.record(
            &TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
                cache_read_tokens: 200,
                cache_creation_tokens: 0,
            },
            &pricing,
        );
        acc.record(
            &TokenUsage {
                input_tokens: 150,
                output_tokens: 75,
                cache_read_tokens: 200,
                cache_creation_tokens: 50,
            },
            &pricing,
        );

        assert_eq!(acc.total_input_tokens, 250);
        assert_eq!(acc.total_output_tokens, 125);
        assert_eq!(acc.total_cache_read_tokens, 400);
        assert_eq!(acc.total_cache_creation_tokens, 50);
        assert_eq!(acc.last_context_tokens, 400); // 150+200+50
        assert_eq!(acc.turn_count, 2);
        assert!(acc.total_cost_cents > 0.0);
    }

    #[test]
    fn text_token_estimation() {
        assert_eq!(estimate_text_tokens(""), 0);
        assert_eq!(estimate_text_tokens("hello world"), 3); // 11 chars / 4
        assert_eq!(estimate_text_tokens("a".repeat(400).as_str()), 100);
    }

    #[test]
    fn message_token_estimation() {
        let msg = Message::user_text("hello world");
        let tokens = estimate_message_tokens(&msg);
        assert!(tokens > 0);
        assert!(tokens < 100);
    }

    #[test]
    fn transcript_estimation_sums() {
        let messages = vec![
            Message::user_text("a".repeat(400)),
            Message::assistant_text("b".repeat(400)),
        ];
        let total = estimate_transcript_tokens(&messages);
        assert_eq!(total, 100 + 4 + 100 + 4);
    }

    #[test]
    fn serde_roundtrip() {
        let acc = AccumulatedUsage {
            total_input_tokens: 10,
            total_output_tokens: 20,
            total_cache_read_tokens: 30,
            total_cache_creation_tokens: 40,
            last_context_tokens: 50,
            total_cost_cents: 1.25,
            turn_count: 3,
        };
        let json = serde_json::to_string(&acc).unwrap();
        let parsed: AccumulatedUsage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.turn_count, 3);
        assert_eq!(parsed.last_context_tokens, 50);
    }
}
