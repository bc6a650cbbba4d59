use strand_core::errors::ProviderError;
use strand_core::events::{AgentEvent, MessageDelta};
use strand_core::ids::ToolCallId;
use strand_core::messages::{
    AssistantContent, AssistantMessage, Message, Role, StopReason, ToolCallBlock,
};
use strand_core::tokens::TokenUsage;

/// Folds vendor stream fragments into the canonical event sequence for one
/// assistant message. Both wire adapters drive this state machine so the
/// bracketing contract (message_start before updates, exactly one
/// message_end) and the tool-argument accumulation rules live in one place.
pub struct StreamAssembler {
    started: bool,
    content: Vec<AssistantContent>,
    block: Block,
    usage: TokenUsage,
    stop_reason: Option<StopReason>,
}

enum Block {
    None,
    Text(String),
    Thinking {
        text: String,
        signature: Option<String>,
    },
    Tool {
        id: String,
        name: String,
        arguments_json: String,
    },
}

impl Default for StreamAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self {
            started: false,
            content: Vec::new(),
            block: Block::None,
            usage: TokenUsage::default(),
            stop_reason: None,
        }
    }

    /// Emit message_start once, before any other message event.
    pub fn begin_message(&mut self) -> Vec<AgentEvent> {
        if self.started {
            return Vec::new();
        }
        self.started = true;
        vec![AgentEvent::MessageStart { role: Role::Assistant }]
    }

    pub fn text_delta(&mut self, delta: &str) -> Vec<AgentEvent> {
        let mut events = self.begin_message();
        if !matches!(self.block, Block::Text(_)) {
            self.flush_block_lossy();
            self.block = Block::Text(String::new());
        }
        if let Block::Text(buf) = &mut self.block {
            buf.push_str(delta);
        }
        events.push(AgentEvent::MessageUpdate {
            role: Role::Assistant,
            delta: MessageDelta::Text { text: delta.to_string() },
        });
        events
    }

    pub fn thinking_delta(&mut self, delta: &str) -> Vec<AgentEvent> {
        let mut events = self.begin_message();
        if !matches!(self.block, Block::Thinking { .. }) {
            self.flush_block_lossy();
            self.block = Block::Thinking {
                text: String::new(),
                signature: None,
            };
        }
        if let Block::Thinking { text, .. } = &mut self.block {
            text.push_str(delta);
        }
        events.push(AgentEvent::MessageUpdate {
            role: Role::Assistant,
            delta: MessageDelta::Thinking { text: delta.to_string() },
        });
        events
    }

    pub fn thinking_signature(&mut self, sig: &str) {
        if let Block::Thinking { signature, .. } = &mut self.block {
            match signature {
                Some(existing) => existing.push_str(sig),
                None => *signature = Some(sig.to_string()),
            }
        }
    }

    /// Open a tool-call block. Fragments of its argument JSON accumulate
    /// internally until the block closes.
    pub fn begin_tool_call(
        &mut self,
        id: &str,
        name: &str,
    ) -> Result<Vec<AgentEvent>, ProviderError> {
        if id.is_empty() || name.is_empty() {
            return Err(ProviderError::MalformedResponse(format!(
                "tool call missing id or name (id={id:?}, name={name:?})"
            )));
        }
        let mut events = self.begin_message();
        events.extend(self.end_block()?);
        self.block = Block::Tool {
            id: id.to_string(),
            name: name.to_string(),
            arguments_json: String::new(),
        };
        Ok(events)
    }

    pub fn tool_arguments_delta(&mut self, fragment: &str) {
        if let Block::Tool { arguments_json, .. } = &mut self.block {
            arguments_json.push_str(fragment);
        }
    }

    /// Close the current block. A completed tool block surfaces as a single
    /// message_update carrying the complete, parsed call; accumulated
    /// arguments that fail to parse are a malformed response.
    pub fn end_block(&mut self) -> Result<Vec<AgentEvent>, ProviderError> {
        match std::mem::replace(&mut self.block, Block::None) {
            Block::None => Ok(Vec::new()),
            Block::Text(text) => {
                self.content.push(AssistantContent::Text { text });
                Ok(Vec::new())
            }
            Block::Thinking { text, signature } => {
                self.content.push(AssistantContent::Thinking { text, signature });
                Ok(Vec::new())
            }
            Block::Tool { id, name, arguments_json } => {
                let arguments: serde_json::Value = if arguments_json.trim().is_empty() {
                    serde_json::Value::Object(serde_json::Map::new())
                } else {
                    serde_json::from_str(&arguments_json).map_err(|e| {
                        ProviderError::MalformedResponse(format!(
                            "unparseable tool arguments for {name}: {e}"
                        ))
                    })?
                };
                let tool_call = ToolCallBlock {
                    id: ToolCallId::from_raw(id),
                    name,
                    arguments,
                };
                self.content.push(AssistantContent::ToolCall(tool_call.clone()));
                Ok(vec![AgentEvent::MessageUpdate {
                    role: Role::Assistant,
                    delta: MessageDelta::ToolCall { tool_call },
                }])
            }
        }
    }

    pub fn set_input_usage(&mut self, input: u32, cache_read: u32, cache_creation: u32) {
        self.usage.input_tokens = input;
        self.usage.cache_read_tokens = cache_read;
        self.usage.cache_creation_tokens = cache_creation;
    }

    pub fn set_output_tokens(&mut self, output: u32) {
        self.usage.output_tokens = output;
    }

    pub fn set_stop_reason(&mut self, stop_reason: StopReason) {
        self.stop_reason = Some(stop_reason);
    }

    /// Complete the message: message_end with the authoritative snapshot,
    /// then turn_end.
    pub fn finish(&mut self) -> Result<Vec<AgentEvent>, ProviderError> {
        let mut events = self.begin_message();
        events.extend(self.end_block()?);

        let message = self.snapshot(self.stop_reason);
        let stop_reason = message.stop_reason.unwrap_or(StopReason::EndTurn);
        events.push(AgentEvent::MessageEnd {
            role: Role::Assistant,
            message: Message::Assistant(message),
        });
        events.push(AgentEvent::turn_end_ok(stop_reason));
        Ok(events)
    }

    /// Terminate after an interruption, cancellation, or malformed frame.
    /// Partial content already received is preserved in a synthetic
    /// message_end; an in-flight tool block is dropped (incomplete calls
    /// never surface). Never emits message_end without a prior
    /// message_start.
    pub fn fail(&mut self, error: &ProviderError) -> Vec<AgentEvent> {
        self.flush_block_lossy();
        let mut events = Vec::new();
        if self.started {
            let stop = if matches!(error, ProviderError::Cancelled) {
                StopReason::Cancelled
            } else {
                StopReason::Error
            };
            let message = self.snapshot(Some(stop));
            events.push(AgentEvent::MessageEnd {
                role: Role::Assistant,
                message: Message::Assistant(message),
            });
        }
        events.push(AgentEvent::turn_end_error(error));
        events
    }

    fn snapshot(&self, stop_reason: Option<StopReason>) -> AssistantMessage {
        let has_tool_calls = self
            .content
            .iter()
            .any(|c| matches!(c, AssistantContent::ToolCall(_)));
        let inferred = if has_tool_calls {
            StopReason::ToolUse
        } else {
            StopReason::EndTurn
        };
        AssistantMessage {
            content: self.content.clone(),
            usage: Some(self.usage.clone()),
            stop_reason: Some(stop_reason.unwrap_or(inferred)),
        }
    }

    /// Fold an open text/thinking block into content; drop an open tool
    /// block (its arguments are incomplete by definition).
    fn flush_block_lossy(&mut self) {
        match std::mem::replace(&mut self.block, Block::None) {
            Block::None | Block::Tool { .. } => {}
            Block::Text(text) => {
                if !text.is_empty() {
                    self.content.push(AssistantContent::Text { text });
                }
            }
            Block::Thinking { text, signature } => {
                if !text.is_empty() {
                    self.content.push(AssistantContent::Thinking { text, signature });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(events: &[AgentEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_type()).collect()
    }

    #[test]
    fn text_stream_brackets_correctly() {
        let mut asm = StreamAssembler::new();
        let mut events = Vec::new();
        events.extend(asm.begin_message());
        events.extend(asm.text_delta("Hello"));
        events.extend(asm.text_delta(" world"));
        events.extend(asm.end_block().unwrap());
        events.extend(asm.finish().unwrap());

        assert_eq!(
            text_of(&events),
            vec!["message_start", "message_update", "message_update", "message_end", "turn_end"]
        );

        match &events[3] {
            AgentEvent::MessageEnd { message: Message::Assistant(m), .. } => {
                assert_eq!(m.text_content(), "Hello world");
                assert_eq!(m.stop_reason, Some(StopReason::EndTurn));
            }
            other => panic!("expected MessageEnd, got {other:?}"),
        }
    }

    #[test]
    fn folded_deltas_equal_snapshot() {
        let mut asm = StreamAssembler::new();
        let mut folded = String::new();
        let mut all = Vec::new();
        for chunk in ["a", "b", "c", "def"] {
            all.extend(asm.text_delta(chunk));
        }
        all.extend(asm.finish().unwrap());

        for event in &all {
            if let AgentEvent::MessageUpdate { delta: MessageDelta::Text { text }, .. } = event {
                folded.push_str(text);
            }
        }
        let snapshot = all
            .iter()
            .find_map(|e| match e {
                AgentEvent::MessageEnd { message: Message::Assistant(m), .. } => {
                    Some(m.text_content())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(folded, snapshot);
    }

    #[test]
    fn message_start_emitted_exactly_once() {
        let mut asm = StreamAssembler::new();
        let mut events = Vec::new();
        events.extend(asm.begin_message());
        events.extend(asm.begin_message());
        events.extend(asm.text_delta("x"));
        let starts = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::MessageStart { .. }))
            .count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn tool_call_surfaces_only_when_complete() {
        let mut asm = StreamAssembler::new();
        let mut events = Vec::new();
        events.extend(asm.begin_tool_call("toolu_1", "read").unwrap());
        asm.tool_arguments_delta(r#"{"file_"#);
        asm.tool_arguments_delta(r#"path":"/tmp/x"}"#);
        // No tool_call update until the block closes
        assert!(!events
            .iter()
            .any(|e| matches!(e, AgentEvent::MessageUpdate { delta: MessageDelta::ToolCall { .. }, .. })));

        let end = asm.end_block().unwrap();
        assert_eq!(end.len(), 1);
        match &end[0] {
            AgentEvent::MessageUpdate { delta: MessageDelta::ToolCall { tool_call }, .. } => {
                assert_eq!(tool_call.name, "read");
                assert_eq!(tool_call.arguments["file_path"], "/tmp/x");
            }
            other => panic!("expected tool_call update, got {other:?}"),
        }
    }

    #[test]
    fn malformed_tool_arguments_error() {
        let mut asm = StreamAssembler::new();
        asm.begin_tool_call("toolu_1", "read").unwrap();
        asm.tool_arguments_delta(r#"{"file_path": nope"#);
        let err = asm.end_block().unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[test]
    fn empty_tool_arguments_become_empty_object() {
        let mut asm = StreamAssembler::new();
        asm.begin_tool_call("toolu_1", "ls").unwrap();
        let end = asm.end_block().unwrap();
        match &end[0] {
            AgentEvent::MessageUpdate { delta: MessageDelta::ToolCall { tool_call }, .. } => {
                assert!(tool_call.arguments.as_object().unwrap().is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_tool_identity_is_malformed() {
        let mut asm = StreamAssembler::new();
        assert!(asm.begin_tool_call("", "read").is_err());
        assert!(asm.begin_tool_call("toolu_1", "").is_err());
    }

    #[test]
    fn tool_use_stop_reason_inferred() {
        let mut asm = StreamAssembler::new();
        asm.begin_tool_call("toolu_1", "bash").unwrap();
        asm.tool_arguments_delta(r#"{"command":"ls"}"#);
        asm.end_block().unwrap();
        let events = asm.finish().unwrap();
        match events.last().unwrap() {
            AgentEvent::TurnEnd { stop_reason, error } => {
                assert_eq!(*stop_reason, StopReason::ToolUse);
                assert!(error.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fail_preserves_partial_text() {
        let mut asm = StreamAssembler::new();
        asm.text_delta("partial out");
        let events = asm.fail(&ProviderError::StreamInterrupted("eof".into()));

        assert_eq!(text_of(&events), vec!["message_end", "turn_end"]);
        match &events[0] {
            AgentEvent::MessageEnd { message: Message::Assistant(m), .. } => {
                assert_eq!(m.text_content(), "partial out");
                assert_eq!(m.stop_reason, Some(StopReason::Error));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &events[1] {
            AgentEvent::TurnEnd { error: Some(info), .. } => {
                assert_eq!(info.kind, "stream_interrupted");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fail_before_start_emits_only_turn_end() {
        let mut asm = StreamAssembler::new();
        let events = asm.fail(&ProviderError::NetworkError("reset".into()));
        assert_eq!(text_of(&events), vec!["turn_end"]);
    }

    #[test]
    fn fail_drops_incomplete_tool_block() {
        let mut asm = StreamAssembler::new();
        asm.text_delta("before");
        asm.end_block().unwrap();
        asm.begin_tool_call("toolu_1", "write").unwrap();
        asm.tool_arguments_delta(r#"{"path": "/tm"#);
        let events = asm.fail(&ProviderError::StreamInterrupted("drop".into()));
        match &events[0] {
            AgentEvent::MessageEnd { message: Message::Assistant(m), .. } => {
                assert_eq!(m.text_content(), "before");
                assert!(!m.has_tool_calls());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cancellation_maps_to_cancelled() {
        let mut asm = StreamAssembler::new();
        asm.text_delta("some");
        let events = asm.fail(&ProviderError::Cancelled);
        match &events[0] {
            AgentEvent::MessageEnd { message: Message::Assistant(m), .. } => {
                assert_eq!(m.stop_reason, Some(StopReason::Cancelled));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &events[1] {
            AgentEvent::TurnEnd { stop_reason, .. } => {
                assert_eq!(*stop_reason, StopReason::Cancelled);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn usage_carried_on_snapshot() {
        let mut asm = StreamAssembler::new();
        asm.set_input_usage(100, 50, 25);
        asm.text_delta("hi");
        asm.set_output_tokens(7);
        let events = asm.finish().unwrap();
        match &events[events.len() - 2] {
            AgentEvent::MessageEnd { message: Message::Assistant(m), .. } => {
                let usage = m.usage.as_ref().unwrap();
                assert_eq!(usage.input_tokens, 100);
                assert_eq!(usage.cache_read_tokens, 50);
                assert_eq!(usage.cache_creation_tokens, 25);
                assert_eq!(usage.output_tokens, 7);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn snapshot_only_message_still_renders() {
        // Zero deltas: begin then finish. The snapshot alone carries content.
        let mut asm = StreamAssembler::new();
        asm.begin_message();
        asm.text_delta("");
        let events = asm.finish().unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::MessageEnd { .. })));
    }
}
