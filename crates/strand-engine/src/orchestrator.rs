use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use strand_core::adapter::{GenerationOptions, ProviderAdapter, TurnContext};
use strand_core::config::AgentConfig;
use strand_core::errors::ProviderError;
use strand_core::events::{AgentEvent, ErrorInfo};
use strand_core::messages::{Message, Role, ToolCallBlock};
use strand_core::session::{DigestSummarizer, Session, TranscriptSummarizer};

use crate::backoff::BackoffConfig;
use crate::dispatch::{ConfirmationHook, ToolDispatcher};
use crate::error::EngineError;
use crate::registry::ToolRegistry;

const SUBSCRIBER_BUFFER: usize = 256;

/// Orchestration states. The transition set is closed:
/// Idle → TurnRunning → (ToolDispatch ⇄ TurnRunning) → Idle | Failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    TurnRunning,
    ToolDispatch,
    Failed,
}

struct TurnOutcome {
    tool_calls: Vec<ToolCallBlock>,
}

/// Drives conversation turns against one provider adapter: opens the
/// stream, folds canonical events into the session, dispatches tool calls,
/// and feeds results back until an assistant turn ends without tool calls.
///
/// The session is owned here exclusively and mutated only after a stream or
/// tool batch fully resolves. Subscribers receive every event the
/// orchestrator observes, unchanged and in order, over bounded channels
/// (emission awaits capacity rather than dropping).
pub struct Orchestrator {
    adapter: Arc<dyn ProviderAdapter>,
    dispatcher: ToolDispatcher,
    config: AgentConfig,
    backoff: BackoffConfig,
    session: Session,
    system_prompt: Option<String>,
    summarizer: Box<dyn TranscriptSummarizer>,
    subscribers: Vec<mpsc::Sender<AgentEvent>>,
    state: AgentState,
}

impl Orchestrator {
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        registry: Arc<ToolRegistry>,
        config: AgentConfig,
        working_directory: PathBuf,
    ) -> Self {
        let session = Session::new(adapter.name(), adapter.model());
        Self::with_session(adapter, registry, config, working_directory, session)
    }

    /// Resume orchestration over a restored session.
    pub fn with_session(
        adapter: Arc<dyn ProviderAdapter>,
        registry: Arc<ToolRegistry>,
        config: AgentConfig,
        working_directory: PathBuf,
        session: Session,
    ) -> Self {
        let dispatcher =
            ToolDispatcher::new(registry, working_directory).with_timeout(config.tool_timeout);
        Self {
            adapter,
            dispatcher,
            config,
            backoff: BackoffConfig::default(),
            session,
            system_prompt: None,
            summarizer: Box::new(DigestSummarizer::new()),
            subscribers: Vec::new(),
            state: AgentState::Idle,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Box<dyn TranscriptSummarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_confirmation_hook(mut self, hook: ConfirmationHook) -> Self {
        self.dispatcher.set_confirmation_hook(hook);
        self
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Safe to read between turns, never during one.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    /// Attach a subscriber. Events arrive in emission order; a slow
    /// subscriber backpressures the orchestrator instead of losing events.
    pub fn subscribe(&mut self) -> mpsc::Receiver<AgentEvent> {
        self.subscribe_with_capacity(SUBSCRIBER_BUFFER)
    }

    pub fn subscribe_with_capacity(&mut self, capacity: usize) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(capacity);
        self.subscribers.push(tx);
        rx
    }

    async fn emit(&mut self, event: AgentEvent) {
        let mut open = Vec::with_capacity(self.subscribers.len());
        for tx in self.subscribers.drain(..) {
            if tx.send(event.clone()).await.is_ok() {
                open.push(tx);
            }
        }
        self.subscribers = open;
    }

    /// Run one user message to completion: turns and tool batches until an
    /// assistant turn ends without tool calls, then back to Idle.
    ///
    /// Submitting while a turn is in flight is a caller error (`Busy`).
    /// Fatal and retry-exhausted errors land in `Failed`; everything else
    /// (interruption, malformed response, cancellation) ends the current
    /// turn and leaves the session resumable.
    #[instrument(skip(self, text, cancel), fields(session_id = %self.session.id()))]
    pub async fn submit(
        &mut self,
        text: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        if self.state != AgentState::Idle {
            return Err(EngineError::Busy);
        }
        self.state = AgentState::TurnRunning;
        self.emit(AgentEvent::AgentStart).await;

        let user_message = Message::user_text(text);
        self.emit(AgentEvent::MessageStart { role: Role::User }).await;
        self.emit(AgentEvent::MessageEnd {
            role: Role::User,
            message: user_message.clone(),
        })
        .await;
        self.session.append(user_message);

        let mut turn = 1u32;
        let result = loop {
            if turn > self.config.max_turns {
                break Err(EngineError::MaxTurnsExceeded(self.config.max_turns));
            }

            // Compaction runs only between turns, never mid-stream.
            if self.session.needs_compaction(self.config.compaction_threshold) {
                let keep = self.config.compaction_keep_recent;
                if self.session.compact(self.summarizer.as_ref(), keep) {
                    info!(
                        transcript_len = self.session.transcript().len(),
                        "compacted transcript"
                    );
                }
            }

            let turn_result = self.run_turn(turn, cancel).await;
            match turn_result {
                Ok(outcome) => {
                    if outcome.tool_calls.is_empty() {
                        break Ok(());
                    }

                    self.state = AgentState::ToolDispatch;
                    let session_id = self.session.id().clone();
                    let results = self
                        .dispatcher
                        .dispatch(&outcome.tool_calls, &session_id, cancel)
                        .await;
                    for message in results {
                        self.emit(AgentEvent::MessageStart { role: Role::Tool }).await;
                        self.emit(AgentEvent::MessageEnd {
                            role: Role::Tool,
                            message: message.clone(),
                        })
                        .await;
                        self.session.append(message);
                    }

                    if cancel.is_cancelled() {
                        break Err(EngineError::Aborted);
                    }

                    // The model must see tool results before continuing.
                    self.state = AgentState::TurnRunning;
                    turn += 1;
                }
                Err(e) => break Err(e),
            }
        };

        self.state = match &result {
            Ok(()) => AgentState::Idle,
            Err(EngineError::Provider(_)) => AgentState::Failed,
            Err(_) => AgentState::Idle,
        };
        self.emit(AgentEvent::AgentEnd).await;
        result
    }

    /// One turn: open the adapter stream (retrying transient open errors
    /// with backoff), forward every event unchanged, and commit staged
    /// messages once the stream resolves. A stream that has yielded events
    /// is committed and never retried.
    async fn run_turn(
        &mut self,
        turn: u32,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, EngineError> {
        self.emit(AgentEvent::TurnStart { turn }).await;

        let context = TurnContext {
            messages: self.session.transcript().to_vec(),
            system_prompt: self.system_prompt.clone(),
            tools: self.dispatcher.registry().definitions(),
        };
        let options = GenerationOptions {
            thinking: self.config.thinking_level,
            ..Default::default()
        };

        let mut attempt = 0u32;
        let mut stream = loop {
            if cancel.is_cancelled() {
                self.emit(AgentEvent::turn_end_error(&ProviderError::Cancelled))
                    .await;
                return Err(EngineError::Aborted);
            }
            let opened = self.adapter.open(&context, &options, cancel).await;
            match opened {
                Ok(stream) => break stream,
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.backoff.retry_delay(attempt, e.suggested_delay());
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying stream open"
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.emit(AgentEvent::turn_end_error(&e)).await;
                    return Err(EngineError::Provider(e));
                }
            }
        };

        let mut staged: Vec<Message> = Vec::new();
        let mut turn_error: Option<ErrorInfo> = None;
        let mut saw_turn_end = false;
        while let Some(event) = stream.next().await {
            match &event {
                AgentEvent::MessageEnd { message, .. } => staged.push(message.clone()),
                AgentEvent::TurnEnd { error, .. } => {
                    saw_turn_end = true;
                    turn_error = error.clone();
                }
                _ => {}
            }
            self.emit(event).await;
        }
        drop(stream);

        if !saw_turn_end {
            // Contract violation by the adapter; subscribers still get a
            // well-formed terminal event for this turn.
            let e = ProviderError::MalformedResponse("stream ended without turn_end".into());
            self.emit(AgentEvent::turn_end_error(&e)).await;
            return Err(EngineError::Internal(e.to_string()));
        }

        // Commit: the session mutates only after the stream fully resolved.
        let pricing = self.adapter.pricing();
        let mut tool_calls: Vec<ToolCallBlock> = Vec::new();
        for message in staged {
            if let Message::Assistant(assistant) = &message {
                if let Some(usage) = &assistant.usage {
                    self.session.record_usage(usage, &pricing);
                }
                tool_calls = assistant.tool_calls().into_iter().cloned().collect();
            }
            self.session.append(message);
        }

        match turn_error {
            None => Ok(TurnOutcome { tool_calls }),
            Some(info) if info.kind == "cancelled" => Err(EngineError::Aborted),
            Some(info) => Err(EngineError::TurnFailed(info)),
        }
    }
}
