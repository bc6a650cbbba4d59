use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};

use strand_core::ids::SessionId;
use strand_core::messages::{Message, ToolCallBlock};
use strand_core::tools::{Tool, ToolContext, ToolError, DEFAULT_TOOL_TIMEOUT};

use crate::registry::ToolRegistry;
use crate::truncate;

/// Caller-installed hook deciding whether a confirmation-requiring tool call
/// may run. Returning false produces an error tool result instead of
/// executing.
pub type ConfirmationHook = Arc<dyn Fn(&ToolCallBlock) -> bool + Send + Sync>;

/// Executes one batch of tool calls. Calls sharing an exclusion class run
/// serialized in request order; calls across classes (or without one) run
/// concurrently. Result messages always come back in request order, not
/// completion order, so transcripts are deterministic.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    working_directory: PathBuf,
    default_timeout: Duration,
    confirmation: Option<ConfirmationHook>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, working_directory: PathBuf) -> Self {
        Self {
            registry,
            working_directory,
            default_timeout: DEFAULT_TOOL_TIMEOUT,
            confirmation: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_confirmation_hook(mut self, hook: ConfirmationHook) -> Self {
        self.confirmation = Some(hook);
        self
    }

    pub fn set_confirmation_hook(&mut self, hook: ConfirmationHook) {
        self.confirmation = Some(hook);
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute a batch. Every call reaches a terminal result: completed,
    /// failed, timed out, or cancelled. Failures never escalate; they come
    /// back as error-flagged tool messages for the model to see.
    #[instrument(skip(self, calls, session_id, cancel), fields(batch = calls.len()))]
    pub async fn dispatch(
        &self,
        calls: &[ToolCallBlock],
        session_id: &SessionId,
        cancel: &CancellationToken,
    ) -> Vec<Message> {
        let mut slots: Vec<Option<Message>> = vec![None; calls.len()];

        // Plan: resolve tools, apply the confirmation hook, group by
        // exclusion class. A class keys one serial group; classless calls
        // each get their own group.
        let mut groups: Vec<Vec<(usize, Arc<dyn Tool>, ToolCallBlock)>> = Vec::new();
        let mut class_group: HashMap<String, usize> = HashMap::new();

        for (i, call) in calls.iter().enumerate() {
            let tool = match self.registry.get(&call.name) {
                Some(t) => t,
                None => {
                    slots[i] = Some(Message::tool_error(
                        call.id.clone(),
                        format!("unknown tool: {}", call.name),
                    ));
                    continue;
                }
            };

            if tool.requires_confirmation() {
                let allowed = self.confirmation.as_ref().map_or(false, |hook| hook(call));
                if !allowed {
                    slots[i] = Some(Message::tool_error(
                        call.id.clone(),
                        format!("tool {} requires confirmation and was not approved", call.name),
                    ));
                    continue;
                }
            }

            let entry = (i, tool.clone(), call.clone());
            match tool.exclusion_class() {
                Some(class) => {
                    let idx = *class_group
                        .entry(class.as_str().to_string())
                        .or_insert_with(|| {
                            groups.push(Vec::new());
                            groups.len() - 1
                        });
                    groups[idx].push(entry);
                }
                None => groups.push(vec![entry]),
            }
        }

        // One task per group; groups run concurrently, members serially.
        let mut handles = Vec::new();
        for group in groups {
            let indices: Vec<usize> = group.iter().map(|(i, _, _)| *i).collect();
            let session_id = session_id.clone();
            let working_directory = self.working_directory.clone();
            let default_timeout = self.default_timeout;
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                let mut results = Vec::with_capacity(group.len());
                for (i, tool, call) in group {
                    let ctx = ToolContext {
                        session_id: session_id.clone(),
                        working_directory: working_directory.clone(),
                        cancel: cancel.clone(),
                    };
                    let message = run_call(&*tool, &call, &ctx, default_timeout).await;
                    results.push((i, message));
                }
                results
            });
            handles.push((indices, handle));
        }

        for (indices, handle) in handles {
            match handle.await {
                Ok(results) => {
                    for (i, message) in results {
                        slots[i] = Some(message);
                    }
                }
                Err(join_err) => {
                    error!(error = %join_err, "tool group task failed");
                    for i in indices {
                        if slots[i].is_none() {
                            slots[i] = Some(Message::tool_error(
                                calls[i].id.clone(),
                                "tool execution failed",
                            ));
                        }
                    }
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.unwrap_or_else(|| {
                    Message::tool_error(calls[i].id.clone(), "tool produced no result")
                })
            })
            .collect()
    }
}

/// Run a single call to a terminal result. Timeouts, panics, tool errors
/// and cancellation all become error-flagged tool messages.
async fn run_call(
    tool: &dyn Tool,
    call: &ToolCallBlock,
    ctx: &ToolContext,
    default_timeout: Duration,
) -> Message {
    if ctx.cancel.is_cancelled() {
        return Message::tool_error(call.id.clone(), "cancelled");
    }

    let timeout = tool.timeout().unwrap_or(default_timeout);
    let start = Instant::now();
    let result = tokio::time::timeout(
        timeout,
        std::panic::AssertUnwindSafe(tool.execute(call.arguments.clone(), ctx)).catch_unwind(),
    )
    .await;
    let duration = start.elapsed();

    match result {
        Ok(Ok(Ok(output))) => {
            let max = truncate::max_output_for_tool(&call.name);
            let content = truncate::truncate_output(&output.content, max);
            if output.is_error {
                Message::tool_error(call.id.clone(), content)
            } else {
                Message::tool_result(call.id.clone(), content)
            }
        }
        Ok(Ok(Err(ToolError::Cancelled))) => Message::tool_error(call.id.clone(), "cancelled"),
        Ok(Ok(Err(e))) => Message::tool_error(call.id.clone(), e.to_string()),
        Ok(Err(panic)) => {
            error!(
                tool = %call.name,
                panic = %panic_message(&panic),
                "tool panicked during execution"
            );
            Message::tool_error(call.id.clone(), "internal error: tool crashed")
        }
        Err(_) => {
            warn!(
                tool = %call.name,
                timeout_secs = timeout.as_secs(),
                duration_ms = duration.as_millis() as u64,
                "tool timed out"
            );
            Message::tool_error(
                call.id.clone(),
                format!("tool timed out after {}s", timeout.as_secs()),
            )
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}
