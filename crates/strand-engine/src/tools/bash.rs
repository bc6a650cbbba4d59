use async_trait::async_trait;
use std::time::{Duration, Instant};
use strand_core::tools::{ExclusionClass, Tool, ToolContext, ToolError, ToolOutput};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TIMEOUT_MS: u64 = 600_000;

pub struct BashTool {
    timeout: Duration,
}

impl BashTool {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for BashTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (max 600000)"
                }
            }
        })
    }

    fn exclusion_class(&self) -> Option<ExclusionClass> {
        Some(ExclusionClass::shell())
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();

        let command = args["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("command is required".into()))?;

        let timeout = args["timeout"]
            .as_u64()
            .map(|ms| Duration::from_millis(ms.min(MAX_TIMEOUT_MS)))
            .unwrap_or(self.timeout);

        // kill_on_drop reaps the child if cancellation drops the future
        let output_fut = tokio::process::Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.working_directory)
            .kill_on_drop(true)
            .output();
        tokio::pin!(output_fut);

        let output = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(ToolError::Cancelled),
            result = tokio::time::timeout(timeout, &mut output_fut) => result
                .map_err(|_| ToolError::Timeout(timeout))?
                .map_err(|e| ToolError::ExecutionFailed(format!("failed to execute command: {e}")))?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut content = String::new();
        if !stdout.is_empty() {
            content.push_str(&stdout);
        }
        if !stderr.is_empty() {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str("[stderr]\n");
            content.push_str(&stderr);
        }
        if content.is_empty() {
            content = "(no output)".to_string();
        }

        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code != 0 {
            content.push_str(&format!("\n[exit code: {exit_code}]"));
        }

        Ok(ToolOutput {
            content,
            is_error: exit_code != 0,
            duration: start.elapsed(),
        })
    }
}
