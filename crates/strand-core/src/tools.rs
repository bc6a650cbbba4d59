use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::ids::SessionId;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Label grouping tools that must not execute concurrently against the same
/// resource. Calls sharing a class run serialized; calls across classes (or
/// with no class) run in parallel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionClass(String);

impl ExclusionClass {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem mutations (write, edit).
    pub fn filesystem() -> Self {
        Self::new("filesystem")
    }

    /// Shell execution.
    pub fn shell() -> Self {
        Self::new("shell")
    }
}

/// Context available to tools during execution.
pub struct ToolContext {
    pub session_id: SessionId,
    pub working_directory: PathBuf,
    pub cancel: CancellationToken,
}

/// Result returned by a tool execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>, duration: Duration) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            duration,
        }
    }
}

/// Tool definition sent to the model as part of the turn context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// Trait implemented by each tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;

    fn exclusion_class(&self) -> Option<ExclusionClass> {
        None
    }

    /// Per-tool timeout override. None means the dispatcher's configured
    /// default applies.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Whether the caller should be asked before this tool runs. Enforcement
    /// is the dispatcher's hook, not the tool's.
    fn requires_confirmation(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters_schema: self.parameters_schema(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("denied: {0}")]
    Denied(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

/// Serde helper for Duration as milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_class_labels() {
        assert_eq!(ExclusionClass::filesystem().as_str(), "filesystem");
        assert_eq!(ExclusionClass::shell().as_str(), "shell");
        assert_eq!(ExclusionClass::filesystem(), ExclusionClass::new("filesystem"));
        assert_ne!(ExclusionClass::filesystem(), ExclusionClass::shell());
    }

    #[test]
    fn tool_output_duration_serializes_as_ms() {
        let output = ToolOutput {
            content: "ok".into(),
            is_error: false,
            duration: Duration::from_millis(1234),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["duration"], 1234);

        let parsed: ToolOutput = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.duration, Duration::from_millis(1234));
    }

    #[test]
    fn tool_error_display() {
        let err = ToolError::InvalidArguments("missing path".into());
        assert_eq!(err.to_string(), "invalid arguments: missing path");

        let err = ToolError::Timeout(Duration::from_secs(60));
        assert!(err.to_string().contains("60"));

        let err = ToolError::Denied("confirmation refused".into());
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn default_trait_methods() {
        struct Probe;

        #[async_trait]
        impl Tool for Probe {
            fn name(&self) -> &str {
                "probe"
            }
            fn description(&self) -> &str {
                "test probe"
            }
            fn parameters_schema(&self) -> serde_json::Value {
                serde_json::json!({"type": "object"})
            }
            async fn execute(
                &self,
                _args: serde_json::Value,
                _ctx: &ToolContext,
            ) -> Result<ToolOutput, ToolError> {
                Ok(ToolOutput::text("ok", Duration::from_millis(1)))
            }
        }

        let tool = Probe;
        assert!(tool.exclusion_class().is_none());
        assert!(tool.timeout().is_none());
        assert!(!tool.requires_confirmation());

        let def = tool.to_definition();
        assert_eq!(def.name, "probe");
        assert_eq!(def.parameters_schema["type"], "object");
    }
}
