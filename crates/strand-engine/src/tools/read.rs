use async_trait::async_trait;
use std::time::Instant;
use strand_core::tools::{Tool, ToolContext, ToolError, ToolOutput};

pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read file contents from the filesystem"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["file_path"],
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to the file to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (1-based)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to read"
                }
            }
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();

        let file_path = args["file_path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("file_path is required".into()))?;

        let path = resolve_path(file_path, &ctx.working_directory);

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| {
                ToolError::ExecutionFailed(format!("failed to read {}: {e}", path.display()))
            })?;

        let offset = args["offset"].as_u64().unwrap_or(1).max(1) as usize;
        let limit = args["limit"].as_u64().unwrap_or(2000) as usize;

        let lines: Vec<&str> = content.lines().collect();
        let start_idx = (offset - 1).min(lines.len());
        let end_idx = (start_idx + limit).min(lines.len());

        let mut output = String::new();
        for (i, line) in lines[start_idx..end_idx].iter().enumerate() {
            let line_num = start_idx + i + 1;
            let clipped = if line.len() > 2000 { &line[..2000] } else { line };
            output.push_str(&format!("{:>6}\t{}\n", line_num, clipped));
        }

        if output.is_empty() {
            output = "(empty file)".to_string();
        }

        Ok(ToolOutput::text(output, start.elapsed()))
    }
}

pub(crate) fn resolve_path(file_path: &str, working_dir: &std::path::Path) -> std::path::PathBuf {
    let path = std::path::Path::new(file_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}
