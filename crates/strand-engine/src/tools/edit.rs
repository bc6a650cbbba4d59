use async_trait::async_trait;
use std::time::Instant;
use strand_core::tools::{ExclusionClass, Tool, ToolContext, ToolError, ToolOutput};

use super::read::resolve_path;

pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Perform exact string replacement in a file"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["file_path", "old_string", "new_string"],
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to the file to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "The exact string to find and replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "The replacement string"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace all occurrences (default: false)"
                }
            }
        })
    }

    fn exclusion_class(&self) -> Option<ExclusionClass> {
        Some(ExclusionClass::filesystem())
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
        let old_string = args["old_string"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("old_string is required".into()))?;
        let new_string = args["new_string"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("new_string is required".into()))?;
        let replace_all = args["replace_all"].as_bool().unwrap_or(false);

        if old_string == new_string {
            return Err(ToolError::InvalidArguments(
                "old_string and new_string must be different".into(),
            ));
        }

        let path = resolve_path(file_path, &ctx.working_directory);

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ToolError::ExecutionFailed(format!("failed to read {}: {e}", path.display()))
        })?;

        let count = content.matches(old_string).count();
        if count == 0 {
            return Err(ToolError::ExecutionFailed(
                "old_string not found in file".into(),
            ));
        }

        let (new_content, replaced) = if replace_all {
            (content.replace(old_string, new_string), count)
        } else {
            if count > 1 {
                return Err(ToolError::ExecutionFailed(format!(
                    "old_string is not unique in the file ({count} occurrences); use replace_all or provide more context"
                )));
            }
            (content.replacen(old_string, new_string, 1), 1)
        };

        tokio::fs::write(&path, &new_content).await.map_err(|e| {
            ToolError::ExecutionFailed(format!("failed to write {}: {e}", path.display()))
        })?;

        Ok(ToolOutput::text(
            format!("replaced {replaced} occurrence(s) in {}", path.display()),
            start.elapsed(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use strand_core::ids::SessionId;
    use tokio_util::sync::CancellationToken;

    fn test_ctx(dir: &std::path::Path) -> ToolContext {
        ToolContext {
            session_id: SessionId::new(),
            working_directory: dir.to_path_buf(),
            cancel: CancellationToken::new(),
        }
    }

    fn temp_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("strand_{tag}_{}", uuid::Uuid::now_v7()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn edit_ambiguous_string_rejected() {
        let dir = temp_dir("edit");
        fs::write(
            dir.join("test.rs"),
            "fn hello() {\n    println!(\"hello\");\n}\n",
        )
        .unwrap();

        let tool = EditTool;
        let result = tool
            .execute(
                serde_json::json!({
                    "file_path": dir.join("test.rs").to_str().unwrap(),
                    "old_string": "hello",
                    "new_string": "world"
                }),
                &test_ctx(&dir),
            )
            .await;

        let err = result.unwrap_err().to_string();
        assert!(err.contains("not unique"));

        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn edit_unique_string() {
        let dir = temp_dir("edit");
        fs::write(
            dir.join("test.rs"),
            "fn main() {\n    println!(\"hello\");\n}\n",
        )
        .unwrap();

        let tool = EditTool;
        let result = tool
            .execute(
                serde_json::json!({
                    "file_path": dir.join("test.rs").to_str().unwrap(),
                    "old_string": "fn main()",
                    "new_string": "fn start()"
                }),
                &test_ctx(&dir),
            )
            .await
            .unwrap();

        assert!(!result.is_error);
        let content = fs::read_to_string(dir.join("test.rs")).unwrap();
        assert!(content.contains("fn start()"));
        assert!(!content.contains("fn main()"));

        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn edit_replace_all() {
        let dir = temp_dir("edit");
        fs::write(dir.join("test.txt"), "foo bar foo baz foo").unwrap();

        let tool = EditTool;
        let result = tool
            .execute(
                serde_json::json!({
                    "file_path": dir.join("test.txt").to_str().unwrap(),
                    "old_string": "foo",
                    "new_string": "qux",
                    "replace_all": true
                }),
                &test_ctx(&dir),
            )
            .await
            .unwrap();

        assert!(result.content.contains("3 occurrence"));
        assert_eq!(
            fs::read_to_string(dir.join("test.txt")).unwrap(),
            "qux bar qux baz qux"
        );

        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn edit_not_found() {
        let dir = temp_dir("edit");
        fs::write(dir.join("test.txt"), "hello world").unwrap();

        let tool = EditTool;
        let result = tool
            .execute(
                serde_json::json!({
                    "file_path": dir.join("test.txt").to_str().unwrap(),
                    "old_string": "nonexistent",
                    "new_string": "replacement"
                }),
                &test_ctx(&dir),
            )
            .await;

        assert!(result.is_err());

        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn edit_same_string_rejected() {
        let dir = temp_dir("edit");
        fs::write(dir.join("test.txt"), "hello").unwrap();

        let tool = EditTool;
        let result = tool
            .execute(
                serde_json::json!({
                    "file_path": dir.join("test.txt").to_str().unwrap(),
                    "old_string": "hello",
                    "new_string": "hello"
                }),
                &test_ctx(&dir),
            )
            .await;

        assert!(result.is_err());

        fs::remove_dir_all(&dir).ok();
    }
}
