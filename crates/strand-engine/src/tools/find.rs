use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use strand_core::tools::{Tool, ToolContext, ToolError, ToolOutput};

const MAX_RESULTS: usize = 2000;

pub struct FindTool;

#[async_trait]
impl Tool for FindTool {
    fn name(&self) -> &str {
        "find"
    }

    fn description(&self) -> &str {
        "Find files by glob pattern"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["pattern"],
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern matched against paths relative to the search root (e.g. 'src/**/*.rs')"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search in (default: working directory)"
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

        let pattern = args["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("pattern is required".into()))?;

        let root = match args["path"].as_str() {
            Some(p) => {
                let path = Path::new(p);
                if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    ctx.working_directory.join(path)
                }
            }
            None => ctx.working_directory.clone(),
        };

        let glob = glob::Pattern::new(pattern)
            .map_err(|e| ToolError::InvalidArguments(format!("invalid glob: {e}")))?;

        let root_clone = root.clone();
        let mut found = tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            walk(&root_clone, &root_clone, &glob, &mut found);
            found
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("find task failed: {e}")))?;

        found.sort();
        let content = if found.is_empty() {
            "(no files matched)".to_string()
        } else {
            found
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n")
        };

        Ok(ToolOutput::text(content, start.elapsed()))
    }
}

fn walk(root: &Path, dir: &Path, glob: &glob::Pattern, found: &mut Vec<PathBuf>) {
    if found.len() >= MAX_RESULTS {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut children: Vec<_> = entries.flatten().map(|e| e.path()).collect();
    children.sort();
    for child in children {
        let hidden = child
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with('.'));
        if hidden {
            continue;
        }
        if child.is_dir() {
            walk(root, &child, glob, found);
        } else if let Ok(relative) = child.strip_prefix(root) {
            if glob.matches_path(relative) {
                found.push(child.clone());
                if found.len() >= MAX_RESULTS {
                    return;
                }
            }
        }
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

    fn fixture_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("strand_find_{}", uuid::Uuid::now_v7()));
        fs::create_dir_all(dir.join("src/nested")).unwrap();
        fs::write(dir.join("src/main.rs"), "").unwrap();
        fs::write(dir.join("src/nested/lib.rs"), "").unwrap();
        fs::write(dir.join("readme.md"), "").unwrap();
        dir
    }

    #[tokio::test]
    async fn finds_by_extension() {
        let dir = fixture_dir();
        let tool = FindTool;
        let result = tool
            .execute(serde_json::json!({"pattern": "**/*.rs"}), &test_ctx(&dir))
            .await
            .unwrap();

        assert!(result.content.contains("main.rs"));
        assert!(result.content.contains("lib.rs"));
        assert!(!result.content.contains("readme.md"));

        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn results_sorted() {
        let dir = fixture_dir();
        let tool = FindTool;
        let result = tool
            .execute(serde_json::json!({"pattern": "**/*"}), &test_ctx(&dir))
            .await
            .unwrap();

        let lines: Vec<&str> = result.content.lines().collect();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);

        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn no_matches() {
        let dir = fixture_dir();
        let tool = FindTool;
        let result = tool
            .execute(serde_json::json!({"pattern": "**/*.py"}), &test_ctx(&dir))
            .await
            .unwrap();

        assert_eq!(result.content, "(no files matched)");

        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn invalid_glob_rejected() {
        let tool = FindTool;
        let result = tool
            .execute(
                serde_json::json!({"pattern": "[unclosed"}),
                &test_ctx(&std::env::temp_dir()),
            )
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
