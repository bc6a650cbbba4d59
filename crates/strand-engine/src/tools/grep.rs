use async_trait::async_trait;
use std::path::Path;
use std::time::Instant;
use strand_core::tools::{Tool, ToolContext, ToolError, ToolOutput};

const MAX_MATCHES: usize = 5000;

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents using regex patterns"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "required": ["pattern"],
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search in"
                },
                "glob": {
                    "type": "string",
                    "description": "Glob pattern to filter file names (e.g. '*.rs')"
                },
                "output_mode": {
                    "type": "string",
                    "enum": ["content", "files_with_matches", "count"],
                    "description": "Output mode (default: files_with_matches)"
                },
                "head_limit": {
                    "type": "integer",
                    "description": "Limit output to first N results"
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

        let search_path = match args["path"].as_str() {
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

        let glob_filter = args["glob"]
            .as_str()
            .map(|g| {
                glob::Pattern::new(g)
                    .map_err(|e| ToolError::InvalidArguments(format!("invalid glob: {e}")))
            })
            .transpose()?;
        let output_mode = args["output_mode"].as_str().unwrap_or("files_with_matches");
        let head_limit = args["head_limit"].as_u64().unwrap_or(0) as usize;

        let regex = regex::Regex::new(pattern)
            .map_err(|e| ToolError::InvalidArguments(format!("invalid regex: {e}")))?;

        let matches = tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();
            search_path_recursive(&search_path, &regex, glob_filter.as_ref(), &mut matches);
            matches
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("search task failed: {e}")))?;

        Ok(ToolOutput::text(
            format_matches(&matches, output_mode, head_limit),
            start.elapsed(),
        ))
    }
}

struct SearchMatch {
    file: String,
    line_number: usize,
    line: String,
}

fn search_path_recursive(
    path: &Path,
    regex: &regex::Regex,
    glob_filter: Option<&glob::Pattern>,
    matches: &mut Vec<SearchMatch>,
) {
    if matches.len() >= MAX_MATCHES {
        return;
    }
    if path.is_file() {
        let name_ok = glob_filter.map_or(true, |g| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| g.matches(n))
        });
        if !name_ok {
            return;
        }
        if let Ok(content) = std::fs::read_to_string(path) {
            for (i, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(SearchMatch {
                        file: path.display().to_string(),
                        line_number: i + 1,
                        line: line.to_string(),
                    });
                    if matches.len() >= MAX_MATCHES {
                        return;
                    }
                }
            }
        }
    } else if path.is_dir() {
        let Ok(entries) = std::fs::read_dir(path) else {
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
            search_path_recursive(&child, regex, glob_filter, matches);
        }
    }
}

fn format_matches(matches: &[SearchMatch], output_mode: &str, head_limit: usize) -> String {
    match output_mode {
        "content" => {
            let mut lines: Vec<String> = matches
                .iter()
                .map(|m| format!("{}:{}:{}", m.file, m.line_number, m.line))
                .collect();
            if head_limit > 0 {
                lines.truncate(head_limit);
            }
            if lines.is_empty() {
                "(no matches)".to_string()
            } else {
                lines.join("\n")
            }
        }
        "count" => {
            let mut counts: Vec<(String, usize)> = Vec::new();
            for m in matches {
                match counts.iter_mut().find(|(f, _)| f == &m.file) {
                    Some((_, c)) => *c += 1,
                    None => counts.push((m.file.clone(), 1)),
                }
            }
            if head_limit > 0 {
                counts.truncate(head_limit);
            }
            if counts.is_empty() {
                "(no matches)".to_string()
            } else {
                counts
                    .iter()
                    .map(|(f, c)| format!("{f}: {c}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        _ => {
            let mut files: Vec<String> = Vec::new();
            for m in matches {
                if !files.contains(&m.file) {
                    files.push(m.file.clone());
                }
            }
            if head_limit > 0 {
                files.truncate(head_limit);
            }
            if files.is_empty() {
                "(no matches)".to_string()
            } else {
                files.join("\n")
            }
        }
    }
}
