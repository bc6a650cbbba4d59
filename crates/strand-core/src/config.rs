use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapter::ThinkingLevel;

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-5.2";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Anthropic,
    OpenAi,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// Backend plus model name, parsed from "backend/model".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub backend: Backend,
    pub model: String,
}

impl ModelSelection {
    pub fn new(backend: Backend, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }

    pub fn default_for(backend: Backend) -> Self {
        match backend {
            Backend::Anthropic => Self::new(backend, DEFAULT_ANTHROPIC_MODEL),
            Backend::OpenAi => Self::new(backend, DEFAULT_OPENAI_MODEL),
        }
    }
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self::new(Backend::Anthropic, DEFAULT_ANTHROPIC_MODEL)
    }
}

impl FromStr for ModelSelection {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((backend, model)) if !model.is_empty() => Ok(Self {
                backend: backend.parse()?,
                model: model.to_string(),
            }),
            _ => Err(format!("expected backend/model, got: {s}")),
        }
    }
}

impl std::fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.backend, self.model)
    }
}

/// Configuration surface consumed by the orchestration core.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub model: ModelSelection,
    pub thinking_level: ThinkingLevel,
    pub max_retries: u32,
    /// Context token count above which compaction triggers between turns.
    pub compaction_threshold: u32,
    /// Messages kept verbatim at the transcript tail when compacting.
    pub compaction_keep_recent: usize,
    pub tool_timeout: Duration,
    pub max_turns: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: ModelSelection::default(),
            thinking_level: ThinkingLevel::Medium,
            max_retries: 3,
            compaction_threshold: 150_000,
            compaction_keep_recent: 20,
            tool_timeout: Duration::from_secs(120),
            max_turns: 50,
        }
    }
}

impl AgentConfig {
    /// Build a config from STRAND_* environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(model) = env_parse::<ModelSelection>("STRAND_MODEL") {
            config.model = model;
        }
        if let Some(level) = env_parse::<ThinkingLevel>("STRAND_THINKING") {
            config.thinking_level = level;
        }
        if let Some(retries) = env_parse::<u32>("STRAND_MAX_RETRIES") {
            config.max_retries = retries;
        }
        if let Some(threshold) = env_parse::<u32>("STRAND_COMPACTION_THRESHOLD") {
            config.compaction_threshold = threshold;
        }
        if let Some(keep) = env_parse::<usize>("STRAND_COMPACTION_KEEP_RECENT") {
            config.compaction_keep_recent = keep;
        }
        if let Some(secs) = env_parse::<u64>("STRAND_TOOL_TIMEOUT_SECS") {
            config.tool_timeout = Duration::from_secs(secs);
        }
        if let Some(turns) = env_parse::<u32>("STRAND_MAX_TURNS") {
            config.max_turns = turns;
        }
        config
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
