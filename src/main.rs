use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use strand_core::adapter::ProviderAdapter;
use strand_core::config::{AgentConfig, Backend};
use strand_core::events::{AgentEvent, MessageDelta};
use strand_core::ids::SessionId;
use strand_engine::tools::create_default_registry;
use strand_engine::Orchestrator;
use strand_llm::anthropic::AnthropicAdapter;
use strand_llm::openai::OpenAiAdapter;
use strand_store::{Database, SessionRepo};

const SYSTEM_PROMPT: &str = "You are a coding agent running in a terminal. \
Use the available tools to inspect and modify the working directory. \
Be direct and keep answers short.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    strand_telemetry::init(&strand_telemetry::LoggingConfig::default());

    let prompt: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if prompt.trim().is_empty() {
        bail!("usage: strand <prompt>  (reads STRAND_MODEL, STRAND_RESUME, ANTHROPIC_API_KEY / OPENAI_API_KEY)");
    }

    let config = AgentConfig::from_env();
    let adapter = build_adapter(&config)?;
    tracing::info!(backend = %config.model.backend, model = adapter.model(), "adapter ready");

    let db_path = strand_home().join("sessions.db");
    let repo = SessionRepo::new(Database::open(&db_path).context("open session store")?);

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/tmp"));
    let registry = Arc::new(create_default_registry());
    let config_for_engine = config.clone();

    let mut orchestrator = match std::env::var("STRAND_RESUME").ok() {
        Some(raw_id) => {
            let id = SessionId::from_raw(raw_id);
            let session = repo.load(&id).context("load resumed session")?;
            tracing::info!(session_id = %id, messages = session.transcript().len(), "session resumed");
            Orchestrator::with_session(adapter, registry, config_for_engine, cwd, session)
        }
        None => Orchestrator::new(adapter, registry, config_for_engine, cwd),
    }
    .with_system_prompt(SYSTEM_PROMPT)
    // Print mode has no one to ask; approve confirmation-gated tools.
    .with_confirmation_hook(Arc::new(|_call| true));

    let mut events = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(event) = events.recv().await {
            match event {
                AgentEvent::MessageUpdate {
                    delta: MessageDelta::Text { text },
                    ..
                } => {
                    let _ = stdout.write_all(text.as_bytes());
                    let _ = stdout.flush();
                }
                AgentEvent::MessageUpdate {
                    delta: MessageDelta::ToolCall { tool_call },
                    ..
                } => {
                    eprintln!("[tool] {} {}", tool_call.name, tool_call.arguments);
                }
                AgentEvent::TurnEnd { error: Some(info), .. } => {
                    eprintln!("[turn error] {}: {}", info.kind, info.message);
                }
                AgentEvent::AgentEnd => {
                    let _ = stdout.write_all(b"\n");
                    let _ = stdout.flush();
                }
                _ => {}
            }
        }
    });

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            canceller.cancel();
        }
    });

    let run_result = orchestrator.submit(prompt, &cancel).await;

    let session = orchestrator.into_session();
    if let Err(e) = repo.save(&session) {
        tracing::error!(error = %e, "failed to save session");
    } else {
        tracing::info!(session_id = %session.id(), "session saved (STRAND_RESUME to continue)");
    }
    drop(repo);

    let _ = printer.await;

    run_result.context("agent run failed")?;
    Ok(())
}

fn build_adapter(config: &AgentConfig) -> anyhow::Result<Arc<dyn ProviderAdapter>> {
    let model = Some(config.model.model.as_str());
    match config.model.backend {
        Backend::Anthropic => {
            let key = std::env::var("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY not set")?;
            Ok(Arc::new(AnthropicAdapter::new(SecretString::from(key), model)?))
        }
        Backend::OpenAi => {
            let key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")?;
            Ok(Arc::new(OpenAiAdapter::new(SecretString::from(key), model)?))
        }
    }
}

fn strand_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".strand")
}
