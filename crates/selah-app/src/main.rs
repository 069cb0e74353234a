//! Selah application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Initialize tracing
//! 3. Build the chat orchestrator against the upstream service
//! 4. Stream one reply per message to stdout, with suggestions

mod cli;

use std::io::Write;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use selah_chat::{ChatOrchestrator, Credentials, SendRequest, StreamEvent};
use selah_core::{Lang, SelahConfig};

use crate::cli::CliArgs;

const DEFAULT_SYSTEM_PROMPT: &str = "You are Selah, a warm and thoughtful Bible study companion. \
Ground your answers in Scripture, cite book, chapter and verse when you quote it, \
and acknowledge where Christian traditions differ.";

/// How one streamed request ended, from the terminal's point of view.
enum Finish {
    Done,
    Failed,
    Interrupted,
}

/// Send one message and stream its events to stdout/stderr.
async fn stream_reply(
    orchestrator: &ChatOrchestrator,
    system_prompt: &str,
    message: &str,
    credentials: &Credentials,
    lang: Option<Lang>,
) -> Result<Finish, Box<dyn std::error::Error>> {
    let mut request = SendRequest::new(system_prompt, message, credentials.clone());
    if let Some(lang) = lang {
        request = request.with_lang(lang);
    }
    let mut handle = orchestrator.send(request)?;
    let mut stdout = std::io::stdout();

    loop {
        let next = tokio::select! {
            event = handle.next_event() => Some(event),
            _ = tokio::signal::ctrl_c() => None,
        };

        let Some(event) = next else {
            handle.cancel();
            eprintln!("\n[cancelled]");
            return Ok(Finish::Interrupted);
        };
        let Some(event) = event else {
            return Ok(Finish::Interrupted);
        };

        match event {
            StreamEvent::IntentDetected(intent) => {
                tracing::debug!(intent = %intent, "Intent detected");
            }
            StreamEvent::Started { request_id } => {
                tracing::debug!(request_id = %request_id, "Request started");
            }
            StreamEvent::Chunk(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            StreamEvent::Retry { attempt, delay } => {
                eprintln!("\n[retrying, attempt {attempt} in {:.1}s]", delay.as_secs_f32());
            }
            StreamEvent::Completed { metadata, .. } => {
                writeln!(stdout)?;
                tracing::info!(
                    latency_ms = metadata.latency_ms,
                    retries = metadata.retry_count,
                    model = %metadata.model,
                    "Reply complete"
                );
                if !metadata.suggestions.is_empty() {
                    writeln!(stdout)?;
                    for suggestion in &metadata.suggestions {
                        writeln!(stdout, "  > {}", suggestion.text)?;
                    }
                }
                return Ok(Finish::Done);
            }
            StreamEvent::Failed(err) => {
                eprintln!("\n{}", err.localized_message);
                tracing::debug!(kind = err.kind.as_str(), cause = %err.cause, "Request failed");
                return Ok(Finish::Failed);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let config = SelahConfig::load_or_default(&config_file);

    // Tracing. RUST_LOG wins over the flag and the config file.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting Selah v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Credentials.
    let api_key = match std::env::var(&config.upstream.api_key_env) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            tracing::error!(var = %config.upstream.api_key_env, "API key not set");
            return Err(format!("set {} to your API key", config.upstream.api_key_env).into());
        }
    };
    let credentials = Credentials::new(api_key);

    let system_prompt = args
        .system
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    let lang = args.resolve_lang();

    let orchestrator = ChatOrchestrator::with_anthropic(config)?;
    tracing::info!(session = %orchestrator.memory().id(), "Session ready");

    // One-shot mode.
    if let Some(message) = args.one_shot_message() {
        return match stream_reply(&orchestrator, &system_prompt, &message, &credentials, lang).await? {
            Finish::Done => Ok(()),
            Finish::Failed => Err("request failed".into()),
            Finish::Interrupted => Ok(()),
        };
    }

    // Interactive mode: one message per line until EOF.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("selah> ");
        std::io::stderr().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match stream_reply(&orchestrator, &system_prompt, line, &credentials, lang).await {
            Ok(_) => {}
            Err(e) => eprintln!("{e}"),
        }
    }

    orchestrator.memory().dispose();
    tracing::info!("Session closed");
    Ok(())
}
