//! `unistream` replay CLI.
//!
//! Reads a captured provider response (an SSE stream or a complete JSON
//! body) and prints what the normalization layer makes of it: normalized
//! events, assembled display groups or the provider-native persisted content.

use std::path::Path;
use std::pin::Pin;
use std::process::ExitCode;

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use unistream::config::{AppConfig, Cli, LoggingConfig, OutputFormat, ReplayMode};
use unistream::normalized::{sse_event, to_json_lines};
use unistream::pipeline::{TurnOutput, collect_turn, convert_complete, normalize_sse_for};

type Input = Pin<Box<dyn AsyncRead + Send>>;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env (if present)
    let _ = dotenv();

    let cli = Cli::parse();
    let config = AppConfig::from_cli(&cli).context("Failed to load configuration")?;
    init_tracing(&config.logging);

    let replay = &config.replay;
    info!(
        name: "replay.start",
        family = %replay.family,
        mode = replay.mode.as_str(),
        output = replay.output.as_str(),
        "Replaying capture"
    );

    let input = open_input(cli.input.as_deref()).await?;
    let mut stdout = tokio::io::stdout();

    let turn = match (replay.mode, replay.output) {
        // Event outputs stream straight through as frames are decoded.
        (ReplayMode::Stream, OutputFormat::Events | OutputFormat::Sse) => {
            let mut events = normalize_sse_for(replay.family, ReaderStream::new(input));
            let mut status = ExitCode::SUCCESS;
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        error!(family = %replay.family, error = %e, "Replay ended with an error");
                        status = ExitCode::FAILURE;
                        break;
                    }
                };
                let line = match replay.output {
                    OutputFormat::Sse => sse_event(&event),
                    _ => to_json_lines([&event])?,
                };
                stdout.write_all(line.as_bytes()).await?;
            }
            stdout.flush().await?;
            return Ok(status);
        }
        (ReplayMode::Stream, _) => collect_turn(replay.family, ReaderStream::new(input)).await,
        (ReplayMode::Complete, _) => {
            let mut body = String::new();
            let mut input = input;
            input.read_to_string(&mut body).await?;
            convert_complete(replay.family, &body).context("Invalid response body")?
        }
    };

    stdout
        .write_all(render(&turn, replay.output)?.as_bytes())
        .await?;
    stdout.flush().await?;

    Ok(if turn.error.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries the replay output
    if logging.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

async fn open_input(path: Option<&Path>) -> anyhow::Result<Input> {
    match path {
        Some(path) if path != Path::new("-") => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Ok(Box::pin(file))
        }
        _ => Ok(Box::pin(tokio::io::stdin())),
    }
}

fn render(turn: &TurnOutput, output: OutputFormat) -> anyhow::Result<String> {
    let mut out = match output {
        OutputFormat::Events => to_json_lines(&turn.events)?,
        OutputFormat::Sse => turn.events.iter().map(sse_event).collect(),
        OutputFormat::Groups => serde_json::to_string_pretty(&turn.groups)?,
        OutputFormat::FullContent => serde_json::to_string_pretty(&turn.full_content)?,
    };
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}
