//! mmps - multi-pass problem solver CLI
//!
//! Reads one problem statement, runs the configured number of five-stage
//! pipeline instances against a chat-completions API, and prints the
//! best-scoring final answer.

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use mmps_common::{audit, config};
use mmps_engine::events::PipelineEvent;
use mmps_engine::generation::{GenerationClient, OpenAiClient, OpenAiSettings, RetryingClient};
use mmps_engine::settings::EngineSettings;
use mmps_engine::{BestAnswer, Session};

/// Wrapper placed around the answer by `--handoff`, for pasting into a
/// code-generation model
const HANDOFF_PREAMBLE: &str = "Do not simplify anything.\n\
Compare with the original functionality.\n\
Do not explain, just generate the full code in one shot.\n\
Follow exactly what these instructions and requirements say and implement them as a complete, working solution.";

/// Command-line arguments for mmps
#[derive(Parser, Debug)]
#[command(name = "mmps")]
#[command(about = "Solve a problem with parallel multi-stage LLM pipelines and keep the best answer")]
#[command(version)]
struct Args {
    /// Problem statement (prompted for on stdin when omitted)
    prompt: Option<String>,

    /// Path to TOML config file
    #[arg(short, long, env = "MMPS_CONFIG")]
    config: Option<PathBuf>,

    /// Number of pipeline instances (overrides config)
    #[arg(short = 'n', long)]
    instances: Option<usize>,

    /// Wrap the answer in a code-generation handoff preamble
    #[arg(long)]
    handoff: bool,

    /// Do not write a session audit log file
    #[arg(long)]
    no_audit: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = config::resolve_config_path(args.config.as_deref());
    let toml_config =
        config::load_config(config_path.as_deref()).context("Failed to load configuration")?;

    let problem = match args.prompt {
        Some(prompt) => prompt,
        None => read_prompt().context("Failed to read problem statement")?,
    };
    if problem.trim().is_empty() {
        bail!("Problem statement is empty");
    }

    let audit_path = if toml_config.logging.audit && !args.no_audit {
        let directory = toml_config
            .logging
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let started_at = chrono::Local::now().naive_local();
        Some(audit::audit_log_path(&directory, &problem, &started_at))
    } else {
        None
    };
    init_tracing(&toml_config.logging.level, audit_path.as_deref())?;

    info!("Starting mmps v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => info!("No config file found, using built-in defaults"),
    }

    let settings =
        EngineSettings::from_config_with_instances(&toml_config, args.instances)
            .context("Invalid configuration")?;
    info!(
        instances = settings.schedule.instances,
        workers = settings.workers,
        "Engine settings resolved"
    );
    if let Some(path) = &audit_path {
        info!("Session audit log: {}", path.display());
    }
    info!(problem = %problem, "Received problem statement");

    let client = build_client(&toml_config)?;

    let (event_tx, event_rx) = mpsc::channel(64);
    let progress = tokio::spawn(report_progress(event_rx, settings.schedule.instances));

    let session = Session::with_events(client, settings, event_tx);
    let result = session.run(&problem).await;
    drop(session);
    let _ = progress.await;

    let best = result.context("Problem-solving session failed")?;
    print_answer(&best, args.handoff)?;
    Ok(())
}

/// Prompt on stdout and read one line from stdin
fn read_prompt() -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "Enter your main prompt: ")?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Stderr logging plus an optional DEBUG-level audit file
fn init_tracing(level: &str, audit_path: Option<&Path>) -> Result<()> {
    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("mmps={0},mmps_engine={0},mmps_common={0}", level))
    });
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(stderr_filter);

    let audit_layer = match audit_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory {}", parent.display())
                })?;
            }
            let file = File::create(path)
                .with_context(|| format!("Failed to create audit log {}", path.display()))?;
            let targets = Targets::new()
                .with_target("mmps", Level::DEBUG)
                .with_target("mmps_engine", Level::DEBUG)
                .with_target("mmps_common", Level::DEBUG);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(targets),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(audit_layer)
        .try_init()
        .context("Failed to initialize tracing")?;
    Ok(())
}

/// OpenAI client, wrapped for retries when configured
fn build_client(toml_config: &config::TomlConfig) -> Result<Arc<dyn GenerationClient>> {
    let api_key = config::resolve_api_key(toml_config)?;
    let generation = &toml_config.generation;

    let client: Arc<dyn GenerationClient> = Arc::new(
        OpenAiClient::new(OpenAiSettings::from_config(generation, api_key))
            .context("Failed to create generation client")?,
    );

    if generation.max_retries > 0 {
        info!(max_retries = generation.max_retries, "Generation retries enabled");
        Ok(Arc::new(RetryingClient::new(client, generation.max_retries)))
    } else {
        Ok(client)
    }
}

/// Log progress events until the session drops its sender
async fn report_progress(mut rx: mpsc::Receiver<PipelineEvent>, total: usize) {
    let mut completed = 0usize;
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::InstanceStarted {
                instance,
                temperature,
                max_output_tokens,
            } => info!(
                "Instance {}/{}: starting (temperature {:.2}, max tokens {})",
                instance + 1,
                total,
                temperature,
                max_output_tokens
            ),
            PipelineEvent::StageCompleted { instance, stage, chars } => info!(
                "Instance {}/{}: stage {}/5 done ({} chars)",
                instance + 1,
                total,
                stage,
                chars
            ),
            PipelineEvent::InstanceCompleted { instance } => {
                completed += 1;
                info!(
                    "Instance {}/{} finished [{}/{} complete]",
                    instance + 1,
                    total,
                    completed,
                    total
                );
            }
            PipelineEvent::InstanceFailed {
                instance,
                stage,
                message,
            } => warn!("Instance {}/{} failed at stage {}: {}", instance + 1, total, stage, message),
            PipelineEvent::ScoringStarted { candidates } => {
                info!("Scoring {} final responses", candidates)
            }
            PipelineEvent::Selected {
                instance,
                score,
                degraded,
            } => {
                if degraded {
                    warn!("Scores could not be parsed; defaulting to instance {}", instance + 1);
                } else {
                    info!("Selected instance {} with score {}", instance + 1, score);
                }
            }
        }
    }
}

fn print_answer(best: &BestAnswer, handoff: bool) -> Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "Best Score: {}\n", best.score)?;
    if handoff {
        writeln!(stdout, "{}\n\"\"\"{}\"\"\"", HANDOFF_PREAMBLE, best.text)?;
    } else {
        writeln!(stdout, "{}", best.text)?;
    }
    Ok(())
}
