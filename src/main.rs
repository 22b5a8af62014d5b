use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use council::config::CliOverrides;
use council::ui::UiMode;
use council_common::{MemoryStrategy, Provider};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, prelude::*};

mod cmd;

#[derive(Parser)]
#[command(name = "council")]
#[command(version, about = "Investment-debate pipeline orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .council/ with a default configuration and pipeline
    Init,
    /// Show the expanded unit order of a pipeline
    Plan {
        /// Pipeline file (defaults to .council/pipeline.yaml)
        #[arg(long)]
        pipeline: Option<PathBuf>,

        /// Print units as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a pipeline for one company and trade date
    Run(RunArgs),
    /// Inspect recorded sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Ticker or company name
    pub company: String,

    /// Trade date, e.g. 2024-05-10
    pub trade_date: String,

    /// Pipeline file (defaults to .council/pipeline.yaml)
    #[arg(long)]
    pub pipeline: Option<PathBuf>,

    /// JSON object of extra initial state fields, layered over company and date
    #[arg(long)]
    pub seed: Option<PathBuf>,

    /// Stop cleanly once this unit completes (see `council plan` for ids)
    #[arg(long)]
    pub stop_after: Option<String>,

    /// Use placeholder abilities instead of the LLM gateway
    #[arg(long)]
    pub dry_run: bool,

    /// Memory strategy forced on every unit: history, situation
    #[arg(long)]
    pub memory_strategy: Option<MemoryStrategy>,

    /// Neighbours retrieved by the situation strategy
    #[arg(long)]
    pub top_k: Option<u32>,

    /// Provider for every ability: openrouter, openai, anthropic, deepseek, gemini, ollama
    #[arg(long)]
    pub provider: Option<Provider>,

    /// Model name for every ability
    #[arg(long)]
    pub model: Option<String>,

    /// OpenAI-compatible endpoint for every ability
    #[arg(long)]
    pub base_url: Option<String>,

    /// UI output mode: full, minimal, json
    #[arg(long)]
    pub ui: Option<UiMode>,

    /// Fail the run on the first gateway error instead of degrading
    #[arg(long)]
    pub fail_fast: bool,
}

impl RunArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            memory_strategy: self.memory_strategy,
            top_k: self.top_k,
            provider: self.provider,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            fail_fast: self.fail_fast,
            ui: self.ui,
        }
    }
}

#[derive(Subcommand, Clone)]
pub enum SessionCommands {
    /// List sessions, most recent first
    List {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show one session's header and invocations
    Show {
        id: String,

        /// Also list every progress event
        #[arg(long)]
        events: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default council.toml file
    Init,
}

/// Stderr logging plus, once `.council/logs` exists, a daily JSON log file.
fn init_tracing(project_dir: &Path, verbose: bool) -> Option<WorkerGuard> {
    let level = if verbose { "debug" } else { "warn" };
    let stderr_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("council={},warn", level).into());

    let log_dir = council::init::get_council_dir(project_dir).join("logs");
    let (file_layer, guard) = if log_dir.is_dir() {
        let appender = tracing_appender::rolling::daily(&log_dir, "council.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_filter(EnvFilter::new("council=info,warn"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(stderr_filter),
        )
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    dotenvy::from_path(project_dir.join(".env")).ok();
    let _guard = init_tracing(&project_dir, cli.verbose);

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Plan { pipeline, json } => {
            cmd::cmd_plan(&cli, &project_dir, pipeline.as_ref(), *json)?
        }
        Commands::Run(args) => return cmd::cmd_run(&cli, &project_dir, args).await,
        Commands::Session { command } => cmd::cmd_session(&project_dir, command)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(ExitCode::SUCCESS)
}
