//! docflow script runner
//!
//! Loads an engine configuration, builds the hook registry with the
//! configured plugins on an in-memory store and runs a JSON-lines script of
//! lifecycle operations against it.
//!
//! Usage:
//!   docflow --config docflow.toml --script ops.jsonl
//!
//! Results go to stdout, one JSON line per operation. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use docflow_cli::ScriptRunner;
use docflow_engine::EngineConfig;
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docflow")]
#[command(about = "Run docflow lifecycle operations from a JSON-lines script")]
struct Args {
    /// Engine configuration (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Script to run; reads stdin when omitted
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(level: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = EngineConfig::load_from(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    init_tracing(&config.logging.level, args.verbose);
    info!(
        config = %args.config.display(),
        schemas = config.schemas.len(),
        "docflow starting"
    );

    let runner = ScriptRunner::from_config(&config)?;
    let stdout = tokio::io::stdout();
    let summary = match &args.script {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open script {}", path.display()))?;
            runner.run(BufReader::new(file), stdout).await?
        }
        None => runner.run(BufReader::new(tokio::io::stdin()), stdout).await?,
    };

    if summary.failed > 0 {
        anyhow::bail!(
            "{} of {} operations failed",
            summary.failed,
            summary.failed + summary.succeeded
        );
    }
    Ok(())
}
