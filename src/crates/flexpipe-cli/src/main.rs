//! flexpipe CLI entry point

use anyhow::Context;
use clap::Parser;
use flexpipe_cli::{Shell, ShellConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Runtime reconfiguration CLI for P4 switches
#[derive(Parser, Debug)]
#[command(name = "flexpipe")]
#[command(version)]
#[command(about = "Reprogram P4 data-plane pipelines at runtime", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run a command script instead of the interactive loop
    #[arg(long, value_name = "FILE")]
    script: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match &args.config {
        Some(path) => ShellConfig::from_file(path)
            .await
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ShellConfig::default(),
    };

    let mut shell = Shell::new(config).context("initializing shell")?;
    let code = match &args.script {
        Some(path) => {
            let script = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading script {}", path.display()))?;
            shell.run_script(&script).await
        }
        None => shell.run_interactive().await,
    };
    std::process::exit(code);
}
