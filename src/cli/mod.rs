//! CLI module: command parsing and dispatch
//!
//! `main.rs` calls [`run`]. Every command loads `.env` and the config file
//! first, so `check` and `tools` see exactly what `run` would use.

mod check;
mod run;
mod tools;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use chatrelay::config::Config;

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(version)]
#[command(about = "Relay between Telegram chats and a language model backend", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.chatrelay/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Skip loading a `.env` file from the working directory
    #[arg(long, global = true)]
    no_dotenv: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Telegram relay (default)
    Run,
    /// Validate configuration and show what would run
    Check,
    /// List the tools that would be bound to the model
    Tools,
}

/// Load `.env` (unless disabled) and the merged configuration.
fn load_config(path: Option<&PathBuf>, dotenv: bool) -> Result<Config> {
    if dotenv {
        // A missing .env file is normal; the process environment still applies.
        let _ = dotenvy::dotenv();
    }
    let config = match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    config.with_context(|| "Failed to load configuration")
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref(), !cli.no_dotenv)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run::cmd_run(config).await,
        Commands::Check => check::cmd_check(&config),
        Commands::Tools => tools::cmd_tools(&config).await,
    }
}
