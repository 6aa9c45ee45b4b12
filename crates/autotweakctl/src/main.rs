//! AutoTweak - reversible Linux performance tuning
//!
//! Applies tuning operations, lists what has been applied, and reverts it.

mod commands;

use anyhow::{Context, Result};
use autotweak_common::config::AutoTweakConfig;
use autotweak_common::logging;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "autotweak")]
#[command(about = "Reversible Linux performance tuning", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: $AUTOTWEAK_CONFIG or /etc/autotweak/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    /// Also log to the terminal
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply one or more tuning operations
    Apply {
        /// cleanup, ram_swap, boot, kernel, storage, gaming, or all
        #[arg(required = true)]
        kinds: Vec<String>,

        /// Include gaming tuning in `all`
        #[arg(long)]
        gaming: bool,
    },

    /// List applied operations that can be reverted
    History,

    /// Revert one operation by number, or all of them
    Revert {
        /// Entry number from `history`, or `all`
        selection: String,
    },

    /// Show system information
    Info,
}

/// How a successfully handled command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Partial,
}

impl Outcome {
    fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::Partial => ExitCode::from(2),
        }
    }
}

fn run(cli: Cli) -> Result<Outcome> {
    let config = match &cli.config {
        Some(path) => AutoTweakConfig::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AutoTweakConfig::load(),
    };

    if let Some(log_file) = logging::init(&config.log, cli.verbose) {
        tracing::info!("AutoTweak v{} logging to {}", env!("CARGO_PKG_VERSION"), log_file.display());
    }

    let app = commands::App::new(config, cli.yes);
    match cli.command {
        Commands::Apply { kinds, gaming } => app.apply(&kinds, gaming),
        Commands::History => app.history(),
        Commands::Revert { selection } => app.revert(&selection),
        Commands::Info => app.info(),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("{} {:#}", "error:".bright_red(), e);
            ExitCode::from(1)
        }
    }
}
