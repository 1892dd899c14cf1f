//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod export;
mod reports;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::RoboConfig;

#[derive(Parser)]
#[command(name = "robo")]
#[command(about = "Report export robot for the Zero Glosa portal")]
#[command(version)]
pub struct Cli {
    /// Config file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Address to bind: port, host, or host:port (defaults to config / PORT_ROBO)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Export one report and save it to disk
    Export {
        /// Report id (see `robo reports`)
        report: String,
        /// Directory to write the file into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// List the reports that can be exported
    Reports {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => {
            let config = RoboConfig::load(cli.config.as_deref())?;
            serve::cmd_serve(config, bind.as_deref()).await
        }
        Commands::Export { report, output } => {
            let config = RoboConfig::load(cli.config.as_deref())?;
            export::cmd_export(config, &report, &output).await
        }
        Commands::Reports { json } => reports::cmd_reports(json),
    }
}
