//! CLI module for L.O.O.M
//!
//! Provides command-line interface parsing and handling for the loom-server binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// L.O.O.M - Layered Orchestration Of Market analysts
///
/// Fans one analysis pipeline out per exchange, runs them concurrently
/// and consolidates the results into a single report.
#[derive(Parser, Debug)]
#[command(
    name = "loom-server",
    author = "Dirmacs <build@dirmacs.com>",
    version,
    about = "L.O.O.M - Layered Orchestration Of Market analysts",
    long_about = "L.O.O.M - Layered Orchestration Of Market analysts\n\n\
                  A concurrent fan-out/fan-in pipeline orchestrator. Each requested exchange gets\n\
                  its own pipeline and blackboard namespace; the results are folded into one report.\n\n\
                  Run without arguments to start the HTTP server, or use 'run' for a one-shot dispatch.",
    after_help = "EXAMPLES:\n    \
                  loom-server                          # Start the server (reads loom.toml if present)\n    \
                  loom-server run request.json         # Dispatch one request from a file\n    \
                  echo '{...}' | loom-server run -     # Dispatch one request from stdin\n    \
                  loom-server config --validate        # Check the configuration file"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "loom.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the HTTP API server (default)
    Serve,

    /// Dispatch a single request and print the response envelope
    ///
    /// Exits with status 1 when the envelope reports an error.
    Run {
        /// Request file, or '-' to read from stdin
        input: String,

        /// Pretty-print the JSON envelope
        #[arg(short, long)]
        pretty: bool,
    },

    /// Show configuration information
    Config {
        /// Validate the configuration file
        #[arg(long)]
        validate: bool,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand to run; a bare invocation serves.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}
