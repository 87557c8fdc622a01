//! FileBot CLI
//!
//! Command-line tools for FileBot global stores.
//!
//! # Commands
//!
//! - `date` - Convert and compute FileMan dates
//! - `inspect` - Display journal statistics and globals
//! - `get` / `order` - Read a node or walk a subscript level
//! - `verify` - Check an entity's cross-references
//! - `rebuild` - Repair an entity's cross-references
//! - `compact` - Rewrite the journal with live values only

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use commands::date::DateCommand;
use error::{CliError, CliResult};
use output::OutputFormat;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// FileBot command-line tools.
#[derive(Parser)]
#[command(name = "filebot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the journal file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert and compute FileMan dates
    #[command(subcommand)]
    Date(DateCommand),

    /// Display journal statistics and globals
    Inspect,

    /// Read one node
    Get {
        /// Global name, with or without the leading caret
        global: String,
        /// Subscripts
        subscripts: Vec<String>,
    },

    /// List the subscripts under a node in collation order
    Order {
        /// Global name, with or without the leading caret
        global: String,
        /// Subscripts of the parent node
        subscripts: Vec<String>,
        /// Walk backwards
        #[arg(short, long)]
        reverse: bool,
        /// Maximum number of subscripts to list
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Check an entity's cross-references against its records
    Verify {
        /// Entity name, file number or global
        #[arg(short, long)]
        entity: String,
    },

    /// Repair an entity's cross-references
    Rebuild {
        /// Entity name, file number or global
        #[arg(short, long)]
        entity: String,
    },

    /// Rewrite the journal so it holds only live values
    Compact {
        /// Show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let format = cli.format;
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match (&e, format) {
                (CliError::FileBot(inner), OutputFormat::Json) => {
                    match serde_json::to_string_pretty(&inner.report()) {
                        Ok(json) => println!("{json}"),
                        Err(_) => eprintln!("error: {e}"),
                    }
                }
                _ => eprintln!("error: {e}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let format = cli.format;
    let path = cli.path;
    let require = |command: &'static str| path.clone().ok_or(CliError::MissingPath { command });

    match cli.command {
        Commands::Date(command) => output::emit(format, &commands::date::run(&command)?),
        Commands::Inspect => {
            let path = require("inspect")?;
            output::emit(format, &commands::inspect::run(&path)?)
        }
        Commands::Get { global, subscripts } => {
            let path = require("get")?;
            output::emit(format, &commands::node::get(&path, &global, &subscripts)?)
        }
        Commands::Order {
            global,
            subscripts,
            reverse,
            limit,
        } => {
            let path = require("order")?;
            let listing = commands::node::order(&path, &global, &subscripts, reverse, limit)?;
            output::emit(format, &listing)
        }
        Commands::Verify { entity } => {
            let path = require("verify")?;
            let outcome = commands::xref::verify(&path, &entity)?;
            output::emit(format, &outcome)?;
            if outcome.report.is_consistent() {
                Ok(())
            } else {
                Err(CliError::Inconsistent {
                    missing: outcome.report.missing.len(),
                    stale: outcome.report.stale.len(),
                })
            }
        }
        Commands::Rebuild { entity } => {
            let path = require("rebuild")?;
            output::emit(format, &commands::xref::rebuild(&path, &entity)?)
        }
        Commands::Compact { dry_run } => {
            let path = require("compact")?;
            output::emit(format, &commands::compact::run(&path, dry_run)?)
        }
        Commands::Version => {
            println!("FileBot CLI v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
