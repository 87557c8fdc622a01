//! Text and JSON output.

use crate::error::CliResult;
use clap::ValueEnum;
use serde::Serialize;

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// A command result that can be printed either way.
pub trait Render: Serialize {
    /// The human-readable form, one item per line.
    fn render_text(&self) -> String;
}

/// Prints a result in the chosen format.
pub fn emit<T: Render>(format: OutputFormat, value: &T) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => print!("{}", value.render_text()),
    }
    Ok(())
}
