//! Date command implementation.

use crate::error::{CliError, CliResult};
use crate::output::Render;
use chrono::NaiveDate;
use clap::Subcommand;
use filebot_core::{date, DateStyle, YearPivot};
use serde::Serialize;

/// Date subcommands.
#[derive(Debug, Subcommand)]
pub enum DateCommand {
    /// Encode an ISO date (YYYY-MM-DD) as YYYMMDD
    Encode {
        /// Calendar date
        date: String,
    },
    /// Decode YYYMMDD to an ISO date
    Decode {
        /// Internal date
        internal: String,
    },
    /// Add (or subtract) days
    Add {
        /// Internal date
        internal: String,
        /// Days to add; negative subtracts
        #[arg(allow_hyphen_values = true)]
        days: i64,
    },
    /// Days from one date to another
    Diff {
        /// Internal start date
        from: String,
        /// Internal end date
        to: String,
    },
    /// Whole years of age
    Age {
        /// Internal birth date
        birth: String,
        /// Internal reference date (default: today)
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Render for display
    Format {
        /// Internal date
        internal: String,
        /// standard, long, short, iso or fileman
        #[arg(short, long, default_value = "standard")]
        style: DateStyle,
    },
    /// Parse display text into YYYMMDD
    Parse {
        /// Text such as 01/15/1985, 1985-01-15 or Jan 15, 1985
        text: String,
        /// Two-digit years up to this value are in the 2000s
        #[arg(long, default_value_t = YearPivot::default().value())]
        pivot: u8,
    },
}

/// The outcome of a date command.
#[derive(Debug, Serialize)]
pub struct DateOutput {
    /// Subcommand name.
    pub operation: &'static str,
    /// Primary input as given.
    pub input: String,
    /// Result; empty for an unset date.
    pub result: String,
}

impl Render for DateOutput {
    fn render_text(&self) -> String {
        format!("{}\n", self.result)
    }
}

fn output(operation: &'static str, input: &str, result: impl ToString) -> DateOutput {
    DateOutput {
        operation,
        input: input.to_string(),
        result: result.to_string(),
    }
}

/// Runs a date subcommand.
pub fn run(command: &DateCommand) -> CliResult<DateOutput> {
    match command {
        DateCommand::Encode { date: text } => {
            let day = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                .map_err(|e| CliError::InvalidArgument(format!("{text:?}: {e}")))?;
            Ok(output("encode", text, date::encode(day)?))
        }
        DateCommand::Decode { internal } => {
            let result = date::external_format(internal, DateStyle::Iso)?;
            Ok(output("decode", internal, result))
        }
        DateCommand::Add { internal, days } => {
            Ok(output("add", internal, date::add_days(internal, *days)?))
        }
        DateCommand::Diff { from, to } => Ok(output("diff", from, date::diff_days(from, to)?)),
        DateCommand::Age { birth, as_of } => {
            let years = date::age_in_years(birth, as_of.as_deref())?;
            Ok(output("age", birth, years))
        }
        DateCommand::Format { internal, style } => {
            Ok(output("format", internal, date::external_format(internal, *style)?))
        }
        DateCommand::Parse { text, pivot } => {
            let parsed = date::parse_external(text, YearPivot::new(*pivot))?;
            Ok(output("parse", text, parsed.unwrap_or_default()))
        }
    }
}
