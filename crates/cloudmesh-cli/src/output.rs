//! Output helpers shared by the commands.
//!
//! In JSON mode only [`print`] writes to stdout so that the output stays a
//! single parseable document; the message helpers are text-only.

use colored::Colorize;
use serde::Serialize;

use crate::OutputFormat;

/// Print a result as pretty JSON.
pub fn print<T: Serialize>(value: &T, format: OutputFormat, quiet: bool) {
    if quiet || format != OutputFormat::Json {
        return;
    }
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("{}: cannot serialize result: {}", "Error".red().bold(), e),
    }
}

pub fn success(message: &str, format: OutputFormat, quiet: bool) {
    if quiet || format == OutputFormat::Json {
        return;
    }
    println!("{} {}", "✓".green().bold(), message);
}

pub fn info(message: &str, format: OutputFormat, quiet: bool) {
    if quiet || format == OutputFormat::Json {
        return;
    }
    println!("{} {}", "→".cyan(), message);
}

/// Warnings go to stderr in both modes.
pub fn warning(message: &str, quiet: bool) {
    if quiet {
        return;
    }
    eprintln!("{}: {}", "Warning".yellow().bold(), message);
}
