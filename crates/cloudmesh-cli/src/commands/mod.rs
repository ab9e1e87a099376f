//! Subcommand implementations.

pub mod audit;
pub mod generate;
pub mod info;
pub mod reconstruct;
pub mod sample;

use anyhow::{Result, bail};
use cloudmesh::{BatchResult, CategoryOutcome, FileOutcome, SelectionReport};
use colored::Colorize;

use crate::{Cli, OutputFormat, output};

/// Print a batch report and fail unless every considered file succeeded.
pub(crate) fn finish_selection(report: &SelectionReport, verb: &str, cli: &Cli) -> Result<()> {
    for warning in report.warnings() {
        output::warning(warning, cli.quiet);
    }

    match cli.format {
        OutputFormat::Json => output::print(report, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                for category in &report.categories {
                    if let CategoryOutcome::Processed { result } = &category.outcome {
                        print_result(category.category.as_deref(), result, verb);
                    }
                }
            }
        }
    }

    let total = report.total_considered();
    let succeeded = report.succeeded();
    let failed = report.failed();

    if report.cancelled() {
        bail!("run cancelled after {} of {} files", succeeded + failed, total);
    }
    if failed > 0 {
        bail!("{} of {} files failed", failed, total);
    }

    output::success(
        &format!("{} {} of {} files", verb, succeeded, total),
        cli.format,
        cli.quiet,
    );
    Ok(())
}

fn print_result(category: Option<&str>, result: &BatchResult, verb: &str) {
    let heading = match category {
        Some(name) => format!("{} ({})", name, result.input_dir.display()),
        None => result.input_dir.display().to_string(),
    };
    println!("{}", heading.bold().underline());
    println!("  {}: {}", "Found".cyan(), result.total_considered);
    println!("  {}: {}", verb.cyan(), result.succeeded);
    if result.skipped() > 0 {
        println!("  {}: {}", "Skipped".yellow(), result.skipped());
    }

    for entry in &result.entries {
        match &entry.outcome {
            FileOutcome::Failed {
                stage,
                code,
                reason,
            } => {
                println!(
                    "  {} {} [{} at {}]: {}",
                    "✗".red().bold(),
                    entry.identifier,
                    code,
                    stage,
                    reason
                );
            }
            FileOutcome::Skipped { reason } => {
                println!("  {} {}: {}", "-".yellow(), entry.identifier, reason);
            }
            FileOutcome::Succeeded { .. } => {}
        }
    }
}
