//! cloudmesh audit command - mesh to point sample correspondence.

use std::path::Path;

use anyhow::Result;
use cloudmesh::audit::audit;
use colored::Colorize;

use crate::{Cli, OutputFormat, output};

/// Stems listed per directory before eliding the rest.
const LISTED_STEMS: usize = 5;

fn list_stems(stems: &[String]) {
    for stem in stems.iter().take(LISTED_STEMS) {
        println!("      - {}", stem);
    }
    if stems.len() > LISTED_STEMS {
        println!("      ... and {} more", stems.len() - LISTED_STEMS);
    }
}

pub fn run(mesh_dir: Option<&Path>, cloud_dir: Option<&Path>, cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;
    let mesh_root = mesh_dir.unwrap_or(config.sample.mesh_root.as_path());
    let cloud_root = cloud_dir.unwrap_or(config.sample.cloud_root.as_path());

    let report = audit(mesh_root, cloud_root, &config.batch.categories);

    match cli.format {
        OutputFormat::Json => output::print(&report, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                for category in &report.categories {
                    println!("{}", category.category.bold().underline());

                    if category.mesh_dir_exists {
                        println!(
                            "  {} {}: {} meshes",
                            "✓".green(),
                            category.mesh_dir.display(),
                            category.mesh_stems.len()
                        );
                        list_stems(&category.mesh_stems);
                    } else {
                        println!("  {} {}: missing", "✗".red(), category.mesh_dir.display());
                    }

                    if category.cloud_dir_exists {
                        println!(
                            "  {} {}: {} point samples",
                            "✓".green(),
                            category.cloud_dir.display(),
                            category.cloud_stems.len()
                        );
                        list_stems(&category.cloud_stems);
                    } else {
                        println!("  {} {}: missing", "✗".red(), category.cloud_dir.display());
                    }

                    println!(
                        "  {}: {} of {}",
                        "Converted".cyan(),
                        category.converted.len(),
                        category.mesh_stems.len()
                    );
                    if !category.missing.is_empty() {
                        println!("    {}:", "Not yet sampled".yellow());
                        list_stems(&category.missing);
                    }
                }
            }
        }
    }

    if report.is_complete() {
        output::success("Every mesh has a point sample", cli.format, cli.quiet);
    } else {
        output::warning(
            &format!("{} meshes have no point sample", report.missing_count()),
            cli.quiet,
        );
    }

    Ok(())
}
