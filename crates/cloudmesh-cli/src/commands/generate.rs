//! cloudmesh generate command - random test shapes.

use std::path::Path;

use anyhow::{Result, bail};
use cloudmesh::{GeneratedFile, generate_for_categories, generate_shapes};
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct GenerateResult<'a> {
    requested: usize,
    written: usize,
    files: &'a [GeneratedFile],
}

pub fn run(
    num_shapes: usize,
    output_dir: &Path,
    subdirs: bool,
    num_per_subdir: usize,
    seed: Option<u64>,
    cli: &Cli,
) -> Result<()> {
    let files = if subdirs {
        let config = cli.load_config()?;
        generate_for_categories(output_dir, &config.batch.categories, num_per_subdir, seed)?
    } else {
        generate_shapes(output_dir, num_shapes, seed)?
    };

    let written = files.iter().filter(|f| f.written).count();
    let result = GenerateResult {
        requested: files.len(),
        written,
        files: &files,
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            for file in &files {
                let name = file.path.display();
                if file.written {
                    output::success(&format!("{} ({})", name, file.kind), cli.format, cli.quiet);
                } else {
                    output::warning(&format!("failed to write {}", name), cli.quiet);
                }
            }
        }
    }

    if written < files.len() {
        bail!("{} of {} shapes could not be written", files.len() - written, files.len());
    }

    output::info(
        &format!("Generated {} STL files under {}", written, output_dir.display()),
        cli.format,
        cli.quiet,
    );
    Ok(())
}
