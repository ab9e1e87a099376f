//! cloudmesh reconstruct command - point samples to meshes.

use std::path::PathBuf;

use anyhow::Result;
use cloudmesh::{BatchRunner, DirectorySelection, ReconstructionMethod};

use crate::commands::finish_selection;
use crate::{Cli, output};

/// Command-line values that replace configuration file values.
pub struct Overrides {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub method: Option<ReconstructionMethod>,
    pub radius: Option<f64>,
    pub output_ext: Option<String>,
    pub skip_existing: bool,
}

pub fn run(overrides: Overrides, selection: &DirectorySelection, cli: &Cli) -> Result<()> {
    let mut config = cli.load_config()?;

    if let Some(method) = overrides.method {
        config.reconstruction.method = method.as_str().to_string();
    }
    if let Some(radius) = overrides.radius {
        config.reconstruction.radius = radius;
    }
    if let Some(ext) = overrides.output_ext {
        config.batch.output_extension = ext;
    }
    if let Some(dir) = overrides.input_dir {
        config.batch.input_root = dir;
    }
    if let Some(dir) = overrides.output_dir {
        config.batch.output_root = dir;
    }
    config.batch.skip_existing |= overrides.skip_existing;

    let runner = BatchRunner::new(config.validate()?)?;

    output::info(
        &format!(
            "Reconstructing {} -> {} with {}",
            config.batch.input_root.display(),
            config.batch.output_root.display(),
            runner.config().strategy.method()
        ),
        cli.format,
        cli.quiet,
    );

    let report = runner.run(selection, &config.batch.input_root, &config.batch.output_root)?;
    finish_selection(&report, "Reconstructed", cli)
}
