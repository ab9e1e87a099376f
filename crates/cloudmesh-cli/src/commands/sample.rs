//! cloudmesh sample command - meshes to point samples.

use std::path::PathBuf;

use anyhow::Result;
use cloudmesh::{DirectorySelection, SampleRunner};

use crate::commands::finish_selection;
use crate::{Cli, output};

/// Command-line values that replace configuration file values.
pub struct Overrides {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub count: Option<usize>,
    pub seed: Option<u64>,
    pub skip_existing: bool,
}

pub fn run(overrides: Overrides, selection: &DirectorySelection, cli: &Cli) -> Result<()> {
    let mut config = cli.load_config()?;

    if let Some(count) = overrides.count {
        config.sample.count = count;
    }
    if overrides.seed.is_some() {
        config.sample.seed = overrides.seed;
    }
    if let Some(dir) = overrides.input_dir {
        config.sample.mesh_root = dir;
    }
    if let Some(dir) = overrides.output_dir {
        config.sample.cloud_root = dir;
    }
    config.batch.skip_existing |= overrides.skip_existing;

    let runner = SampleRunner::new(config.sampler()?)?;

    output::info(
        &format!(
            "Sampling {} points per mesh from {} -> {}",
            runner.config().count,
            config.sample.mesh_root.display(),
            config.sample.cloud_root.display()
        ),
        cli.format,
        cli.quiet,
    );

    let report = runner.run(selection, &config.sample.mesh_root, &config.sample.cloud_root)?;
    finish_selection(&report, "Sampled", cli)
}
