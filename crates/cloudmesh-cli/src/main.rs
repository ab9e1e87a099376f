//! cloudmesh: command-line batch conversion between point samples and meshes.
//!
//! The main command, `reconstruct`, turns every `.npy` point sample under
//! a category layout into a repaired triangle mesh. `generate`, `sample`
//! and `audit` build and check test data; `info` inspects a single mesh.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=cloudmesh=info` - Per-file progress
//! - `RUST_LOG=cloudmesh=debug` - Stage-level detail
//! - `RUST_LOG=cloudmesh::timing=debug` - Performance timing
//!
//! # Exit Status
//!
//! - `0` every considered file succeeded
//! - `1` one or more files failed, or the run was cancelled
//! - `2` the run was refused: bad configuration or missing directories
//!
//! # Example
//!
//! ```bash
//! # Reconstruct every category with ball pivoting
//! cloudmesh reconstruct --method ball_pivoting --radius 0.05
//!
//! # Only the insoles, JSON report
//! cloudmesh --format json reconstruct --subdir insoles
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use cloudmesh::{CloudmeshConfig, DirectorySelection, MeshError, ReconstructionMethod};
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{audit, generate, info, reconstruct, sample};

/// cloudmesh - Point sample to triangle mesh batch conversion.
#[derive(Parser)]
#[command(name = "cloudmesh")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file; command-line flags override its values
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

/// Which directories under the roots to process.
#[derive(Args, Clone)]
pub struct SelectionArgs {
    /// Process only this category subdirectory
    #[arg(long, conflicts_with = "main_dir_only")]
    subdir: Option<String>,

    /// Process the root directories themselves instead of categories
    #[arg(long)]
    main_dir_only: bool,
}

impl SelectionArgs {
    pub fn selection(&self) -> DirectorySelection {
        match (&self.subdir, self.main_dir_only) {
            (Some(name), _) => DirectorySelection::Category(name.clone()),
            (None, true) => DirectorySelection::MainDirOnly,
            (None, false) => DirectorySelection::AllCategories,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct meshes from .npy point samples
    Reconstruct {
        /// Root directory of point samples [default: output/pointcloud]
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Root directory for meshes [default: output/raw]
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Reconstruction method [default: poisson]
        #[arg(long)]
        method: Option<ReconstructionMethod>,

        /// Ball radius or alpha value [default: 0.1]
        #[arg(long)]
        radius: Option<f64>,

        /// Output mesh extension: stl, obj or ply [default: stl]
        #[arg(long)]
        output_ext: Option<String>,

        /// Leave files whose output already exists untouched
        #[arg(long)]
        skip_existing: bool,

        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Sample meshes into .npy point samples
    Sample {
        /// Root directory of meshes [default: data/raw]
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// Root directory for point samples [default: data/pointcloud]
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Points drawn per mesh [default: 2000]
        #[arg(long)]
        count: Option<usize>,

        /// Seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Leave files whose output already exists untouched
        #[arg(long)]
        skip_existing: bool,

        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Generate random closed shapes as STL files
    Generate {
        /// Number of shapes to generate
        #[arg(long, default_value = "10")]
        num_shapes: usize,

        /// Output directory
        #[arg(long, default_value = "data/raw")]
        output_dir: PathBuf,

        /// Generate into each category subdirectory instead
        #[arg(long)]
        subdirs: bool,

        /// Shapes per category subdirectory
        #[arg(long, default_value = "3")]
        num_per_subdir: usize,

        /// Seed for reproducible shapes
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Check which meshes have a matching point sample
    Audit {
        /// Root directory of meshes [default: data/raw]
        #[arg(long)]
        mesh_dir: Option<PathBuf>,

        /// Root directory of point samples [default: data/pointcloud]
        #[arg(long)]
        cloud_dir: Option<PathBuf>,
    },

    /// Display mesh statistics and information
    Info {
        /// Input mesh file
        input: PathBuf,

        /// Show surface area and volume
        #[arg(long)]
        detailed: bool,
    },
}

impl Cli {
    /// Configuration from `--config`, or defaults.
    pub fn load_config(&self) -> Result<CloudmeshConfig> {
        match &self.config {
            Some(path) => {
                let config = CloudmeshConfig::from_toml_file(path)
                    .with_context(|| format!("Failed to load configuration from {:?}", path))?;
                debug!(path = %path.display(), "Loaded configuration");
                Ok(config)
            }
            None => Ok(CloudmeshConfig::default()),
        }
    }
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "cloudmesh=info",
            2 => "cloudmesh=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

/// Exit status for a failed command.
fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<MeshError>() {
        Some(mesh_err) if mesh_err.is_batch_fatal() => 2,
        _ => 1,
    }
}

fn dispatch(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Reconstruct {
            input_dir,
            output_dir,
            method,
            radius,
            output_ext,
            skip_existing,
            selection,
        } => reconstruct::run(
            reconstruct::Overrides {
                input_dir: input_dir.clone(),
                output_dir: output_dir.clone(),
                method: *method,
                radius: *radius,
                output_ext: output_ext.clone(),
                skip_existing: *skip_existing,
            },
            &selection.selection(),
            cli,
        ),
        Commands::Sample {
            input_dir,
            output_dir,
            count,
            seed,
            skip_existing,
            selection,
        } => sample::run(
            sample::Overrides {
                input_dir: input_dir.clone(),
                output_dir: output_dir.clone(),
                count: *count,
                seed: *seed,
                skip_existing: *skip_existing,
            },
            &selection.selection(),
            cli,
        ),
        Commands::Generate {
            num_shapes,
            output_dir,
            subdirs,
            num_per_subdir,
            seed,
        } => generate::run(
            *num_shapes,
            output_dir,
            *subdirs,
            *num_per_subdir,
            *seed,
            cli,
        ),
        Commands::Audit { mesh_dir, cloud_dir } => {
            audit::run(mesh_dir.as_deref(), cloud_dir.as_deref(), cli)
        }
        Commands::Info { input, detailed } => info::run(input, *detailed, cli),
    }
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let result = dispatch(&cli);

    if let Err(e) = &result {
        if !cli.quiet {
            if let Some(mesh_err) = e.downcast_ref::<MeshError>() {
                eprintln!("{}: {}", "Error".red().bold(), mesh_err);
                eprintln!("  {}: {}", "Code".cyan(), mesh_err.code());
                eprintln!(
                    "  {}: {}",
                    "Suggestion".green(),
                    mesh_err.recovery_suggestion()
                );
                if let Some(location) = mesh_err.location() {
                    eprintln!("  {}: {}", "Location".yellow(), location);
                }
            } else {
                eprintln!("{}: {}", "Error".red().bold(), e);
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            }
        }
        std::process::exit(exit_code(e));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_selection_flags() {
        let cli = Cli::parse_from(["cloudmesh", "reconstruct", "--subdir", "feet"]);
        let Commands::Reconstruct { selection, .. } = cli.command else {
            panic!("expected reconstruct");
        };
        assert_eq!(
            selection.selection(),
            DirectorySelection::Category("feet".to_string())
        );

        let cli = Cli::parse_from(["cloudmesh", "sample", "--main-dir-only"]);
        let Commands::Sample { selection, .. } = cli.command else {
            panic!("expected sample");
        };
        assert_eq!(selection.selection(), DirectorySelection::MainDirOnly);
    }

    #[test]
    fn test_conflicting_selection_rejected() {
        let parsed = Cli::try_parse_from([
            "cloudmesh",
            "reconstruct",
            "--subdir",
            "feet",
            "--main-dir-only",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_method_parses_config_names() {
        let cli = Cli::parse_from(["cloudmesh", "reconstruct", "--method", "alpha_shape"]);
        let Commands::Reconstruct { method, .. } = cli.command else {
            panic!("expected reconstruct");
        };
        assert_eq!(method, Some(ReconstructionMethod::AlphaShape));
    }

    #[test]
    fn test_exit_codes() {
        let fatal = anyhow::Error::new(MeshError::configuration("bad radius"));
        assert_eq!(exit_code(&fatal), 2);

        let partial = anyhow::anyhow!("2 of 5 files failed");
        assert_eq!(exit_code(&partial), 1);

        let wrapped = anyhow::Error::new(MeshError::structural("missing", "does not exist"))
            .context("Batch run refused");
        assert_eq!(exit_code(&wrapped), 2);
    }

    #[test]
    fn test_generate_then_sample() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw");
        let clouds = dir.path().join("pointcloud");
        let raw_arg = raw.to_str().unwrap();
        let clouds_arg = clouds.to_str().unwrap();

        let generate = Cli::parse_from([
            "cloudmesh",
            "-q",
            "generate",
            "--num-shapes",
            "3",
            "--output-dir",
            raw_arg,
            "--seed",
            "7",
        ]);
        dispatch(&generate).unwrap();

        let sample = Cli::parse_from([
            "cloudmesh",
            "-q",
            "sample",
            "--input-dir",
            raw_arg,
            "--output-dir",
            clouds_arg,
            "--count",
            "300",
            "--seed",
            "1",
            "--main-dir-only",
        ]);
        dispatch(&sample).unwrap();

        let written = std::fs::read_dir(&clouds)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "npy"))
            .count();
        assert_eq!(written, 3);
    }

    #[test]
    fn test_missing_input_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nowhere");
        let out = dir.path().join("out");
        let cli = Cli::parse_from([
            "cloudmesh",
            "-q",
            "reconstruct",
            "--input-dir",
            missing.to_str().unwrap(),
            "--output-dir",
            out.to_str().unwrap(),
            "--main-dir-only",
        ]);
        let err = dispatch(&cli).unwrap_err();
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn test_missing_config_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("absent.toml");
        let cli = Cli::parse_from([
            "cloudmesh",
            "-q",
            "--config",
            config.to_str().unwrap(),
            "audit",
        ]);
        let err = dispatch(&cli).unwrap_err();
        assert_eq!(exit_code(&err), 2);
    }
}
