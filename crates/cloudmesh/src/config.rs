//! Run configuration.
//!
//! [`CloudmeshConfig`] is the raw, serde-deserializable form, loaded from
//! TOML with every field defaulted. [`CloudmeshConfig::validate`] turns it
//! into the typed [`RunnerConfig`] a [`BatchRunner`](crate::BatchRunner)
//! consumes; invalid values surface there as
//! [`MeshError::Configuration`] before any file is touched.
//!
//! # Example TOML
//!
//! ```toml
//! [reconstruction]
//! method = "ball_pivoting"
//! radius = 0.05
//!
//! [batch]
//! input_root = "output/pointcloud"
//! output_root = "output/raw"
//! categories = ["feet", "insoles"]
//! skip_existing = true
//!
//! [repair]
//! weld_epsilon = 1e-6
//!
//! [sample]
//! count = 4000
//! seed = 7
//! ```

use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MeshError, MeshResult};
use crate::io::MeshFormat;
use crate::reconstruct::{
    AlphaShapeParams, BallPivotingParams, PoissonParams, ReconstructionMethod, Strategy,
};
use crate::repair::RepairParams;

/// Default category subdirectories.
pub const DEFAULT_CATEGORIES: [&str; 2] = ["feet", "insoles"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CloudmeshConfig {
    pub reconstruction: ReconstructionConfig,
    pub batch: BatchConfig,
    pub repair: RepairParams,
    pub sample: SampleConfig,
}

/// Reconstruction parameters, chosen once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconstructionConfig {
    /// `ball_pivoting`, `alpha_shape` or `poisson`.
    #[serde(alias = "reconstruction_strategy")]
    pub method: String,
    /// Ball radius for ball pivoting, alpha for alpha shapes.
    pub radius: f64,
    pub poisson_depth: u32,
    pub poisson_scale: f64,
    /// Neighbours used when normals have to be estimated.
    pub normal_neighbors: usize,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            method: ReconstructionMethod::Poisson.as_str().to_string(),
            radius: 0.1,
            poisson_depth: 9,
            poisson_scale: 1.1,
            normal_neighbors: 16,
        }
    }
}

impl ReconstructionConfig {
    /// Validate and build the strategy.
    pub fn to_strategy(&self) -> MeshResult<Strategy> {
        let method = ReconstructionMethod::from_str(&self.method)?;

        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(MeshError::configuration(format!(
                "radius must be a positive number, got {}",
                self.radius
            )));
        }
        if self.poisson_depth == 0 {
            return Err(MeshError::configuration("poisson_depth must be at least 1"));
        }
        if !(self.poisson_scale.is_finite() && self.poisson_scale > 0.0) {
            return Err(MeshError::configuration(format!(
                "poisson_scale must be a positive number, got {}",
                self.poisson_scale
            )));
        }
        if self.normal_neighbors < 3 {
            return Err(MeshError::configuration(format!(
                "normal_neighbors must be at least 3, got {}",
                self.normal_neighbors
            )));
        }

        Ok(match method {
            ReconstructionMethod::BallPivoting => Strategy::BallPivoting(BallPivotingParams {
                radius: self.radius,
                normal_neighbors: self.normal_neighbors,
            }),
            ReconstructionMethod::AlphaShape => {
                Strategy::AlphaShape(AlphaShapeParams::new(self.radius))
            }
            ReconstructionMethod::Poisson => Strategy::Poisson(PoissonParams {
                depth: self.poisson_depth,
                scale: self.poisson_scale,
                normal_neighbors: self.normal_neighbors,
            }),
        })
    }
}

/// Directory layout and file selection for the reconstruction batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub categories: Vec<String>,
    pub input_extension: String,
    pub output_extension: String,
    /// Leave inputs alone when their output already exists.
    pub skip_existing: bool,
    /// Match the input extension exactly instead of ignoring case.
    pub case_sensitive_extensions: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("output/pointcloud"),
            output_root: PathBuf::from("output/raw"),
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            input_extension: "npy".to_string(),
            output_extension: "stl".to_string(),
            skip_existing: false,
            case_sensitive_extensions: false,
        }
    }
}

/// Mesh-to-point-sample conversion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SampleConfig {
    pub mesh_root: PathBuf,
    pub cloud_root: PathBuf,
    /// Points drawn per mesh.
    pub count: usize,
    /// RNG seed; unset draws from entropy.
    pub seed: Option<u64>,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            mesh_root: PathBuf::from("data/raw"),
            cloud_root: PathBuf::from("data/pointcloud"),
            count: 2000,
            seed: None,
        }
    }
}

/// Validated settings for a [`BatchRunner`](crate::BatchRunner).
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub strategy: Strategy,
    pub repair: RepairParams,
    /// Input extension without the dot.
    pub input_extension: String,
    /// Output extension without the dot; selects the mesh format.
    pub output_extension: String,
    pub categories: Vec<String>,
    pub skip_existing: bool,
    pub case_sensitive_extensions: bool,
}

impl RunnerConfig {
    /// Runner settings with defaults around the given strategy.
    pub fn new(strategy: Strategy) -> Self {
        let batch = BatchConfig::default();
        Self {
            strategy,
            repair: RepairParams::default(),
            input_extension: batch.input_extension,
            output_extension: batch.output_extension,
            categories: batch.categories,
            skip_existing: batch.skip_existing,
            case_sensitive_extensions: batch.case_sensitive_extensions,
        }
    }

    /// Check the settings that can be wrong after construction.
    pub fn validate(&self) -> MeshResult<()> {
        if self.input_extension.is_empty() {
            return Err(MeshError::configuration("input_extension must not be empty"));
        }
        if MeshFormat::from_extension(&self.output_extension).is_none() {
            return Err(MeshError::configuration(format!(
                "output_extension '{}' is not a supported mesh format (stl, obj, ply)",
                self.output_extension
            )));
        }
        for category in &self.categories {
            validate_category_name(category)?;
        }
        validate_repair(&self.repair)
    }
}

/// Validated settings for a [`SampleRunner`](crate::SampleRunner).
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    pub count: usize,
    pub seed: Option<u64>,
    pub categories: Vec<String>,
    pub skip_existing: bool,
}

impl SamplerConfig {
    /// Check the settings that can be wrong after construction.
    pub fn validate(&self) -> MeshResult<()> {
        if self.count == 0 {
            return Err(MeshError::configuration("sample count must be at least 1"));
        }
        for category in &self.categories {
            validate_category_name(category)?;
        }
        Ok(())
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            count: SampleConfig::default().count,
            seed: None,
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            skip_existing: false,
        }
    }
}

impl CloudmeshConfig {
    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> MeshResult<Self> {
        toml::from_str(toml_str)
            .map_err(|e| MeshError::configuration(format!("cannot parse TOML: {e}")))
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> MeshResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MeshError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> MeshResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| MeshError::configuration(format!("cannot serialize configuration: {e}")))
    }

    /// Validate into reconstruction runner settings.
    pub fn validate(&self) -> MeshResult<RunnerConfig> {
        let runner = RunnerConfig {
            strategy: self.reconstruction.to_strategy()?,
            repair: self.repair.clone(),
            input_extension: normalize_extension(&self.batch.input_extension),
            output_extension: normalize_extension(&self.batch.output_extension),
            categories: self.batch.categories.clone(),
            skip_existing: self.batch.skip_existing,
            case_sensitive_extensions: self.batch.case_sensitive_extensions,
        };
        runner.validate()?;
        Ok(runner)
    }

    /// Validate into sampling runner settings.
    pub fn sampler(&self) -> MeshResult<SamplerConfig> {
        let sampler = SamplerConfig {
            count: self.sample.count,
            seed: self.sample.seed,
            categories: self.batch.categories.clone(),
            skip_existing: self.batch.skip_existing,
        };
        sampler.validate()?;
        Ok(sampler)
    }
}

/// Strip a leading dot so `".npy"` and `"npy"` mean the same.
fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_string()
}

/// A category must name exactly one directory below the root.
fn validate_category_name(name: &str) -> MeshResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(MeshError::configuration(format!(
            "category '{name}' must be a single directory name"
        ))),
    }
}

fn validate_repair(params: &RepairParams) -> MeshResult<()> {
    if !(params.weld_epsilon.is_finite() && params.weld_epsilon >= 0.0) {
        return Err(MeshError::configuration(format!(
            "weld_epsilon must be a non-negative number, got {}",
            params.weld_epsilon
        )));
    }
    if !(params.degenerate_area_threshold.is_finite() && params.degenerate_area_threshold > 0.0) {
        return Err(MeshError::configuration(format!(
            "degenerate_area_threshold must be a positive number, got {}",
            params.degenerate_area_threshold
        )));
    }
    Ok(())
}
