//! Directory batch conversion with a per-file failure boundary.
//!
//! A [`BatchRunner`] walks one directory, converts every `.npy` point sample
//! through load, reconstruct, validate, repair and write, and records one
//! [`FileReport`] per eligible entry. A file that fails at any stage, or
//! whose geometry stage panics, is recorded as [`FileOutcome::Failed`] and
//! the batch moves on. Only directory problems ([`MeshError::Structural`])
//! and bad settings ([`MeshError::Configuration`]) abort a run.
//!
//! [`BatchRunner::run`] applies the same walk to a category layout,
//! `<root>/<category>/...` mirrored under the output root.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use cloudmesh::{BatchRunner, CloudmeshConfig, DirectorySelection};
//!
//! let config = CloudmeshConfig::default();
//! let runner = BatchRunner::new(config.validate()?)?;
//! let report = runner.run(
//!     &DirectorySelection::AllCategories,
//!     Path::new("output/pointcloud"),
//!     Path::new("output/raw"),
//! )?;
//! println!("{} of {} succeeded", report.succeeded(), report.total_considered());
//! # Ok::<(), cloudmesh::MeshError>(())
//! ```

use std::fmt;
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::error::{ErrorCode, MeshError, MeshResult};
use crate::io::save_mesh;
use crate::pointcloud::load_point_sample;
use crate::progress::{ProgressCallback, ProgressTracker};
use crate::repair::repair_mesh_with_config;
use crate::tracing_ext::{OperationTimer, log_mesh_stats, log_progress};
use crate::validate::validate_candidate;

/// Stage at which a file stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Load,
    /// Mesh-to-point sampling.
    Sample,
    Reconstruct,
    Validate,
    Repair,
    Write,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Load => "load",
            PipelineStage::Sample => "sample",
            PipelineStage::Reconstruct => "reconstruct",
            PipelineStage::Validate => "validate",
            PipelineStage::Repair => "repair",
            PipelineStage::Write => "write",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one eligible file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Output written. For sampling, `vertices` counts points and `faces` is 0.
    Succeeded {
        output: PathBuf,
        vertices: usize,
        faces: usize,
    },
    /// Not processed.
    Skipped { reason: String },
    /// Stopped at `stage`.
    Failed {
        stage: PipelineStage,
        code: ErrorCode,
        reason: String,
    },
}

/// Result for one eligible directory entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub input: PathBuf,
    /// File name as listed in the directory.
    pub identifier: String,
    pub outcome: FileOutcome,
}

impl FileReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FileOutcome::Succeeded { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, FileOutcome::Failed { .. })
    }
}

/// Tallies and per-file results for one directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Eligible entries found, skipped ones included.
    pub total_considered: usize,
    pub succeeded: usize,
    /// In directory enumeration order.
    pub entries: Vec<FileReport>,
    /// Whether a progress callback stopped the run early.
    pub cancelled: bool,
}

impl BatchResult {
    fn new(input_dir: &Path, output_dir: &Path, total_considered: usize) -> Self {
        Self {
            input_dir: input_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            total_considered,
            succeeded: 0,
            entries: Vec::with_capacity(total_considered),
            cancelled: false,
        }
    }

    fn push(&mut self, report: FileReport) {
        if report.is_success() {
            self.succeeded += 1;
        }
        self.entries.push(report);
    }

    /// Number of files that failed.
    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| e.is_failure()).count()
    }

    /// Number of files skipped.
    pub fn skipped(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, FileOutcome::Skipped { .. }))
            .count()
    }

    /// Failed entries, in order.
    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.entries.iter().filter(|e| e.is_failure())
    }

    /// No failures and not cancelled.
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && !self.cancelled
    }
}

/// Which directories a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectorySelection {
    /// Every configured category below the roots.
    AllCategories,
    /// One configured category.
    Category(String),
    /// The roots themselves.
    MainDirOnly,
}

/// Result for one directory of a selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CategoryOutcome {
    Processed { result: BatchResult },
    /// Category directory absent; the run continued without it.
    Missing { input_dir: PathBuf, warning: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryReport {
    /// `None` for [`DirectorySelection::MainDirOnly`].
    pub category: Option<String>,
    pub outcome: CategoryOutcome,
}

/// Results of [`BatchRunner::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionReport {
    pub categories: Vec<CategoryReport>,
}

impl SelectionReport {
    pub fn results(&self) -> impl Iterator<Item = &BatchResult> {
        self.categories.iter().filter_map(|c| match &c.outcome {
            CategoryOutcome::Processed { result } => Some(result),
            CategoryOutcome::Missing { .. } => None,
        })
    }

    pub fn total_considered(&self) -> usize {
        self.results().map(|r| r.total_considered).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.results().map(|r| r.succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.results().map(|r| r.failed()).sum()
    }

    pub fn cancelled(&self) -> bool {
        self.results().any(|r| r.cancelled)
    }

    /// Warnings for missing category directories.
    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().filter_map(|c| match &c.outcome {
            CategoryOutcome::Missing { warning, .. } => Some(warning.as_str()),
            CategoryOutcome::Processed { .. } => None,
        })
    }

    /// No failures and not cancelled. Missing categories do not count.
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && !self.cancelled()
    }
}

/// Error raised inside a stage, tagged with the stage.
#[derive(Debug)]
pub(crate) struct StageFailure {
    pub stage: PipelineStage,
    pub error: MeshError,
}

/// Counts reported for a converted file.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Converted {
    pub vertices: usize,
    pub faces: usize,
}

/// Run `f` as `stage`, turning errors and panics into a [`StageFailure`].
pub(crate) fn run_stage<T>(
    stage: PipelineStage,
    f: impl FnOnce() -> MeshResult<T>,
) -> Result<T, StageFailure> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(StageFailure { stage, error }),
        Err(payload) => {
            let details = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(StageFailure {
                stage,
                error: MeshError::stage_panicked(stage.as_str(), details),
            })
        }
    }
}

/// One kind of per-file conversion driven by the shared directory walk.
pub(crate) trait FileConverter {
    /// Name used in logs.
    fn operation(&self) -> &'static str;

    /// Whether a directory entry is an input for this converter.
    fn accepts(&self, path: &Path) -> bool;

    /// Output extension without the dot.
    fn output_extension(&self) -> &str;

    fn skip_existing(&self) -> bool;

    fn categories(&self) -> &[String];

    fn convert(&self, input: &Path, output: &Path) -> Result<Converted, StageFailure>;
}

/// Whether `path` has extension `expected`.
pub(crate) fn has_extension(path: &Path, expected: &str, case_sensitive: bool) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if case_sensitive => ext == expected,
        Some(ext) => ext.eq_ignore_ascii_case(expected),
        None => false,
    }
}

fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Walk one directory with `converter`.
pub(crate) fn convert_directory<C: FileConverter>(
    converter: &C,
    progress: Option<&ProgressCallback>,
    input_dir: &Path,
    output_dir: &Path,
) -> MeshResult<BatchResult> {
    if !input_dir.is_dir() {
        return Err(MeshError::structural(
            input_dir,
            "input directory does not exist or is not a directory",
        ));
    }

    let listing = fs::read_dir(input_dir)
        .map_err(|e| MeshError::structural(input_dir, format!("cannot list directory: {e}")))?;

    let mut inputs: Vec<PathBuf> = Vec::new();
    for entry in listing {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if converter.accepts(&path) {
                    inputs.push(path);
                }
            }
            Err(e) => warn!(dir = %input_dir.display(), "Unreadable directory entry: {}", e),
        }
    }

    fs::create_dir_all(output_dir).map_err(|e| {
        MeshError::structural(output_dir, format!("cannot create output directory: {e}"))
    })?;

    let _timer = OperationTimer::new(converter.operation());
    info!(
        operation = converter.operation(),
        input = %input_dir.display(),
        output = %output_dir.display(),
        files = inputs.len(),
        "Found {} input files",
        inputs.len()
    );

    let tracker = ProgressTracker::new(inputs.len() as u64);
    let mut result = BatchResult::new(input_dir, output_dir, inputs.len());

    for (idx, input) in inputs.iter().enumerate() {
        let identifier = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output = output_dir.join(format!("{stem}.{}", converter.output_extension()));

        log_progress(converter.operation(), idx, inputs.len(), Some(&identifier));

        let outcome = if !is_regular_file(input) {
            warn!(file = %identifier, "Skipping, not a regular file");
            FileOutcome::Skipped {
                reason: "not a regular file".to_string(),
            }
        } else if converter.skip_existing() && output.exists() {
            debug!(file = %identifier, "Skipping, output exists");
            FileOutcome::Skipped {
                reason: format!("output {} already exists", output.display()),
            }
        } else {
            match converter.convert(input, &output) {
                Ok(converted) => {
                    info!(
                        file = %identifier,
                        vertices = converted.vertices,
                        faces = converted.faces,
                        "Converted {} -> {}",
                        identifier,
                        output.display()
                    );
                    FileOutcome::Succeeded {
                        output,
                        vertices: converted.vertices,
                        faces: converted.faces,
                    }
                }
                Err(StageFailure { stage, error }) => {
                    error!(
                        file = %identifier,
                        stage = %stage,
                        code = %error.code(),
                        "Failed to convert {}: {}",
                        identifier,
                        error.full_message()
                    );
                    FileOutcome::Failed {
                        stage,
                        code: error.code(),
                        reason: error.full_message(),
                    }
                }
            }
        };

        result.push(FileReport {
            input: input.clone(),
            identifier: identifier.clone(),
            outcome,
        });

        tracker.increment();
        if !tracker.maybe_callback(progress, identifier) {
            warn!(
                remaining = inputs.len() - idx - 1,
                "Run cancelled by progress callback"
            );
            result.cancelled = true;
            break;
        }
    }

    info!(
        operation = converter.operation(),
        found = result.total_considered,
        succeeded = result.succeeded,
        failed = result.failed(),
        "Processed {} of {} files successfully",
        result.succeeded,
        result.total_considered
    );

    Ok(result)
}

/// Apply `converter` to the directories named by `selection`.
pub(crate) fn convert_selection<C: FileConverter>(
    converter: &C,
    progress: Option<&ProgressCallback>,
    selection: &DirectorySelection,
    input_root: &Path,
    output_root: &Path,
) -> MeshResult<SelectionReport> {
    let mut report = SelectionReport {
        categories: Vec::new(),
    };

    match selection {
        DirectorySelection::MainDirOnly => {
            let result = convert_directory(converter, progress, input_root, output_root)?;
            report.categories.push(CategoryReport {
                category: None,
                outcome: CategoryOutcome::Processed { result },
            });
        }
        DirectorySelection::Category(name) => {
            if !converter.categories().iter().any(|c| c == name) {
                return Err(MeshError::configuration(format!(
                    "unknown category '{}', expected one of: {}",
                    name,
                    converter.categories().join(", ")
                )));
            }
            let input_dir = input_root.join(name);
            if !input_dir.is_dir() {
                return Err(MeshError::structural(
                    &input_dir,
                    format!("category directory '{name}' does not exist"),
                ));
            }
            let result =
                convert_directory(converter, progress, &input_dir, &output_root.join(name))?;
            report.categories.push(CategoryReport {
                category: Some(name.clone()),
                outcome: CategoryOutcome::Processed { result },
            });
        }
        DirectorySelection::AllCategories => {
            for name in converter.categories() {
                let input_dir = input_root.join(name);
                if !input_dir.is_dir() {
                    let warning = format!(
                        "category directory {} does not exist, skipping",
                        input_dir.display()
                    );
                    warn!("{}", warning);
                    report.categories.push(CategoryReport {
                        category: Some(name.clone()),
                        outcome: CategoryOutcome::Missing { input_dir, warning },
                    });
                    continue;
                }

                let result =
                    convert_directory(converter, progress, &input_dir, &output_root.join(name))?;
                let cancelled = result.cancelled;
                report.categories.push(CategoryReport {
                    category: Some(name.clone()),
                    outcome: CategoryOutcome::Processed { result },
                });
                if cancelled {
                    break;
                }
            }
        }
    }

    Ok(report)
}

/// Point-sample to mesh batch converter.
pub struct BatchRunner {
    config: RunnerConfig,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRunner")
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl BatchRunner {
    /// Create a runner, rejecting invalid settings.
    pub fn new(config: RunnerConfig) -> MeshResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            progress: None,
        })
    }

    /// Report after each file; returning `false` stops the run.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Convert every eligible file in `input_dir` into `output_dir`.
    ///
    /// Fails only when `input_dir` cannot be listed or `output_dir` cannot
    /// be created; per-file problems are recorded in the result.
    pub fn run_directory(&self, input_dir: &Path, output_dir: &Path) -> MeshResult<BatchResult> {
        convert_directory(self, self.progress.as_ref(), input_dir, output_dir)
    }

    /// Convert the directories named by `selection`.
    pub fn run(
        &self,
        selection: &DirectorySelection,
        input_root: &Path,
        output_root: &Path,
    ) -> MeshResult<SelectionReport> {
        convert_selection(
            self,
            self.progress.as_ref(),
            selection,
            input_root,
            output_root,
        )
    }
}

impl FileConverter for BatchRunner {
    fn operation(&self) -> &'static str {
        "reconstruct"
    }

    fn accepts(&self, path: &Path) -> bool {
        has_extension(
            path,
            &self.config.input_extension,
            self.config.case_sensitive_extensions,
        )
    }

    fn output_extension(&self) -> &str {
        &self.config.output_extension
    }

    fn skip_existing(&self) -> bool {
        self.config.skip_existing
    }

    fn categories(&self) -> &[String] {
        &self.config.categories
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<Converted, StageFailure> {
        let cloud = run_stage(PipelineStage::Load, || load_point_sample(input))?;
        debug!(points = cloud.len(), normals = cloud.has_normals(), "Point sample loaded");

        let result = run_stage(PipelineStage::Reconstruct, || {
            self.config.strategy.reconstruct(&cloud)
        })?;
        let mut mesh = result.mesh;

        run_stage(PipelineStage::Validate, || validate_candidate(&mesh))?;

        let stats = run_stage(PipelineStage::Repair, || {
            Ok(repair_mesh_with_config(&mut mesh, &self.config.repair))
        })?;
        debug!(?stats, "Repair stats");
        log_mesh_stats(&mesh, "repaired");

        run_stage(PipelineStage::Write, || save_mesh(&mesh, output))?;

        Ok(Converted {
            vertices: mesh.vertex_count(),
            faces: mesh.face_count(),
        })
    }
}
