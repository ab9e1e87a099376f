//! Point sample to triangle mesh reconstruction.
//!
//! This crate turns `.npy` point samples (N x 3 positions, or N x 6 with
//! normals) into validated, repaired triangle meshes, one file at a time or
//! a whole directory tree at once.
//!
//! # Pipeline
//!
//! Every file goes through the same stages:
//!
//! 1. **Load**: [`load_point_sample`] decodes the `.npy` array.
//! 2. **Reconstruct**: a [`Strategy`] (ball pivoting, alpha shape or
//!    Poisson) builds a candidate mesh.
//! 3. **Validate**: [`validate_candidate`] rejects empty or malformed
//!    candidates.
//! 4. **Repair**: [`repair_mesh_with_config`] welds, deduplicates and
//!    cleans up, then computes vertex normals.
//! 5. **Write**: [`save_mesh`] picks STL, OBJ or PLY from the extension.
//!
//! [`BatchRunner`] drives these stages over a directory, recording a
//! [`FileReport`] per file. One bad file never stops the batch.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use cloudmesh::{BallPivotingParams, Strategy, load_point_sample, repair_mesh, save_mesh};
//!
//! let cloud = load_point_sample(Path::new("foot.npy"))?;
//! let strategy = Strategy::BallPivoting(BallPivotingParams::new(0.1));
//! let mut mesh = strategy.reconstruct(&cloud)?.mesh;
//! cloudmesh::validate_candidate(&mesh)?;
//! repair_mesh(&mut mesh);
//! save_mesh(&mesh, Path::new("foot.stl"))?;
//! # Ok::<(), cloudmesh::MeshError>(())
//! ```
//!
//! # Directory Layout
//!
//! Batch runs mirror a category layout:
//!
//! ```text
//! output/pointcloud/feet/*.npy     ->  output/raw/feet/*.stl
//! output/pointcloud/insoles/*.npy  ->  output/raw/insoles/*.stl
//! ```
//!
//! [`DirectorySelection`] picks every category, one category, or the roots
//! themselves.
//!
//! # Supporting Tools
//!
//! - [`generate`] writes random closed shapes for test data.
//! - [`SampleRunner`] samples meshes back into `.npy` point samples.
//! - [`audit`] reports which meshes have no point sample yet.
//!
//! # Supported Formats
//!
//! | Format | Extension | Load | Save | Notes |
//! |--------|-----------|------|------|-------|
//! | NPY    | `.npy`    | ✓    | ✓    | Any numeric dtype on load, `<f8` on save |
//! | STL    | `.stl`    | ✓    | ✓    | Binary on save, per-facet normals |
//! | OBJ    | `.obj`    | ✓    | ✓    | ASCII, vertex normals when present |
//! | PLY    | `.ply`    | ✓    | ✓    | ASCII on save, vertex normals when present |

mod error;
mod types;

pub mod audit;
pub mod batch;
pub mod config;
pub mod generate;
pub mod io;
pub mod npy;
pub mod pointcloud;
pub mod progress;
pub mod reconstruct;
pub mod repair;
pub mod sample;
pub mod tracing_ext;
pub mod validate;

pub use error::{ErrorCode, ErrorLocation, MeshError, MeshResult, RecoverySuggestion};
pub use types::{Mesh, Triangle, Vertex};

pub use audit::{AuditReport, CategoryAudit, audit_category};
pub use batch::{
    BatchResult, BatchRunner, CategoryOutcome, CategoryReport, DirectorySelection, FileOutcome,
    FileReport, PipelineStage, SelectionReport,
};
pub use config::{
    BatchConfig, CloudmeshConfig, DEFAULT_CATEGORIES, ReconstructionConfig, RunnerConfig,
    SampleConfig, SamplerConfig,
};
pub use generate::{GeneratedFile, ShapeKind, generate_for_categories, generate_shapes};
pub use io::{MeshFormat, load_mesh, save_mesh, save_obj, save_ply, save_stl, write_mesh};
pub use pointcloud::{CloudPoint, PointCloud, load_point_sample, save_point_sample};
pub use progress::{Progress, ProgressCallback};
pub use reconstruct::{
    AlphaShapeParams, BallPivotingParams, PoissonParams, ReconstructionMethod,
    ReconstructionResult, Strategy, StrategyDetails,
};
pub use repair::{
    RepairParams, RepairStats, compute_vertex_normals, remove_degenerate_triangles,
    remove_duplicate_faces, remove_unreferenced_vertices, repair_mesh, repair_mesh_with_config,
    weld_vertices,
};
pub use sample::{SampleRunner, sample_mesh};
pub use validate::{MeshReport, validate_candidate, validate_mesh};
