//! Surface reconstruction from point clouds.
//!
//! Three strategies turn an unordered point set into a candidate triangle
//! mesh:
//!
//! | Strategy | Needs normals | Tuned by |
//! |----------|---------------|----------|
//! | Ball pivoting | yes (estimated if absent) | ball radius, tried at r, 2r, 4r |
//! | Alpha shape | no | alpha (the same radius) |
//! | Poisson | yes (estimated if absent) | grid depth, bounding-cube scale |
//!
//! The set is closed, so dispatch is a plain `match` over [`Strategy`].
//! Every strategy treats its input cloud as read-only and returns an empty
//! mesh, rather than an error, when the cloud has fewer than three points.
//! Rejecting empty candidates is the validator's job.
//!
//! # Example
//!
//! ```
//! use cloudmesh::{PointCloud, Strategy, BallPivotingParams};
//! use nalgebra::{Point3, Vector3};
//!
//! let mut cloud = PointCloud::new();
//! for p in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.4, 0.9, 0.0]] {
//!     cloud.push(cloudmesh::CloudPoint::with_normal(Point3::from(p), Vector3::z()));
//! }
//!
//! let strategy = Strategy::BallPivoting(BallPivotingParams::new(1.0));
//! let result = strategy.reconstruct(&cloud).unwrap();
//! assert_eq!(result.face_count, 1);
//! ```

pub mod alpha_shape;
pub mod ball_pivoting;
pub mod poisson;

mod ball;

pub use alpha_shape::AlphaShapeParams;
pub use ball_pivoting::BallPivotingParams;
pub use poisson::PoissonParams;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MeshError, MeshResult};
use crate::pointcloud::PointCloud;
use crate::tracing_ext::OperationTimer;
use crate::types::{Mesh, Vertex};

/// Name of a reconstruction strategy, as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionMethod {
    BallPivoting,
    AlphaShape,
    Poisson,
}

impl ReconstructionMethod {
    /// All methods, in documentation order.
    pub const ALL: [ReconstructionMethod; 3] = [
        ReconstructionMethod::BallPivoting,
        ReconstructionMethod::AlphaShape,
        ReconstructionMethod::Poisson,
    ];

    /// The configuration name of this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconstructionMethod::BallPivoting => "ball_pivoting",
            ReconstructionMethod::AlphaShape => "alpha_shape",
            ReconstructionMethod::Poisson => "poisson",
        }
    }
}

impl fmt::Display for ReconstructionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReconstructionMethod {
    type Err = MeshError;

    /// Exact, case-sensitive match. Unknown names are a configuration error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                MeshError::configuration(format!(
                    "unknown reconstruction method '{}' (expected ball_pivoting, alpha_shape or poisson)",
                    s
                ))
            })
    }
}

/// A fully parameterized reconstruction strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    BallPivoting(BallPivotingParams),
    AlphaShape(AlphaShapeParams),
    Poisson(PoissonParams),
}

impl Strategy {
    /// Which method this strategy runs.
    pub fn method(&self) -> ReconstructionMethod {
        match self {
            Strategy::BallPivoting(_) => ReconstructionMethod::BallPivoting,
            Strategy::AlphaShape(_) => ReconstructionMethod::AlphaShape,
            Strategy::Poisson(_) => ReconstructionMethod::Poisson,
        }
    }

    /// Reconstruct a candidate mesh from `cloud`.
    ///
    /// Clouds with fewer than three points yield an empty mesh. Clouds with
    /// NaN or infinite coordinates are rejected.
    pub fn reconstruct(&self, cloud: &PointCloud) -> MeshResult<ReconstructionResult> {
        let method = self.method();
        let _timer = OperationTimer::new(method.as_str());

        if let Some(idx) = cloud.first_non_finite() {
            return Err(MeshError::reconstruction(
                method.as_str(),
                format!("point {} has a non-finite coordinate", idx),
            ));
        }

        if cloud.len() < 3 {
            warn!(
                points = cloud.len(),
                method = method.as_str(),
                "Too few points to reconstruct a surface"
            );
            return Ok(ReconstructionResult::from_mesh(
                Mesh::new(),
                false,
                StrategyDetails::None,
            ));
        }

        let result = match self {
            Strategy::BallPivoting(params) => ball_pivoting::reconstruct(cloud, params)?,
            Strategy::AlphaShape(params) => alpha_shape::reconstruct(cloud, params)?,
            Strategy::Poisson(params) => poisson::reconstruct(cloud, params)?,
        };

        info!(
            method = method.as_str(),
            points = cloud.len(),
            vertices = result.vertex_count,
            faces = result.face_count,
            normals_estimated = result.normals_estimated,
            "Reconstruction complete"
        );

        Ok(result)
    }
}

/// Strategy-specific values that were actually used.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyDetails {
    /// Radii tried, in order.
    BallPivoting { radii: Vec<f64>, unused_points: usize },
    /// Alpha used.
    AlphaShape { alpha: f64 },
    /// Grid resolution along each axis and the voxel edge length.
    Poisson { resolution: usize, voxel_size: f64 },
    /// Nothing was run.
    None,
}

/// Result of a reconstruction.
#[derive(Debug, Clone)]
pub struct ReconstructionResult {
    /// The candidate mesh, not yet validated or repaired.
    pub mesh: Mesh,
    /// Number of vertices in `mesh`.
    pub vertex_count: usize,
    /// Number of faces in `mesh`.
    pub face_count: usize,
    /// Whether normals had to be estimated.
    pub normals_estimated: bool,
    /// Effective strategy parameters.
    pub details: StrategyDetails,
}

impl ReconstructionResult {
    pub(crate) fn from_mesh(mesh: Mesh, normals_estimated: bool, details: StrategyDetails) -> Self {
        Self {
            vertex_count: mesh.vertex_count(),
            face_count: mesh.face_count(),
            normals_estimated,
            details,
            mesh,
        }
    }
}

/// Return `cloud` with oriented normals, estimating them when absent.
///
/// The flag is true when estimation ran.
pub(crate) fn ensure_normals(cloud: &PointCloud, k: usize) -> (PointCloud, bool) {
    if cloud.has_normals() {
        return (cloud.clone(), false);
    }
    let mut cloud = cloud.with_estimated_normals(k);
    cloud.orient_normals_outward();
    (cloud, true)
}

/// Copy the cloud into mesh vertices, index for index.
pub(crate) fn vertices_from_cloud(cloud: &PointCloud) -> Vec<Vertex> {
    cloud
        .points
        .iter()
        .map(|p| Vertex {
            position: p.position,
            normal: p.normal,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_str() {
        assert_eq!(
            "ball_pivoting".parse::<ReconstructionMethod>().unwrap(),
            ReconstructionMethod::BallPivoting
        );
        assert_eq!(
            "alpha_shape".parse::<ReconstructionMethod>().unwrap(),
            ReconstructionMethod::AlphaShape
        );
        assert_eq!(
            "poisson".parse::<ReconstructionMethod>().unwrap(),
            ReconstructionMethod::Poisson
        );
    }

    #[test]
    fn test_unknown_method_is_configuration_error() {
        for name in ["marching_cubes", "Poisson", "", "ball-pivoting"] {
            let err = name.parse::<ReconstructionMethod>().unwrap_err();
            assert!(err.is_batch_fatal(), "{name} should be rejected");
            assert!(matches!(err, MeshError::Configuration { .. }));
        }
    }

    #[test]
    fn test_too_few_points_gives_empty_mesh() {
        let strategies = [
            Strategy::BallPivoting(BallPivotingParams::new(0.1)),
            Strategy::AlphaShape(AlphaShapeParams::new(0.1)),
            Strategy::Poisson(PoissonParams::default()),
        ];
        let mut cloud = PointCloud::new();
        for strategy in &strategies {
            let result = strategy.reconstruct(&cloud).unwrap();
            assert!(result.mesh.is_empty());
        }

        cloud.push_coords(0.0, 0.0, 0.0);
        cloud.push_coords(1.0, 0.0, 0.0);
        for strategy in &strategies {
            let result = strategy.reconstruct(&cloud).unwrap();
            assert_eq!(result.face_count, 0);
        }
    }

    #[test]
    fn test_non_finite_points_rejected() {
        let mut cloud = PointCloud::new();
        cloud.push_coords(0.0, 0.0, 0.0);
        cloud.push_coords(1.0, f64::INFINITY, 0.0);
        cloud.push_coords(0.0, 1.0, 0.0);
        let err = Strategy::AlphaShape(AlphaShapeParams::new(1.0))
            .reconstruct(&cloud)
            .unwrap_err();
        assert!(matches!(err, MeshError::Reconstruction { .. }));
    }

    #[test]
    fn test_input_cloud_untouched() {
        let mut cloud = PointCloud::new();
        cloud.push_coords(0.0, 0.0, 0.0);
        cloud.push_coords(1.0, 0.0, 0.0);
        cloud.push_coords(0.0, 1.0, 0.0);
        cloud.push_coords(0.2, 0.3, 0.9);
        let before = cloud.points.clone();
        Strategy::BallPivoting(BallPivotingParams::new(1.0))
            .reconstruct(&cloud)
            .unwrap();
        assert_eq!(cloud.points, before);
        assert!(!cloud.has_normals());
    }

    #[test]
    fn test_flat_grid_reconstructs() {
        let mut cloud = PointCloud::new();
        for x in 0..30 {
            for y in 0..30 {
                cloud.push_coords(x as f64 * 0.05, y as f64 * 0.05, 0.0);
            }
        }

        let alpha = Strategy::AlphaShape(AlphaShapeParams::new(0.1))
            .reconstruct(&cloud)
            .unwrap();
        assert!(alpha.face_count > 0);

        Strategy::BallPivoting(BallPivotingParams::new(0.05))
            .reconstruct(&cloud)
            .unwrap();
        Strategy::Poisson(PoissonParams::default())
            .reconstruct(&cloud)
            .unwrap();
    }

    #[test]
    fn test_repeated_points_reconstruct() {
        let mut cloud = PointCloud::new();
        for _ in 0..50 {
            cloud.push_coords(0.0, 0.0, 0.0);
        }
        cloud.push_coords(1.0, 0.0, 0.0);
        cloud.push_coords(0.0, 1.0, 0.0);

        for strategy in [
            Strategy::BallPivoting(BallPivotingParams::new(0.5)),
            Strategy::AlphaShape(AlphaShapeParams::new(0.5)),
        ] {
            let result = strategy.reconstruct(&cloud).unwrap();
            assert_eq!(result.mesh.vertex_count(), cloud.len());
        }
        Strategy::Poisson(PoissonParams::default())
            .reconstruct(&cloud)
            .unwrap();
    }
}
