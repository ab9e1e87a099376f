//! Alpha shape reconstruction.
//!
//! A triangle on three sample points belongs to the alpha shape when a
//! sphere of radius alpha passes through its corners with no other sample
//! strictly inside. Each such triangle is emitted once, wound so that its
//! normal faces the empty sphere, i.e. away from the material.
//!
//! Normals are neither needed nor used. Small alpha leaves holes and
//! isolated points; large alpha tends toward the convex hull.

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ball::{ball_center, is_empty_ball};
use super::{ReconstructionResult, StrategyDetails, vertices_from_cloud};
use crate::error::MeshResult;
use crate::pointcloud::{PointCloud, PointIndex};
use crate::types::{Mesh, Triangle, Vertex};

/// Nearest neighbours examined per point.
const MAX_NEIGHBORS: usize = 32;

/// Parameters for alpha shape reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaShapeParams {
    /// Radius of the probing sphere.
    pub alpha: f64,
}

impl Default for AlphaShapeParams {
    fn default() -> Self {
        Self { alpha: 0.1 }
    }
}

impl AlphaShapeParams {
    /// Parameters with the given alpha.
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }
}

pub(crate) fn reconstruct(
    cloud: &PointCloud,
    params: &AlphaShapeParams,
) -> MeshResult<ReconstructionResult> {
    let alpha = params.alpha;
    let index = PointIndex::new(cloud);
    let reach_sq = 4.0 * alpha * alpha;

    let mut faces: Vec<[u32; 3]> = Vec::new();
    let mut seen: HashSet<[u32; 3]> = HashSet::new();
    let mut examined = 0usize;

    for (i, point) in cloud.points.iter().enumerate() {
        // Only higher indices, so each triple is examined from its lowest corner.
        let neighbors: Vec<usize> = index
            .nearest_n(&point.position, MAX_NEIGHBORS + 1)
            .into_iter()
            .filter(|n| n.distance <= reach_sq)
            .map(|n| n.item as usize)
            .filter(|&j| j > i)
            .collect();

        for (jdx, &j) in neighbors.iter().enumerate() {
            for &k in &neighbors[jdx + 1..] {
                let p0 = point.position;
                let p1 = cloud.points[j].position;
                let p2 = cloud.points[k].position;
                let tri = Triangle::new(p0, p1, p2);
                if tri.circumradius() > alpha {
                    continue;
                }
                examined += 1;

                let n = tri.normal_unnormalized();
                let exclude = [i, j, k];

                // Prefer the side the right-hand normal points to.
                let face = if ball_center(&p0, &p1, &p2, &n, alpha)
                    .is_some_and(|c| is_empty_ball(cloud, &index, &c, alpha, &exclude))
                {
                    Some([i as u32, j as u32, k as u32])
                } else if ball_center(&p0, &p1, &p2, &-n, alpha)
                    .is_some_and(|c| is_empty_ball(cloud, &index, &c, alpha, &exclude))
                {
                    Some([i as u32, k as u32, j as u32])
                } else {
                    None
                };

                if let Some(face) = face {
                    let mut key = face;
                    key.sort_unstable();
                    if seen.insert(key) {
                        faces.push(face);
                    }
                }
            }
        }
    }

    debug!(
        alpha,
        candidates = examined,
        faces = faces.len(),
        "Alpha shape complete"
    );

    let vertices: Vec<Vertex> = vertices_from_cloud(cloud);
    let mesh = Mesh { vertices, faces };

    Ok(ReconstructionResult::from_mesh(
        mesh,
        false,
        StrategyDetails::AlphaShape { alpha },
    ))
}
