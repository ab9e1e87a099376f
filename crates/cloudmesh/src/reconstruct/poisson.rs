//! Implicit-surface reconstruction in the manner of screened Poisson.
//!
//! The oriented samples define a signed field: each grid node takes its
//! distance to the nearest sample, negated when the node lies behind that
//! sample's tangent plane. The zero level set of the field is extracted with
//! surface nets, giving a closed surface wherever the grid encloses the
//! samples.
//!
//! The grid spans a cube centred on the samples whose edge is `scale` times
//! the largest bounding-box extent. Its resolution is `2^depth` cells per
//! axis, reduced so a cell is never smaller than half the mean sample
//! spacing, and capped at [`MAX_RESOLUTION`].

use fast_surface_nets::{SurfaceNetsBuffer, ndshape::RuntimeShape, surface_nets};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ReconstructionResult, StrategyDetails, ensure_normals};
use crate::error::{MeshError, MeshResult};
use crate::pointcloud::{PointCloud, PointIndex, estimate_point_spacing};
use crate::types::{Mesh, Vertex};

/// Upper bound on grid cells per axis.
pub const MAX_RESOLUTION: usize = 256;

/// Lower bound on grid cells per axis.
const MIN_RESOLUTION: usize = 4;

/// Value outside the sampled grid, well above any real distance.
const OUTSIDE: f32 = 1000.0;

/// Parameters for Poisson-style reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoissonParams {
    /// Octree depth; the grid has at most `2^depth` cells per axis.
    pub depth: u32,
    /// Ratio of the reconstruction cube edge to the samples' largest extent.
    pub scale: f64,
    /// Neighbours used for PCA when the cloud has no normals.
    pub normal_neighbors: usize,
}

impl Default for PoissonParams {
    fn default() -> Self {
        Self {
            depth: 9,
            scale: 1.1,
            normal_neighbors: 16,
        }
    }
}

impl PoissonParams {
    /// Cells per axis for a cube of edge `cube_edge` over samples spaced
    /// `spacing` apart.
    pub fn resolution(&self, cube_edge: f64, spacing: f64) -> usize {
        let by_depth = 1usize.checked_shl(self.depth).unwrap_or(usize::MAX);
        let by_density = if spacing > 0.0 && cube_edge.is_finite() {
            (cube_edge / (0.5 * spacing)).ceil().min(usize::MAX as f64) as usize
        } else {
            by_depth
        };
        by_depth
            .min(by_density)
            .min(MAX_RESOLUTION)
            .max(MIN_RESOLUTION)
    }
}

pub(crate) fn reconstruct(
    cloud: &PointCloud,
    params: &PoissonParams,
) -> MeshResult<ReconstructionResult> {
    let (cloud, normals_estimated) = ensure_normals(cloud, params.normal_neighbors);

    let (min, max) = cloud
        .bounds()
        .ok_or_else(|| MeshError::reconstruction("poisson", "point cloud has no bounds"))?;
    let extent = max - min;
    let largest = extent.x.max(extent.y).max(extent.z);
    if largest <= 0.0 {
        return Err(MeshError::reconstruction(
            "poisson",
            "all points coincide, the samples span no volume",
        ));
    }

    let index = PointIndex::new(&cloud);
    let spacing = estimate_point_spacing(&cloud, &index);

    let cube_edge = largest * params.scale;
    let resolution = params.resolution(cube_edge, spacing);
    let voxel_size = cube_edge / resolution as f64;
    let center = Point3::from((min.coords + max.coords) * 0.5);
    let origin = center - Vector3::repeat(cube_edge * 0.5);

    info!(
        points = cloud.len(),
        resolution,
        voxel_size,
        spacing,
        "Poisson grid"
    );

    // Grid nodes, one more than cells on each axis.
    let n = resolution + 1;
    let mut field = vec![OUTSIDE; n * n * n];
    for iz in 0..n {
        for iy in 0..n {
            for ix in 0..n {
                let pos = origin + Vector3::new(ix as f64, iy as f64, iz as f64) * voxel_size;
                let nearest = index.nearest_one(&pos);
                let sample = &cloud.points[nearest.item as usize];
                let dist = nearest.distance.sqrt();
                let sign = match sample.normal {
                    Some(normal) if (pos - sample.position).dot(&normal) < 0.0 => -1.0,
                    _ => 1.0,
                };
                field[ix + iy * n + iz * n * n] = (sign * dist) as f32;
            }
        }
    }

    let mut mesh = extract_level_set(&field, n, origin, voxel_size);

    // Consistent outward winding.
    if mesh.signed_volume() < 0.0 {
        mesh.flip_faces();
    }

    debug!(
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        "Level set extracted"
    );

    Ok(ReconstructionResult::from_mesh(
        mesh,
        normals_estimated,
        StrategyDetails::Poisson {
            resolution,
            voxel_size,
        },
    ))
}

/// Zero level set of an `n^3` node field via surface nets.
fn extract_level_set(field: &[f32], n: usize, origin: Point3<f64>, voxel_size: f64) -> Mesh {
    // One node of padding on every side keeps the surface closed at the cube walls.
    let padded = n + 2;
    let mut padded_field = vec![OUTSIDE; padded * padded * padded];
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                padded_field[(x + 1) + (y + 1) * padded + (z + 1) * padded * padded] =
                    field[x + y * n + z * n * n];
            }
        }
    }

    let dim = padded as u32;
    let shape = RuntimeShape::<u32, 3>::new([dim, dim, dim]);
    let mut buffer = SurfaceNetsBuffer::default();
    surface_nets(
        &padded_field,
        &shape,
        [0, 0, 0],
        [dim - 1, dim - 1, dim - 1],
        &mut buffer,
    );

    let mut mesh = Mesh::with_capacity(buffer.positions.len(), buffer.indices.len() / 3);
    for pos in &buffer.positions {
        mesh.vertices.push(Vertex::new(Point3::new(
            origin.x + (pos[0] as f64 - 1.0) * voxel_size,
            origin.y + (pos[1] as f64 - 1.0) * voxel_size,
            origin.z + (pos[2] as f64 - 1.0) * voxel_size,
        )));
    }
    for chunk in buffer.indices.chunks_exact(3) {
        mesh.faces.push([chunk[0], chunk[1], chunk[2]]);
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcloud::CloudPoint;
    use crate::reconstruct::Strategy;

    fn sphere_cloud(n: usize, radius: f64, with_normals: bool) -> PointCloud {
        let golden = std::f64::consts::PI * (3.0 - 5f64.sqrt());
        let mut cloud = PointCloud::new();
        for i in 0..n {
            let y = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
            let r = (1.0 - y * y).sqrt();
            let theta = golden * i as f64;
            let dir = Vector3::new(r * theta.cos(), y, r * theta.sin());
            let position = Point3::from(dir * radius);
            cloud.push(if with_normals {
                CloudPoint::with_normal(position, dir)
            } else {
                CloudPoint::new(position)
            });
        }
        cloud
    }

    #[test]
    fn test_resolution_rules() {
        let params = PoissonParams::default();
        // Depth 9 would be 512, density allows 1 / (0.5 * 0.0625) = 32.
        assert_eq!(params.resolution(1.0, 0.0625), 32);
        // Density would allow far more than the cap.
        assert_eq!(params.resolution(100.0, 0.001), MAX_RESOLUTION);

        let shallow = PoissonParams {
            depth: 3,
            ..PoissonParams::default()
        };
        assert_eq!(shallow.resolution(1.0, 0.001), 8);

        let tiny = PoissonParams {
            depth: 1,
            ..PoissonParams::default()
        };
        assert_eq!(tiny.resolution(1.0, 0.001), MIN_RESOLUTION);

        let huge = PoissonParams {
            depth: 200,
            ..PoissonParams::default()
        };
        assert_eq!(huge.resolution(1.0, 0.0001), MAX_RESOLUTION);
    }

    #[test]
    fn test_sphere_reconstruction() {
        let cloud = sphere_cloud(400, 1.0, true);
        let result = Strategy::Poisson(PoissonParams::default())
            .reconstruct(&cloud)
            .unwrap();

        assert!(!result.normals_estimated);
        assert!(result.face_count > 100);
        assert!(result.mesh.signed_volume() > 0.0);

        // Vertices sit near the sampled sphere.
        let voxel = match result.details {
            StrategyDetails::Poisson { voxel_size, .. } => voxel_size,
            other => panic!("unexpected details {other:?}"),
        };
        for v in &result.mesh.vertices {
            let r = v.position.coords.norm();
            assert!((r - 1.0).abs() < 0.2 + voxel, "vertex at radius {r}");
        }
    }

    #[test]
    fn test_estimates_normals_when_absent() {
        let cloud = sphere_cloud(300, 2.0, false);
        let result = Strategy::Poisson(PoissonParams {
            depth: 5,
            ..PoissonParams::default()
        })
        .reconstruct(&cloud)
        .unwrap();
        assert!(result.normals_estimated);
        assert!(result.face_count > 0);
        assert!(result.mesh.signed_volume() > 0.0);
    }

    #[test]
    fn test_coincident_points_fail() {
        let mut cloud = PointCloud::new();
        for _ in 0..3 {
            cloud.push(CloudPoint::with_normal(Point3::origin(), Vector3::z()));
        }
        let err = Strategy::Poisson(PoissonParams::default())
            .reconstruct(&cloud)
            .unwrap_err();
        assert!(matches!(err, MeshError::Reconstruction { .. }));
    }
}
