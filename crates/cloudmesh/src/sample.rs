//! Surface sampling: meshes to `.npy` point samples.
//!
//! [`sample_mesh`] draws points uniformly over the surface area, each point
//! carrying the normal of the face it was drawn from, so the output feeds
//! straight back into reconstruction as an N x 6 sample.

use std::fmt;
use std::path::Path;

use nalgebra::{Point3, Vector3};
use rand::prelude::*;
use rand::rngs::StdRng;
use tracing::debug;

use crate::batch::{
    BatchResult, Converted, DirectorySelection, FileConverter, PipelineStage, SelectionReport,
    StageFailure, convert_directory, convert_selection, run_stage,
};
use crate::config::SamplerConfig;
use crate::error::{MeshError, MeshResult};
use crate::io::{MeshFormat, load_mesh};
use crate::pointcloud::{CloudPoint, PointCloud, save_point_sample};
use crate::progress::ProgressCallback;
use crate::types::Mesh;

/// Draw `count` points uniformly over the surface of `mesh`.
///
/// With `seed` set the draw is reproducible. Faces with out-of-range
/// indices are ignored; a mesh with no surface area is an
/// [`MeshError::EmptyMesh`].
pub fn sample_mesh(mesh: &Mesh, count: usize, seed: Option<u64>) -> MeshResult<PointCloud> {
    let mut corners: Vec<[Point3<f64>; 3]> = Vec::with_capacity(mesh.face_count());
    let mut normals: Vec<Vector3<f64>> = Vec::with_capacity(mesh.face_count());
    let mut cumulative: Vec<f64> = Vec::with_capacity(mesh.face_count());
    let mut total_area = 0.0;

    for face_idx in 0..mesh.face_count() {
        let Some(tri) = mesh.triangle(face_idx) else {
            continue;
        };
        let Some(normal) = tri.normal() else {
            continue;
        };
        let area = tri.area();
        if !area.is_finite() || area <= 0.0 {
            continue;
        }
        total_area += area;
        cumulative.push(total_area);
        corners.push([tri.v0, tri.v1, tri.v2]);
        normals.push(normal);
    }

    if cumulative.is_empty() {
        return Err(MeshError::empty_mesh(format!(
            "no face with positive area among {} faces",
            mesh.face_count()
        )));
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut cloud = PointCloud::with_capacity(count);
    for _ in 0..count {
        let target = rng.gen_range(0.0..total_area);
        let face = cumulative
            .partition_point(|&c| c <= target)
            .min(cumulative.len() - 1);

        // Square-root warp keeps the draw uniform over the triangle.
        let r1: f64 = rng.r#gen::<f64>().sqrt();
        let r2: f64 = rng.r#gen();
        let [a, b, c] = corners[face];
        let position =
            Point3::from(a.coords * (1.0 - r1) + b.coords * (r1 * (1.0 - r2)) + c.coords * (r1 * r2));

        cloud.push(CloudPoint::with_normal(position, normals[face]));
    }

    debug!(
        points = cloud.len(),
        faces = corners.len(),
        area = total_area,
        "Surface sampled"
    );

    Ok(cloud)
}

/// Mesh to point sample batch converter.
///
/// Walks the same directory layouts as [`BatchRunner`](crate::BatchRunner),
/// reading `.stl`, `.obj` and `.ply` files in any letter case and writing
/// one `<stem>.npy` per mesh.
pub struct SampleRunner {
    config: SamplerConfig,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for SampleRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleRunner")
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl SampleRunner {
    pub fn new(config: SamplerConfig) -> MeshResult<Self> {
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

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Sample every mesh in `mesh_dir` into `cloud_dir`.
    pub fn run_directory(&self, mesh_dir: &Path, cloud_dir: &Path) -> MeshResult<BatchResult> {
        convert_directory(self, self.progress.as_ref(), mesh_dir, cloud_dir)
    }

    /// Sample the directories named by `selection`.
    pub fn run(
        &self,
        selection: &DirectorySelection,
        mesh_root: &Path,
        cloud_root: &Path,
    ) -> MeshResult<SelectionReport> {
        convert_selection(self, self.progress.as_ref(), selection, mesh_root, cloud_root)
    }
}

impl FileConverter for SampleRunner {
    fn operation(&self) -> &'static str {
        "sample"
    }

    fn accepts(&self, path: &Path) -> bool {
        MeshFormat::from_path(path).is_some()
    }

    fn output_extension(&self) -> &str {
        "npy"
    }

    fn skip_existing(&self) -> bool {
        self.config.skip_existing
    }

    fn categories(&self) -> &[String] {
        &self.config.categories
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<Converted, StageFailure> {
        let mesh = run_stage(PipelineStage::Load, || load_mesh(input))?;
        let cloud = run_stage(PipelineStage::Sample, || {
            sample_mesh(&mesh, self.config.count, self.config.seed)
        })?;
        run_stage(PipelineStage::Write, || save_point_sample(&cloud, output))?;

        Ok(Converted {
            vertices: cloud.len(),
            faces: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::FileOutcome;
    use crate::error::ErrorCode;
    use crate::io::save_mesh;
    use crate::pointcloud::load_point_sample;
    use crate::types::Vertex;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn unit_square() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.faces.push([0, 1, 2]);
        mesh.faces.push([0, 2, 3]);
        mesh
    }

    fn tetrahedron() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 1.0));
        mesh.faces.push([0, 2, 1]);
        mesh.faces.push([0, 1, 3]);
        mesh.faces.push([0, 3, 2]);
        mesh.faces.push([1, 2, 3]);
        mesh
    }

    #[test]
    fn test_samples_lie_on_surface() {
        let cloud = sample_mesh(&unit_square(), 500, Some(7)).unwrap();
        assert_eq!(cloud.len(), 500);
        assert!(cloud.has_normals());
        for p in &cloud.points {
            assert_relative_eq!(p.position.z, 0.0);
            assert!((-1e-12..=1.0 + 1e-12).contains(&p.position.x));
            assert!((-1e-12..=1.0 + 1e-12).contains(&p.position.y));
            let n = p.normal.unwrap();
            assert_relative_eq!(n.z, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let a = sample_mesh(&tetrahedron(), 50, Some(42)).unwrap();
        let b = sample_mesh(&tetrahedron(), 50, Some(42)).unwrap();
        assert_eq!(a.points, b.points);
    }

    #[test]
    fn test_area_weighting() {
        // Second triangle has three times the area of the first.
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(10.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(13.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(10.0, 1.0, 0.0));
        mesh.faces.push([0, 1, 2]);
        mesh.faces.push([3, 4, 5]);

        let cloud = sample_mesh(&mesh, 4000, Some(3)).unwrap();
        let large = cloud.points.iter().filter(|p| p.position.x >= 10.0).count();
        let ratio = large as f64 / cloud.len() as f64;
        assert!((ratio - 0.75).abs() < 0.05, "ratio was {ratio}");
    }

    #[test]
    fn test_zero_area_mesh_is_rejected() {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(2.0, 0.0, 0.0));
        mesh.faces.push([0, 1, 2]);
        let err = sample_mesh(&mesh, 10, Some(1)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmptyMesh);
    }

    #[test]
    fn test_sample_runner_writes_six_columns() {
        let dir = TempDir::new().unwrap();
        let meshes = dir.path().join("raw");
        std::fs::create_dir(&meshes).unwrap();
        save_mesh(&tetrahedron(), &meshes.join("Tetra.STL")).unwrap();
        std::fs::write(meshes.join("notes.txt"), "ignored").unwrap();

        let config = SamplerConfig {
            count: 64,
            seed: Some(9),
            ..SamplerConfig::default()
        };
        let clouds = dir.path().join("clouds");
        let result = SampleRunner::new(config)
            .unwrap()
            .run_directory(&meshes, &clouds)
            .unwrap();

        assert_eq!(result.total_considered, 1);
        assert_eq!(result.succeeded, 1);
        match &result.entries[0].outcome {
            FileOutcome::Succeeded { vertices, faces, .. } => {
                assert_eq!(*vertices, 64);
                assert_eq!(*faces, 0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let cloud = load_point_sample(&clouds.join("Tetra.npy")).unwrap();
        assert_eq!(cloud.len(), 64);
        assert!(cloud.has_normals());
    }

    #[test]
    fn test_sample_runner_records_broken_mesh() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.stl"), [0u8, 1, 2, 3]).unwrap();

        let result = SampleRunner::new(SamplerConfig::default())
            .unwrap()
            .run_directory(dir.path(), &dir.path().join("out"))
            .unwrap();
        assert_eq!(result.failed(), 1);
        match &result.entries[0].outcome {
            FileOutcome::Failed { stage, .. } => assert_eq!(*stage, PipelineStage::Load),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_zero_count_rejected() {
        let config = SamplerConfig {
            count: 0,
            ..SamplerConfig::default()
        };
        assert_eq!(
            SampleRunner::new(config).unwrap_err().code(),
            ErrorCode::Configuration
        );
    }
}
