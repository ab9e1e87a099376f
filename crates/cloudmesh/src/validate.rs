//! Candidate validation and mesh reporting.
//!
//! [`validate_candidate`] is the pipeline gate between reconstruction and
//! repair: it rejects meshes without vertices or faces and meshes whose data
//! cannot be trusted (out-of-range indices, NaN or infinite coordinates).
//! [`validate_mesh`] produces an informational [`MeshReport`] and never
//! fails.

use hashbrown::HashMap;
use nalgebra::Point3;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::Mesh;
use crate::error::{MeshError, MeshResult};

/// Reject a candidate mesh that cannot go on to repair.
///
/// Fails with [`MeshError::EmptyMesh`] when the mesh has zero vertices or
/// zero faces, [`MeshError::InvalidVertexIndex`] for the first face index
/// outside the vertex array and [`MeshError::InvalidCoordinate`] for the
/// first non-finite coordinate.
pub fn validate_candidate(mesh: &Mesh) -> MeshResult<()> {
    if mesh.vertices.is_empty() || mesh.faces.is_empty() {
        return Err(MeshError::empty_mesh(format!(
            "candidate has {} vertices and {} faces",
            mesh.vertex_count(),
            mesh.face_count()
        )));
    }

    let vertex_count = mesh.vertex_count();
    for (face_idx, face) in mesh.faces.iter().enumerate() {
        if let Some(&bad) = face.iter().find(|&&v| v as usize >= vertex_count) {
            return Err(MeshError::invalid_vertex_index(face_idx, bad, vertex_count));
        }
    }

    for (vertex_idx, vertex) in mesh.vertices.iter().enumerate() {
        let coords = [
            ("x", vertex.position.x),
            ("y", vertex.position.y),
            ("z", vertex.position.z),
        ];
        if let Some((name, value)) = coords.into_iter().find(|(_, v)| !v.is_finite()) {
            return Err(MeshError::invalid_coordinate(vertex_idx, name, value));
        }
    }

    debug!(
        vertices = vertex_count,
        faces = mesh.face_count(),
        "Candidate mesh accepted"
    );
    Ok(())
}

/// Validation report for a mesh.
#[derive(Debug, Clone, Serialize)]
pub struct MeshReport {
    /// Total vertex count.
    pub vertex_count: usize,

    /// Total face count.
    pub face_count: usize,

    /// Vertices carrying a normal.
    pub normal_count: usize,

    /// Faces referencing a vertex that does not exist.
    pub invalid_face_count: usize,

    /// Whether the mesh has no boundary edges.
    pub is_watertight: bool,

    /// Whether all edges have at most 2 adjacent faces.
    pub is_manifold: bool,

    /// Number of boundary edges (edges with 1 adjacent face).
    pub boundary_edge_count: usize,

    /// Number of non-manifold edges (edges with >2 adjacent faces).
    pub non_manifold_edge_count: usize,

    /// Bounding box as (min_corner, max_corner).
    #[serde(skip)]
    pub bounds: Option<(Point3<f64>, Point3<f64>)>,

    /// Dimensions (x, y, z).
    pub dimensions: Option<(f64, f64, f64)>,

    /// Signed volume (positive = outward winding). Only meaningful for
    /// closed meshes.
    pub signed_volume: f64,

    /// Total surface area.
    pub surface_area: f64,
}

impl MeshReport {
    /// Whether the mesh has geometry and no out-of-range indices.
    pub fn is_valid(&self) -> bool {
        self.vertex_count > 0 && self.face_count > 0 && self.invalid_face_count == 0
    }

    /// Whether the mesh appears inside-out.
    pub fn is_inside_out(&self) -> bool {
        self.signed_volume < 0.0
    }
}

impl std::fmt::Display for MeshReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Mesh Report:")?;
        writeln!(f, "  Vertices: {}", self.vertex_count)?;
        writeln!(f, "  Faces: {}", self.face_count)?;
        writeln!(f, "  Normals: {}", self.normal_count)?;

        if self.invalid_face_count > 0 {
            writeln!(f, "  Invalid faces: {}", self.invalid_face_count)?;
        }

        if let Some((min, max)) = &self.bounds {
            writeln!(
                f,
                "  Bounds: [{:.3}, {:.3}, {:.3}] to [{:.3}, {:.3}, {:.3}]",
                min.x, min.y, min.z, max.x, max.y, max.z
            )?;
        }

        if let Some((dx, dy, dz)) = &self.dimensions {
            writeln!(f, "  Dimensions: {:.3} x {:.3} x {:.3}", dx, dy, dz)?;
        }

        writeln!(f, "  Surface Area: {:.4}", self.surface_area)?;
        writeln!(f, "  Signed Volume: {:.4}", self.signed_volume)?;

        writeln!(
            f,
            "  Watertight: {} (boundary edges: {})",
            if self.is_watertight { "yes" } else { "NO" },
            self.boundary_edge_count
        )?;

        writeln!(
            f,
            "  Manifold: {} (non-manifold edges: {})",
            if self.is_manifold { "yes" } else { "NO" },
            self.non_manifold_edge_count
        )?;

        Ok(())
    }
}

/// Count faces per undirected edge.
fn edge_face_counts(faces: &[[u32; 3]]) -> HashMap<(u32, u32), usize> {
    let mut counts: HashMap<(u32, u32), usize> = HashMap::with_capacity(faces.len() * 3 / 2);
    for face in faces {
        for k in 0..3 {
            let (a, b) = (face[k], face[(k + 1) % 3]);
            let key = if a < b { (a, b) } else { (b, a) };
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    counts
}

/// Validate a mesh and return a report.
///
/// Faces with out-of-range indices are counted and left out of the
/// geometric measures.
pub fn validate_mesh(mesh: &Mesh) -> MeshReport {
    let vertex_count = mesh.vertex_count();
    let (valid_faces, invalid_faces): (Vec<[u32; 3]>, Vec<[u32; 3]>) = mesh
        .faces
        .iter()
        .copied()
        .partition(|f| f.iter().all(|&v| (v as usize) < vertex_count));

    let counts = edge_face_counts(&valid_faces);
    let boundary_edge_count = counts.values().filter(|&&c| c == 1).count();
    let non_manifold_edge_count = counts.values().filter(|&&c| c > 2).count();

    let bounds = mesh.bounds();
    let dimensions = bounds.map(|(min, max)| (max.x - min.x, max.y - min.y, max.z - min.z));

    let measurable = Mesh {
        vertices: mesh.vertices.clone(),
        faces: valid_faces,
    };

    let report = MeshReport {
        vertex_count,
        face_count: mesh.face_count(),
        normal_count: mesh.normal_count(),
        invalid_face_count: invalid_faces.len(),
        is_watertight: boundary_edge_count == 0,
        is_manifold: non_manifold_edge_count == 0,
        boundary_edge_count,
        non_manifold_edge_count,
        bounds,
        dimensions,
        signed_volume: measurable.signed_volume(),
        surface_area: measurable.surface_area(),
    };

    if report.invalid_face_count > 0 {
        warn!(
            "Mesh has {} faces with out-of-range vertex indices",
            report.invalid_face_count
        );
    }

    debug!("{}", report);

    report
}

/// Log a one-line summary of a report.
pub fn log_validation(report: &MeshReport) {
    info!(
        vertices = report.vertex_count,
        faces = report.face_count,
        boundary_edges = report.boundary_edge_count,
        non_manifold_edges = report.non_manifold_edge_count,
        watertight = report.is_watertight,
        "Mesh summary"
    );
    if report.is_watertight && report.is_inside_out() {
        warn!("Closed mesh has negative volume, faces appear wound inward");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vertex;

    fn tetrahedron() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.5, 0.866025, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.5, 0.288675, 0.816497));

        mesh.faces.push([0, 2, 1]);
        mesh.faces.push([0, 1, 3]);
        mesh.faces.push([1, 2, 3]);
        mesh.faces.push([2, 0, 3]);

        mesh
    }

    fn single_triangle() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(1.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 1.0, 0.0));
        mesh.faces.push([0, 1, 2]);
        mesh
    }

    #[test]
    fn test_candidate_accepts_valid_mesh() {
        assert!(validate_candidate(&tetrahedron()).is_ok());
        assert!(validate_candidate(&single_triangle()).is_ok());
    }

    #[test]
    fn test_candidate_rejects_empty() {
        let err = validate_candidate(&Mesh::new()).unwrap_err();
        assert!(matches!(err, MeshError::EmptyMesh { .. }));

        // Vertices but no faces.
        let mut mesh = single_triangle();
        mesh.faces.clear();
        let err = validate_candidate(&mesh).unwrap_err();
        assert!(matches!(err, MeshError::EmptyMesh { .. }));
        assert!(err.to_string().contains("3 vertices and 0 faces"));
    }

    #[test]
    fn test_candidate_rejects_bad_index() {
        let mut mesh = single_triangle();
        mesh.faces.push([0, 1, 7]);
        match validate_candidate(&mesh).unwrap_err() {
            MeshError::InvalidVertexIndex {
                face_index,
                vertex_index,
                vertex_count,
            } => {
                assert_eq!(face_index, 1);
                assert_eq!(vertex_index, 7);
                assert_eq!(vertex_count, 3);
            }
            other => panic!("Expected InvalidVertexIndex, got {other:?}"),
        }
    }

    #[test]
    fn test_candidate_rejects_non_finite() {
        let mut mesh = single_triangle();
        mesh.vertices[2].position.y = f64::NAN;
        let err = validate_candidate(&mesh).unwrap_err();
        assert!(matches!(
            err,
            MeshError::InvalidCoordinate {
                vertex_index: 2,
                coordinate: "y",
                ..
            }
        ));

        let mut mesh = single_triangle();
        mesh.vertices[0].position.z = f64::NEG_INFINITY;
        assert!(validate_candidate(&mesh).is_err());
    }

    #[test]
    fn test_report_watertight_tetrahedron() {
        let report = validate_mesh(&tetrahedron());
        assert!(report.is_valid());
        assert!(report.is_watertight);
        assert!(report.is_manifold);
        assert_eq!(report.boundary_edge_count, 0);
        assert!(report.signed_volume > 0.0);
        assert!(!report.is_inside_out());
    }

    #[test]
    fn test_report_inverted_tetrahedron() {
        let mut mesh = tetrahedron();
        for face in &mut mesh.faces {
            face.swap(1, 2);
        }
        let report = validate_mesh(&mesh);
        assert!(report.is_watertight);
        assert!(report.is_inside_out());
        log_validation(&report);
    }

    #[test]
    fn test_report_open_mesh() {
        let report = validate_mesh(&single_triangle());
        assert!(!report.is_watertight);
        assert_eq!(report.boundary_edge_count, 3);
        approx::assert_relative_eq!(report.surface_area, 0.5);
    }

    #[test]
    fn test_report_counts_invalid_faces() {
        let mut mesh = single_triangle();
        mesh.faces.push([0, 1, 99]);
        let report = validate_mesh(&mesh);
        assert_eq!(report.invalid_face_count, 1);
        assert!(!report.is_valid());
        approx::assert_relative_eq!(report.surface_area, 0.5);
    }

    #[test]
    fn test_report_display() {
        let text = validate_mesh(&tetrahedron()).to_string();
        assert!(text.contains("Vertices: 4"));
        assert!(text.contains("Watertight: yes"));
    }
}
