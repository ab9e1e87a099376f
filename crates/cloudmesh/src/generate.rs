//! Random test shapes for exercising the pipeline.
//!
//! Each shape is a closed, outward-wound mesh with random size, rotated
//! about x, y and z in turn and translated within `[-2, 2]` on every axis.

use std::f64::consts::TAU;
use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::{Point3, Rotation3, Vector3};
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{MeshError, MeshResult};
use crate::io::write_mesh;
use crate::types::{Mesh, Vertex};

const TORUS_RADIAL_SEGMENTS: usize = 30;
const TORUS_TUBULAR_SEGMENTS: usize = 20;
const CONE_SEGMENTS: usize = 20;

/// Shapes the generator draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Torus,
    Cone,
    Octahedron,
    Icosahedron,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 4] = [
        ShapeKind::Torus,
        ShapeKind::Cone,
        ShapeKind::Octahedron,
        ShapeKind::Icosahedron,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeKind::Torus => "torus",
            ShapeKind::Cone => "cone",
            ShapeKind::Octahedron => "octahedron",
            ShapeKind::Icosahedron => "icosahedron",
        }
    }
}

impl std::fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file produced by [`generate_shapes`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub kind: ShapeKind,
    /// Whether the writer reported success.
    pub written: bool,
}

/// Torus in the xy plane around the origin.
pub fn torus(major_radius: f64, tube_radius: f64, radial: usize, tubular: usize) -> Mesh {
    let mut mesh = Mesh::with_capacity(radial * tubular, radial * tubular * 2);

    for i in 0..radial {
        let u = TAU * i as f64 / radial as f64;
        for j in 0..tubular {
            let v = TAU * j as f64 / tubular as f64;
            let ring = major_radius + tube_radius * v.cos();
            mesh.vertices.push(Vertex::from_coords(
                ring * u.cos(),
                ring * u.sin(),
                tube_radius * v.sin(),
            ));
        }
    }

    let index = |i: usize, j: usize| ((i % radial) * tubular + (j % tubular)) as u32;
    for i in 0..radial {
        for j in 0..tubular {
            let a = index(i, j);
            let b = index(i + 1, j);
            let c = index(i + 1, j + 1);
            let d = index(i, j + 1);
            mesh.faces.push([a, b, c]);
            mesh.faces.push([a, c, d]);
        }
    }

    mesh
}

/// Cone with its base disc at z = 0 and apex at z = `height`.
pub fn cone(radius: f64, height: f64, segments: usize) -> Mesh {
    let mut mesh = Mesh::with_capacity(segments + 2, segments * 2);
    let apex = segments as u32;
    let base = apex + 1;

    for i in 0..segments {
        let theta = TAU * i as f64 / segments as f64;
        mesh.vertices
            .push(Vertex::from_coords(radius * theta.cos(), radius * theta.sin(), 0.0));
    }
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, height));
    mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));

    for i in 0..segments {
        let a = i as u32;
        let b = ((i + 1) % segments) as u32;
        mesh.faces.push([a, b, apex]);
        mesh.faces.push([base, b, a]);
    }

    mesh
}

/// Regular octahedron with vertices at distance `radius` on each axis.
pub fn octahedron(radius: f64) -> Mesh {
    let mut mesh = Mesh::with_capacity(6, 8);
    for (x, y, z) in [
        (1.0, 0.0, 0.0),
        (-1.0, 0.0, 0.0),
        (0.0, 1.0, 0.0),
        (0.0, -1.0, 0.0),
        (0.0, 0.0, 1.0),
        (0.0, 0.0, -1.0),
    ] {
        mesh.vertices
            .push(Vertex::from_coords(x * radius, y * radius, z * radius));
    }

    let (px, nx, py, ny, pz, nz) = (0, 1, 2, 3, 4, 5);
    mesh.faces.extend_from_slice(&[
        [px, py, pz],
        [py, nx, pz],
        [nx, ny, pz],
        [ny, px, pz],
        [py, px, nz],
        [nx, py, nz],
        [ny, nx, nz],
        [px, ny, nz],
    ]);

    mesh
}

/// Regular icosahedron inscribed in a sphere of `radius`.
pub fn icosahedron(radius: f64) -> Mesh {
    let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let corners = [
        (-1.0, phi, 0.0),
        (1.0, phi, 0.0),
        (-1.0, -phi, 0.0),
        (1.0, -phi, 0.0),
        (0.0, -1.0, phi),
        (0.0, 1.0, phi),
        (0.0, -1.0, -phi),
        (0.0, 1.0, -phi),
        (phi, 0.0, -1.0),
        (phi, 0.0, 1.0),
        (-phi, 0.0, -1.0),
        (-phi, 0.0, 1.0),
    ];

    let mut mesh = Mesh::with_capacity(12, 20);
    for (x, y, z) in corners {
        let p = Vector3::new(x, y, z).normalize() * radius;
        mesh.vertices.push(Vertex::new(Point3::from(p)));
    }

    mesh.faces.extend_from_slice(&[
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ]);

    mesh
}

/// Build a `kind` shape with random dimensions.
pub fn random_shape_of<R: Rng + ?Sized>(kind: ShapeKind, rng: &mut R) -> Mesh {
    match kind {
        ShapeKind::Torus => torus(
            rng.gen_range(1.0..2.0),
            rng.gen_range(0.2..0.5),
            TORUS_RADIAL_SEGMENTS,
            TORUS_TUBULAR_SEGMENTS,
        ),
        ShapeKind::Cone => cone(
            rng.gen_range(0.5..1.5),
            rng.gen_range(1.0..3.0),
            CONE_SEGMENTS,
        ),
        ShapeKind::Octahedron => octahedron(rng.gen_range(1.0..2.0)),
        ShapeKind::Icosahedron => icosahedron(rng.gen_range(1.0..2.0)),
    }
}

/// Pick a shape, size it, then rotate about the origin and translate.
pub fn random_shape<R: Rng + ?Sized>(rng: &mut R) -> (ShapeKind, Mesh) {
    let kind = ShapeKind::ALL[rng.gen_range(0..ShapeKind::ALL.len())];
    let mut mesh = random_shape_of(kind, rng);

    let rotation = Rotation3::from_axis_angle(&Vector3::x_axis(), rng.gen_range(0.0..TAU))
        * Rotation3::from_axis_angle(&Vector3::y_axis(), rng.gen_range(0.0..TAU))
        * Rotation3::from_axis_angle(&Vector3::z_axis(), rng.gen_range(0.0..TAU));
    for vertex in &mut mesh.vertices {
        vertex.position = rotation * vertex.position;
    }

    let offset = Vector3::new(
        rng.gen_range(-2.0..2.0),
        rng.gen_range(-2.0..2.0),
        rng.gen_range(-2.0..2.0),
    );
    mesh.translate(offset);

    (kind, mesh)
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn generate_with_rng(dir: &Path, count: usize, rng: &mut StdRng) -> MeshResult<Vec<GeneratedFile>> {
    fs::create_dir_all(dir)
        .map_err(|e| MeshError::structural(dir, format!("cannot create output directory: {e}")))?;

    let mut files = Vec::with_capacity(count);
    for i in 0..count {
        let (kind, mesh) = random_shape(rng);
        let path = dir.join(format!("random_shape_{:03}.stl", i + 1));
        let written = write_mesh(&mesh, &path);
        if written {
            info!(shape = %kind, "Generated {}", path.display());
        } else {
            warn!(shape = %kind, "Failed to generate {}", path.display());
        }
        files.push(GeneratedFile { path, kind, written });
    }

    Ok(files)
}

/// Write `count` random shapes to `dir` as `random_shape_NNN.stl`.
///
/// Fails only when `dir` cannot be created; a file the writer rejects is
/// reported with `written == false`.
pub fn generate_shapes(dir: &Path, count: usize, seed: Option<u64>) -> MeshResult<Vec<GeneratedFile>> {
    let mut rng = make_rng(seed);
    generate_with_rng(dir, count, &mut rng)
}

/// Write `per_category` random shapes into `root/<category>` for each
/// category.
pub fn generate_for_categories(
    root: &Path,
    categories: &[String],
    per_category: usize,
    seed: Option<u64>,
) -> MeshResult<Vec<GeneratedFile>> {
    let mut rng = make_rng(seed);
    let mut files = Vec::with_capacity(categories.len() * per_category);
    for category in categories {
        files.extend(generate_with_rng(&root.join(category), per_category, &mut rng)?);
    }
    Ok(files)
}
