//! Mesh file I/O for STL, OBJ, and PLY formats.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{debug, error, info};

use crate::error::{MeshError, MeshResult};
use crate::tracing_ext::log_io_operation;
use crate::validate::validate_candidate;
use crate::{Mesh, Vertex};

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Stl,
    Obj,
    Ply,
}

impl MeshFormat {
    /// Detect format from file extension, ignoring case.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Format for a bare extension such as `"stl"` or `"PLY"`.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "stl" => Some(MeshFormat::Stl),
            "obj" => Some(MeshFormat::Obj),
            "ply" => Some(MeshFormat::Ply),
            _ => None,
        }
    }

    /// Lowercase extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            MeshFormat::Stl => "stl",
            MeshFormat::Obj => "obj",
            MeshFormat::Ply => "ply",
        }
    }
}

fn format_for(path: &Path) -> MeshResult<MeshFormat> {
    MeshFormat::from_path(path).ok_or_else(|| {
        MeshError::unsupported_format(path.extension().and_then(|e| e.to_str()).map(String::from))
    })
}

/// Load a mesh from file, auto-detecting format from extension.
///
/// The result has passed [`validate_candidate`]: it has geometry, valid
/// indices and finite coordinates.
pub fn load_mesh(path: &Path) -> MeshResult<Mesh> {
    let format = format_for(path)?;

    info!("Loading mesh from {:?} (format: {:?})", path, format);

    let mesh = match format {
        MeshFormat::Stl => load_stl(path)?,
        MeshFormat::Obj => load_obj(path)?,
        MeshFormat::Ply => load_ply(path)?,
    };

    if let Some((min, max)) = mesh.bounds() {
        info!(
            "Loaded mesh: {} vertices, {} faces",
            mesh.vertex_count(),
            mesh.face_count()
        );
        debug!(
            "Bounding box: [{:.3}, {:.3}, {:.3}] to [{:.3}, {:.3}, {:.3}]",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
    }

    validate_candidate(&mesh)?;
    log_io_operation("load", path, Some(format.extension()), true);

    Ok(mesh)
}

/// Load mesh from STL file (binary or ASCII).
fn load_stl(path: &Path) -> MeshResult<Mesh> {
    let file = File::open(path).map_err(|e| MeshError::io_read(path, e))?;
    let mut reader = BufReader::new(file);

    // IndexedMesh: shared vertices plus indexed faces.
    let stl = stl_io::read_stl(&mut reader).map_err(|e| MeshError::parse_error(path, e.to_string()))?;

    let mut mesh = Mesh::with_capacity(stl.vertices.len(), stl.faces.len());
    for v in &stl.vertices {
        mesh.vertices
            .push(Vertex::from_coords(v.0[0] as f64, v.0[1] as f64, v.0[2] as f64));
    }

    for face in &stl.faces {
        let indices = [
            face.vertices[0] as u32,
            face.vertices[1] as u32,
            face.vertices[2] as u32,
        ];

        // Skip faces the reader collapsed
        if indices[0] != indices[1] && indices[1] != indices[2] && indices[0] != indices[2] {
            mesh.faces.push(indices);
        }
    }

    debug!(
        "STL loaded: {} vertices, {} faces",
        mesh.vertices.len(),
        mesh.faces.len()
    );

    Ok(mesh)
}

/// Load mesh from OBJ file, merging all models.
fn load_obj(path: &Path) -> MeshResult<Mesh> {
    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| MeshError::parse_error(path, e.to_string()))?;

    if models.is_empty() {
        return Err(MeshError::empty_mesh("OBJ file contains no models"));
    }

    let mut mesh = Mesh::new();
    let mut vertex_offset = 0u32;

    for model in &models {
        let obj_mesh = &model.mesh;

        for chunk in obj_mesh.positions.chunks_exact(3) {
            mesh.vertices.push(Vertex::from_coords(
                chunk[0] as f64,
                chunk[1] as f64,
                chunk[2] as f64,
            ));
        }

        // Indices are per-model.
        for chunk in obj_mesh.indices.chunks_exact(3) {
            mesh.faces.push([
                chunk[0] + vertex_offset,
                chunk[1] + vertex_offset,
                chunk[2] + vertex_offset,
            ]);
        }

        vertex_offset = mesh.vertices.len() as u32;
    }

    debug!(
        "OBJ loaded: {} vertices, {} faces from {} models",
        mesh.vertices.len(),
        mesh.faces.len(),
        models.len()
    );

    Ok(mesh)
}

/// Load mesh from PLY file (ASCII or binary).
///
/// Expects `vertex` elements with `x`, `y`, `z` properties and `face`
/// elements with a `vertex_indices` (or `vertex_index`) list. Polygons are
/// fan-triangulated.
fn load_ply(path: &Path) -> MeshResult<Mesh> {
    use ply_rs::parser::Parser;
    use ply_rs::ply::Property;

    let file = File::open(path).map_err(|e| MeshError::io_read(path, e))?;
    let mut reader = BufReader::new(file);

    let parser = Parser::<ply_rs::ply::DefaultElement>::new();
    let ply = parser
        .read_ply(&mut reader)
        .map_err(|e| MeshError::parse_error(path, format!("PLY parse error: {e}")))?;

    let mut mesh = Mesh::new();

    if let Some(vertices) = ply.payload.get("vertex") {
        for vertex_element in vertices {
            let x = get_ply_float(vertex_element.get("x"), "x", path)?;
            let y = get_ply_float(vertex_element.get("y"), "y", path)?;
            let z = get_ply_float(vertex_element.get("z"), "z", path)?;

            let mut vertex = Vertex::from_coords(x, y, z);
            if let (Ok(nx), Ok(ny), Ok(nz)) = (
                get_ply_float(vertex_element.get("nx"), "nx", path),
                get_ply_float(vertex_element.get("ny"), "ny", path),
                get_ply_float(vertex_element.get("nz"), "nz", path),
            ) {
                vertex.normal = Some(nalgebra::Vector3::new(nx, ny, nz));
            }

            mesh.vertices.push(vertex);
        }
    }

    if let Some(faces) = ply.payload.get("face") {
        for face_element in faces {
            let indices: Vec<u32> = match face_element
                .get("vertex_indices")
                .or_else(|| face_element.get("vertex_index"))
            {
                Some(Property::ListInt(v)) => v.iter().map(|&i| i as u32).collect(),
                Some(Property::ListUInt(v)) => v.clone(),
                Some(Property::ListUChar(v)) => v.iter().map(|&i| i as u32).collect(),
                Some(Property::ListUShort(v)) => v.iter().map(|&i| i as u32).collect(),
                _ => continue,
            };

            for i in 1..indices.len().saturating_sub(1) {
                mesh.faces.push([indices[0], indices[i], indices[i + 1]]);
            }
        }
    }

    debug!(
        "PLY loaded: {} vertices, {} faces",
        mesh.vertices.len(),
        mesh.faces.len()
    );

    Ok(mesh)
}

/// Helper to extract a float value from a PLY property.
fn get_ply_float(prop: Option<&ply_rs::ply::Property>, name: &str, path: &Path) -> MeshResult<f64> {
    use ply_rs::ply::Property;

    match prop {
        Some(Property::Float(v)) => Ok(*v as f64),
        Some(Property::Double(v)) => Ok(*v),
        Some(Property::Int(v)) => Ok(*v as f64),
        Some(Property::UInt(v)) => Ok(*v as f64),
        Some(Property::Short(v)) => Ok(*v as f64),
        Some(Property::UShort(v)) => Ok(*v as f64),
        Some(Property::Char(v)) => Ok(*v as f64),
        Some(Property::UChar(v)) => Ok(*v as f64),
        _ => Err(MeshError::parse_error(
            path,
            format!("Missing or invalid PLY property: {name}"),
        )),
    }
}

/// Save mesh to file, auto-detecting format from extension.
///
/// The extension is matched case-insensitively. Anything other than
/// `stl`, `obj` or `ply` is [`MeshError::UnsupportedFormat`].
pub fn save_mesh(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    let format = format_for(path)?;

    let result = match format {
        MeshFormat::Stl => save_stl(mesh, path),
        MeshFormat::Obj => save_obj(mesh, path),
        MeshFormat::Ply => save_ply(mesh, path),
    };
    log_io_operation("save", path, Some(format.extension()), result.is_ok());
    result
}

/// Save mesh, reporting success as a boolean.
///
/// Errors are logged, never returned.
pub fn write_mesh(mesh: &Mesh, path: &Path) -> bool {
    match save_mesh(mesh, path) {
        Ok(()) => true,
        Err(e) => {
            error!(path = %path.display(), code = %e.code(), "Failed to write mesh: {}", e);
            false
        }
    }
}

/// Save mesh to STL file (binary format).
///
/// Each facet carries its geometric normal; degenerate facets get a zero
/// normal.
pub fn save_stl(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    info!("Saving mesh to {:?}", path);

    let mut triangles: Vec<stl_io::Triangle> = Vec::with_capacity(mesh.face_count());
    for (face_idx, face) in mesh.faces.iter().enumerate() {
        let tri = mesh.triangle(face_idx).ok_or_else(|| {
            let bad = face
                .iter()
                .copied()
                .find(|&v| v as usize >= mesh.vertex_count())
                .unwrap_or(face[0]);
            MeshError::invalid_vertex_index(face_idx, bad, mesh.vertex_count())
        })?;
        let n = tri.normal().unwrap_or_else(nalgebra::Vector3::zeros);
        let [v0, v1, v2] = [tri.v0, tri.v1, tri.v2];

        triangles.push(stl_io::Triangle {
            normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
            vertices: [
                stl_io::Vertex::new([v0.x as f32, v0.y as f32, v0.z as f32]),
                stl_io::Vertex::new([v1.x as f32, v1.y as f32, v1.z as f32]),
                stl_io::Vertex::new([v2.x as f32, v2.y as f32, v2.z as f32]),
            ],
        });
    }

    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);

    stl_io::write_stl(&mut writer, triangles.iter()).map_err(|e| MeshError::io_write(path, e))?;
    writer.flush().map_err(|e| MeshError::io_write(path, e))?;

    info!("Saved {} triangles to {:?}", mesh.face_count(), path);

    Ok(())
}

/// Save mesh to OBJ file (ASCII format).
///
/// Vertex indices are preserved. Normals are written as `vn` lines when
/// any vertex has one.
pub fn save_obj(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    info!("Saving mesh to {:?} (OBJ format)", path);

    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);
    write_obj(mesh, &mut writer).map_err(|e| MeshError::io_write(path, e))?;

    info!(
        "Saved {} vertices and {} faces to {:?}",
        mesh.vertices.len(),
        mesh.faces.len(),
        path
    );

    Ok(())
}

fn write_obj(mesh: &Mesh, writer: &mut impl Write) -> std::io::Result<()> {
    writeln!(writer, "# OBJ file exported by cloudmesh")?;
    writeln!(writer, "# Vertices: {}", mesh.vertices.len())?;
    writeln!(writer, "# Faces: {}", mesh.faces.len())?;
    writeln!(writer)?;

    let has_normals = mesh.vertices.iter().any(|v| v.normal.is_some());

    for v in &mesh.vertices {
        writeln!(
            writer,
            "v {:.6} {:.6} {:.6}",
            v.position.x, v.position.y, v.position.z
        )?;
    }

    if has_normals {
        writeln!(writer)?;
        for v in &mesh.vertices {
            // Zero placeholder keeps normal indices aligned with vertices.
            let n = v.normal.unwrap_or_else(nalgebra::Vector3::zeros);
            writeln!(writer, "vn {:.6} {:.6} {:.6}", n.x, n.y, n.z)?;
        }
    }

    writeln!(writer)?;
    for face in &mesh.faces {
        // OBJ uses 1-based indexing
        let [i0, i1, i2] = face.map(|i| i + 1);
        if has_normals {
            writeln!(writer, "f {i0}//{i0} {i1}//{i1} {i2}//{i2}")?;
        } else {
            writeln!(writer, "f {i0} {i1} {i2}")?;
        }
    }

    writer.flush()
}

/// Save mesh to ASCII PLY file, with normals when present.
pub fn save_ply(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    use ply_rs::ply::{
        Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
        ScalarType,
    };
    use ply_rs::writer::Writer;

    info!("Saving mesh to {:?} (PLY ASCII format)", path);

    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;

    let has_normals = mesh.vertices.iter().any(|v| v.normal.is_some());

    let scalar = |name: &str| {
        PropertyDef::new(name.to_string(), PropertyType::Scalar(ScalarType::Float))
    };
    let mut vertex_def = ElementDef::new("vertex".to_string());
    vertex_def.properties.add(scalar("x"));
    vertex_def.properties.add(scalar("y"));
    vertex_def.properties.add(scalar("z"));
    if has_normals {
        vertex_def.properties.add(scalar("nx"));
        vertex_def.properties.add(scalar("ny"));
        vertex_def.properties.add(scalar("nz"));
    }
    vertex_def.count = mesh.vertices.len();
    ply.header.elements.add(vertex_def);

    let mut face_def = ElementDef::new("face".to_string());
    face_def.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::Int),
    ));
    face_def.count = mesh.faces.len();
    ply.header.elements.add(face_def);

    let mut vertices_payload: Vec<DefaultElement> = Vec::with_capacity(mesh.vertices.len());
    for v in &mesh.vertices {
        let mut element = DefaultElement::new();
        element.insert("x".to_string(), Property::Float(v.position.x as f32));
        element.insert("y".to_string(), Property::Float(v.position.y as f32));
        element.insert("z".to_string(), Property::Float(v.position.z as f32));
        if has_normals {
            let n = v.normal.unwrap_or_else(nalgebra::Vector3::zeros);
            element.insert("nx".to_string(), Property::Float(n.x as f32));
            element.insert("ny".to_string(), Property::Float(n.y as f32));
            element.insert("nz".to_string(), Property::Float(n.z as f32));
        }
        vertices_payload.push(element);
    }
    ply.payload.insert("vertex".to_string(), vertices_payload);

    let mut faces_payload: Vec<DefaultElement> = Vec::with_capacity(mesh.faces.len());
    for face in &mesh.faces {
        let mut element = DefaultElement::new();
        element.insert(
            "vertex_indices".to_string(),
            Property::ListInt(face.iter().map(|&i| i as i32).collect()),
        );
        faces_payload.push(element);
    }
    ply.payload.insert("face".to_string(), faces_payload);

    // Header counts must match payload.
    ply.make_consistent().map_err(|e| {
        MeshError::io_write(
            path,
            std::io::Error::other(format!("PLY consistency error: {e:?}")),
        )
    })?;

    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);

    Writer::new()
        .write_ply(&mut writer, &mut ply)
        .map_err(|e| MeshError::io_write(path, e))?;
    writer.flush().map_err(|e| MeshError::io_write(path, e))?;

    info!(
        "Saved {} vertices and {} faces to {:?} (PLY ASCII)",
        mesh.vertices.len(),
        mesh.faces.len(),
        path
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn tetrahedron() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(10.0, 0.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 10.0, 0.0));
        mesh.vertices.push(Vertex::from_coords(0.0, 0.0, 10.0));
        mesh.faces.push([0, 2, 1]);
        mesh.faces.push([0, 1, 3]);
        mesh.faces.push([0, 3, 2]);
        mesh.faces.push([1, 2, 3]);
        mesh
    }

    fn create_test_stl() -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".stl").unwrap();

        writeln!(file, "solid test").unwrap();
        writeln!(file, "  facet normal 0 0 1").unwrap();
        writeln!(file, "    outer loop").unwrap();
        writeln!(file, "      vertex 0 0 0").unwrap();
        writeln!(file, "      vertex 100 0 0").unwrap();
        writeln!(file, "      vertex 0 100 0").unwrap();
        writeln!(file, "    endloop").unwrap();
        writeln!(file, "  endfacet").unwrap();
        writeln!(file, "endsolid test").unwrap();

        file
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            MeshFormat::from_path(Path::new("test.stl")),
            Some(MeshFormat::Stl)
        );
        assert_eq!(
            MeshFormat::from_path(Path::new("test.STL")),
            Some(MeshFormat::Stl)
        );
        assert_eq!(
            MeshFormat::from_path(Path::new("test.obj")),
            Some(MeshFormat::Obj)
        );
        assert_eq!(
            MeshFormat::from_path(Path::new("test.PLY")),
            Some(MeshFormat::Ply)
        );
        assert_eq!(MeshFormat::from_path(Path::new("test.xyz")), None);
        assert_eq!(MeshFormat::from_path(Path::new("no_extension")), None);
    }

    #[test]
    fn test_load_stl() {
        let file = create_test_stl();
        let mesh = load_mesh(file.path()).expect("should load");

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.face_count(), 1);

        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(100.0, 100.0, 0.0));
    }

    #[test]
    fn test_save_and_reload_stl() {
        let mesh = tetrahedron();
        let file = NamedTempFile::with_suffix(".stl").unwrap();
        save_mesh(&mesh, file.path()).expect("should save");

        let reloaded = load_mesh(file.path()).expect("should reload");
        assert_eq!(reloaded.vertex_count(), 4);
        assert_eq!(reloaded.face_count(), 4);
        approx::assert_relative_eq!(
            reloaded.signed_volume(),
            mesh.signed_volume(),
            epsilon = 1e-3
        );
    }

    #[test]
    fn test_stl_facets_carry_normals() {
        let mesh = tetrahedron();
        let file = NamedTempFile::with_suffix(".stl").unwrap();
        save_stl(&mesh, file.path()).unwrap();

        let mut reader = BufReader::new(File::open(file.path()).unwrap());
        let triangles: Vec<stl_io::Triangle> = stl_io::create_stl_reader(&mut reader)
            .unwrap()
            .map(|t| t.unwrap())
            .collect();
        assert_eq!(triangles.len(), 4);
        // First face [0, 2, 1] lies in z = 0, wound downward.
        let n = triangles[0].normal;
        approx::assert_relative_eq!(n.0[2], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_save_and_reload_obj() {
        let mut mesh = tetrahedron();
        crate::repair::compute_vertex_normals(&mut mesh);

        let file = NamedTempFile::with_suffix(".obj").unwrap();
        save_mesh(&mesh, file.path()).expect("should save OBJ");
        let reloaded = load_mesh(file.path()).expect("should reload OBJ");

        // The loader may renumber vertices; geometry must survive.
        assert_eq!(reloaded.vertex_count(), 4);
        assert_eq!(reloaded.face_count(), 4);
        approx::assert_relative_eq!(
            reloaded.signed_volume(),
            mesh.signed_volume(),
            epsilon = 1e-3
        );
    }

    #[test]
    fn test_save_and_reload_ply() {
        let mut mesh = tetrahedron();
        crate::repair::compute_vertex_normals(&mut mesh);

        let file = NamedTempFile::with_suffix(".ply").unwrap();
        save_mesh(&mesh, file.path()).expect("should save PLY");
        let reloaded = load_mesh(file.path()).expect("should reload PLY");

        assert_eq!(reloaded.faces, mesh.faces);
        for (orig, loaded) in mesh.vertices.iter().zip(&reloaded.vertices) {
            assert!((orig.position - loaded.position).norm() < 1e-5);
            let diff = (orig.normal.unwrap() - loaded.normal.unwrap()).norm();
            assert!(diff < 1e-5);
        }
    }

    #[test]
    fn test_save_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let err = save_mesh(&tetrahedron(), &dir.path().join("out.xyz")).unwrap_err();
        assert!(matches!(
            err,
            MeshError::UnsupportedFormat { extension: Some(ref e) } if e == "xyz"
        ));
    }

    #[test]
    fn test_save_uppercase_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("OUT.STL");
        save_mesh(&tetrahedron(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_write_mesh_reports_failure() {
        let dir = TempDir::new().unwrap();
        let mesh = tetrahedron();

        assert!(write_mesh(&mesh, &dir.path().join("ok.stl")));
        // Parent directory does not exist.
        assert!(!write_mesh(&mesh, &dir.path().join("missing/out.stl")));
        assert!(!write_mesh(&mesh, &dir.path().join("out.unknown")));
    }

    #[test]
    fn test_save_rejects_bad_index() {
        let mut mesh = tetrahedron();
        mesh.faces.push([0, 1, 42]);
        let file = NamedTempFile::with_suffix(".stl").unwrap();
        let err = save_stl(&mesh, file.path()).unwrap_err();
        assert!(matches!(
            err,
            MeshError::InvalidVertexIndex {
                vertex_index: 42,
                ..
            }
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_mesh(&dir.path().join("absent.stl")).unwrap_err();
        assert!(matches!(err, MeshError::IoRead { .. }));
    }
}
