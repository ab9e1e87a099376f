//! Mesh to point sample correspondence checks.
//!
//! Compares the mesh stems under `<mesh_root>/<category>` with the sample
//! stems under `<cloud_root>/<category>` and lists the meshes that have not
//! been sampled yet. Absent directories are reported, never raised.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::batch::has_extension;
use crate::io::MeshFormat;

/// Correspondence for one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryAudit {
    pub category: String,
    pub mesh_dir: PathBuf,
    pub cloud_dir: PathBuf,
    pub mesh_dir_exists: bool,
    pub cloud_dir_exists: bool,
    /// Sorted stems of mesh files.
    pub mesh_stems: Vec<String>,
    /// Sorted stems of `.npy` files.
    pub cloud_stems: Vec<String>,
    /// Mesh stems with a matching sample.
    pub converted: Vec<String>,
    /// Mesh stems without a matching sample.
    pub missing: Vec<String>,
}

impl CategoryAudit {
    pub fn is_complete(&self) -> bool {
        self.mesh_dir_exists && self.cloud_dir_exists && self.missing.is_empty()
    }
}

/// Correspondence for every audited category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditReport {
    pub categories: Vec<CategoryAudit>,
}

impl AuditReport {
    pub fn is_complete(&self) -> bool {
        self.categories.iter().all(CategoryAudit::is_complete)
    }

    pub fn missing_count(&self) -> usize {
        self.categories.iter().map(|c| c.missing.len()).sum()
    }
}

/// Stems of regular files in `dir` accepted by `accepts`, or `None` when
/// `dir` cannot be listed.
fn collect_stems(dir: &Path, accepts: impl Fn(&Path) -> bool) -> Option<BTreeSet<String>> {
    let listing = match fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) => {
            debug!(dir = %dir.display(), "Cannot list directory: {}", e);
            return None;
        }
    };

    let stems = listing
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && accepts(path))
        .filter_map(|path| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .collect();
    Some(stems)
}

/// Compare one mesh directory with one sample directory.
pub fn audit_category(category: &str, mesh_dir: &Path, cloud_dir: &Path) -> CategoryAudit {
    let meshes = collect_stems(mesh_dir, |p| MeshFormat::from_path(p).is_some());
    let clouds = collect_stems(cloud_dir, |p| has_extension(p, "npy", true));

    let mesh_dir_exists = meshes.is_some();
    let cloud_dir_exists = clouds.is_some();
    if !mesh_dir_exists {
        warn!(category, dir = %mesh_dir.display(), "Mesh directory does not exist");
    }
    if !cloud_dir_exists {
        warn!(category, dir = %cloud_dir.display(), "Point sample directory does not exist");
    }

    let meshes = meshes.unwrap_or_default();
    let clouds = clouds.unwrap_or_default();
    let (converted, missing): (Vec<String>, Vec<String>) =
        meshes.iter().cloned().partition(|stem| clouds.contains(stem));

    info!(
        category,
        meshes = meshes.len(),
        samples = clouds.len(),
        converted = converted.len(),
        missing = missing.len(),
        "Audited category"
    );

    CategoryAudit {
        category: category.to_string(),
        mesh_dir: mesh_dir.to_path_buf(),
        cloud_dir: cloud_dir.to_path_buf(),
        mesh_dir_exists,
        cloud_dir_exists,
        mesh_stems: meshes.into_iter().collect(),
        cloud_stems: clouds.into_iter().collect(),
        converted,
        missing,
    }
}

/// Audit each category below the two roots.
pub fn audit(mesh_root: &Path, cloud_root: &Path, categories: &[String]) -> AuditReport {
    AuditReport {
        categories: categories
            .iter()
            .map(|c| audit_category(c, &mesh_root.join(c), &cloud_root.join(c)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_audit_category_partitions_stems() {
        let dir = TempDir::new().unwrap();
        let meshes = dir.path().join("raw");
        let clouds = dir.path().join("clouds");
        fs::create_dir_all(&meshes).unwrap();
        fs::create_dir_all(&clouds).unwrap();

        touch(&meshes.join("b.stl"));
        touch(&meshes.join("a.STL"));
        touch(&meshes.join("c.obj"));
        touch(&meshes.join("readme.txt"));
        touch(&clouds.join("a.npy"));
        touch(&clouds.join("orphan.npy"));

        let audit = audit_category("feet", &meshes, &clouds);
        assert_eq!(audit.mesh_stems, vec!["a", "b", "c"]);
        assert_eq!(audit.cloud_stems, vec!["a", "orphan"]);
        assert_eq!(audit.converted, vec!["a"]);
        assert_eq!(audit.missing, vec!["b", "c"]);
        assert!(!audit.is_complete());
    }

    #[test]
    fn test_missing_directories_are_reported() {
        let dir = TempDir::new().unwrap();
        let categories = vec!["feet".to_string(), "insoles".to_string()];
        fs::create_dir_all(dir.path().join("raw/feet")).unwrap();
        touch(&dir.path().join("raw/feet/x.stl"));

        let report = audit(&dir.path().join("raw"), &dir.path().join("clouds"), &categories);
        assert_eq!(report.categories.len(), 2);

        let feet = &report.categories[0];
        assert!(feet.mesh_dir_exists);
        assert!(!feet.cloud_dir_exists);
        assert_eq!(feet.missing, vec!["x"]);

        let insoles = &report.categories[1];
        assert!(!insoles.mesh_dir_exists);
        assert!(insoles.mesh_stems.is_empty());
        assert_eq!(report.missing_count(), 1);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_complete_audit() {
        let dir = TempDir::new().unwrap();
        let meshes = dir.path().join("m");
        let clouds = dir.path().join("c");
        fs::create_dir_all(&meshes).unwrap();
        fs::create_dir_all(&clouds).unwrap();
        touch(&meshes.join("shape.ply"));
        touch(&clouds.join("shape.npy"));

        assert!(audit_category("feet", &meshes, &clouds).is_complete());
    }
}
