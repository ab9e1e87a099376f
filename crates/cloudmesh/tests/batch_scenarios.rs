//! End-to-end batch conversion tests.
//!
//! Each test lays out point samples in a temporary directory, runs the batch
//! runner over it and checks both the returned report and the files written.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cloudmesh::npy::{NpyArray, write_npy};
use cloudmesh::{
    AlphaShapeParams, BatchRunner, CategoryOutcome, CloudPoint, CloudmeshConfig,
    DirectorySelection, ErrorCode, FileOutcome, PipelineStage, PointCloud, PoissonParams,
    ProgressCallback, RunnerConfig, Strategy, load_mesh, save_point_sample, validate_mesh,
};
use nalgebra::{Point3, Vector3};
use tempfile::TempDir;

// =============================================================================
// Fixtures
// =============================================================================

/// Points on a sphere with outward normals, evenly spread.
fn sphere_cloud(n: usize, radius: f64) -> PointCloud {
    let golden = std::f64::consts::PI * (3.0 - 5f64.sqrt());
    let mut cloud = PointCloud::with_capacity(n);
    for i in 0..n {
        let y = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
        let r = (1.0 - y * y).sqrt();
        let theta = golden * i as f64;
        let dir = Vector3::new(r * theta.cos(), y, r * theta.sin());
        cloud.push(CloudPoint::with_normal(Point3::from(dir * radius), dir));
    }
    cloud
}

fn write_sphere(path: &Path, n: usize) {
    save_point_sample(&sphere_cloud(n, 1.0), path).unwrap();
}

/// A 2-D sample with too few columns.
fn write_two_columns(path: &Path, rows: usize) {
    let data = (0..rows * 2).map(|i| i as f64 * 0.01).collect();
    write_npy(&NpyArray::from_rows(rows, 2, data).unwrap(), path).unwrap();
}

fn poisson_runner() -> BatchRunner {
    BatchRunner::new(RunnerConfig::new(Strategy::Poisson(PoissonParams::default()))).unwrap()
}

fn alpha_runner() -> BatchRunner {
    BatchRunner::new(RunnerConfig::new(Strategy::AlphaShape(AlphaShapeParams::new(
        0.5,
    ))))
    .unwrap()
}

fn failure_of(outcome: &FileOutcome) -> (PipelineStage, ErrorCode, &str) {
    match outcome {
        FileOutcome::Failed {
            stage,
            code,
            reason,
        } => (*stage, *code, reason.as_str()),
        other => panic!("expected a failure, got {other:?}"),
    }
}

// =============================================================================
// Reference scenarios
// =============================================================================

#[test]
fn sphere_with_normals_reconstructs_with_poisson() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    fs::create_dir(&input).unwrap();
    write_sphere(&input.join("sphere.npy"), 2000);

    let result = poisson_runner().run_directory(&input, &output).unwrap();

    assert_eq!(result.total_considered, 1);
    assert_eq!(result.succeeded, 1);
    assert!(result.is_success());

    let mesh = load_mesh(&output.join("sphere.stl")).unwrap();
    assert!(mesh.vertex_count() > 0);
    assert!(mesh.face_count() > 0);
    let report = validate_mesh(&mesh);
    assert!(report.is_valid());
    assert!(report.signed_volume > 0.0);
}

#[test]
fn two_column_sample_is_a_format_failure() {
    let dir = TempDir::new().unwrap();
    write_two_columns(&dir.path().join("flat.npy"), 500);

    let result = poisson_runner()
        .run_directory(dir.path(), &dir.path().join("out"))
        .unwrap();

    assert_eq!(result.total_considered, 1);
    assert_eq!(result.succeeded, 0);
    assert_eq!(result.failed(), 1);
    let (stage, code, _) = failure_of(&result.entries[0].outcome);
    assert_eq!(stage, PipelineStage::Load);
    assert_eq!(code, ErrorCode::TooFewColumns);
    assert!(!dir.path().join("out/flat.stl").exists());
}

#[test]
fn empty_sample_is_rejected_by_validation() {
    let strategies = [
        Strategy::Poisson(PoissonParams::default()),
        Strategy::AlphaShape(AlphaShapeParams::new(0.5)),
        Strategy::BallPivoting(cloudmesh::BallPivotingParams::new(0.5)),
    ];

    for strategy in strategies {
        let dir = TempDir::new().unwrap();
        let empty = NpyArray {
            shape: vec![0, 3],
            data: Vec::new(),
        };
        write_npy(&empty, &dir.path().join("empty.npy")).unwrap();

        let runner = BatchRunner::new(RunnerConfig::new(strategy)).unwrap();
        let result = runner
            .run_directory(dir.path(), &dir.path().join("out"))
            .unwrap();

        assert_eq!(result.total_considered, 1);
        assert_eq!(result.succeeded, 0);
        let (stage, code, reason) = failure_of(&result.entries[0].outcome);
        assert_eq!(stage, PipelineStage::Validate);
        assert_eq!(code, ErrorCode::EmptyMesh);
        assert!(reason.contains("empty"), "reason was {reason}");
    }
}

#[test]
fn mixed_directory_reports_each_failure() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    fs::create_dir(&input).unwrap();

    for name in ["a.npy", "b.npy", "c.npy"] {
        write_sphere(&input.join(name), 300);
    }
    write_two_columns(&input.join("narrow.npy"), 40);
    fs::write(input.join("garbage.npy"), b"definitely not numpy").unwrap();

    let output = dir.path().join("out");
    let result = poisson_runner().run_directory(&input, &output).unwrap();

    assert_eq!(result.total_considered, 5);
    assert_eq!(result.succeeded, 3);
    assert_eq!(result.failed(), 2);

    let mut failed: Vec<(&str, ErrorCode)> = result
        .failures()
        .map(|e| (e.identifier.as_str(), failure_of(&e.outcome).1))
        .collect();
    failed.sort_by_key(|(name, _)| *name);
    assert_eq!(
        failed,
        vec![
            ("garbage.npy", ErrorCode::ParseError),
            ("narrow.npy", ErrorCode::TooFewColumns),
        ]
    );

    for stem in ["a", "b", "c"] {
        assert!(output.join(format!("{stem}.stl")).is_file());
    }
}

#[test]
fn unknown_method_refuses_the_batch() {
    let dir = TempDir::new().unwrap();
    write_sphere(&dir.path().join("sphere.npy"), 200);

    let mut config = CloudmeshConfig::default();
    config.reconstruction.method = "unsupported_method".to_string();
    config.batch.input_root = dir.path().to_path_buf();
    config.batch.output_root = dir.path().join("out");

    let err = config.validate().unwrap_err();
    assert_eq!(err.code(), ErrorCode::Configuration);
    assert!(err.is_batch_fatal());
    assert!(!dir.path().join("out").exists());
}

// =============================================================================
// Robustness
// =============================================================================

#[test]
fn malformed_files_never_abort_the_batch() {
    let dir = TempDir::new().unwrap();
    let n = 7;
    let k = 3;
    for i in 0..n {
        let path = dir.path().join(format!("sample_{i}.npy"));
        if i < k {
            write_two_columns(&path, 10 + i);
        } else {
            write_sphere(&path, 150);
        }
    }

    let result = alpha_runner()
        .run_directory(dir.path(), &dir.path().join("out"))
        .unwrap();

    assert_eq!(result.total_considered, n);
    assert!(result.succeeded <= n - k);
    let format_failures = result
        .failures()
        .filter(|e| failure_of(&e.outcome).1 == ErrorCode::TooFewColumns)
        .count();
    assert_eq!(format_failures, k);
}

#[test]
fn uppercase_extension_is_eligible_by_default() {
    let dir = TempDir::new().unwrap();
    write_sphere(&dir.path().join("Loud.NPY"), 200);
    fs::write(dir.path().join("notes.txt"), "not a sample").unwrap();

    let result = alpha_runner()
        .run_directory(dir.path(), &dir.path().join("out"))
        .unwrap();
    assert_eq!(result.total_considered, 1);
    assert!(dir.path().join("out/Loud.stl").is_file());

    let mut config = RunnerConfig::new(Strategy::AlphaShape(AlphaShapeParams::new(0.5)));
    config.case_sensitive_extensions = true;
    let strict = BatchRunner::new(config)
        .unwrap()
        .run_directory(dir.path(), &dir.path().join("strict"))
        .unwrap();
    assert_eq!(strict.total_considered, 0);
    assert!(strict.is_success());
}

#[test]
fn output_extension_selects_format() {
    let dir = TempDir::new().unwrap();
    write_sphere(&dir.path().join("ball.npy"), 200);

    let mut config = RunnerConfig::new(Strategy::AlphaShape(AlphaShapeParams::new(0.5)));
    config.output_extension = "ply".to_string();
    let result = BatchRunner::new(config)
        .unwrap()
        .run_directory(dir.path(), &dir.path().join("out"))
        .unwrap();

    assert!(result.is_success());
    let mesh = load_mesh(&dir.path().join("out/ball.ply")).unwrap();
    assert_eq!(mesh.normal_count(), mesh.vertex_count());
}

// =============================================================================
// Directory selection
// =============================================================================

#[test]
fn all_categories_mirror_layout_and_tolerate_missing() {
    let dir = TempDir::new().unwrap();
    let input_root = dir.path().join("pointcloud");
    let output_root = dir.path().join("raw");
    fs::create_dir_all(input_root.join("feet")).unwrap();
    write_sphere(&input_root.join("feet/left.npy"), 200);

    let report = alpha_runner()
        .run(&DirectorySelection::AllCategories, &input_root, &output_root)
        .unwrap();

    assert_eq!(report.categories.len(), 2);
    assert_eq!(report.categories[0].category.as_deref(), Some("feet"));
    assert!(matches!(
        report.categories[1].outcome,
        CategoryOutcome::Missing { .. }
    ));
    assert_eq!(report.warnings().count(), 1);
    assert_eq!(report.total_considered(), 1);
    assert_eq!(report.succeeded(), 1);
    assert!(report.is_success());
    assert!(output_root.join("feet/left.stl").is_file());
}

#[test]
fn single_category_requires_its_directory() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("feet")).unwrap();

    let err = alpha_runner()
        .run(
            &DirectorySelection::Category("insoles".to_string()),
            dir.path(),
            &dir.path().join("out"),
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Structural);

    let report = alpha_runner()
        .run(
            &DirectorySelection::Category("feet".to_string()),
            dir.path(),
            &dir.path().join("out"),
        )
        .unwrap();
    assert_eq!(report.total_considered(), 0);
}

#[test]
fn main_dir_only_ignores_category_subdirectories() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("feet")).unwrap();
    write_sphere(&dir.path().join("top.npy"), 200);
    write_sphere(&dir.path().join("feet/nested.npy"), 200);

    let out = dir.path().join("out");
    let report = alpha_runner()
        .run(&DirectorySelection::MainDirOnly, dir.path(), &out)
        .unwrap();

    assert_eq!(report.categories.len(), 1);
    assert_eq!(report.categories[0].category, None);
    assert_eq!(report.total_considered(), 1);
    assert!(out.join("top.stl").is_file());
    assert!(!out.join("feet").exists());
}

// =============================================================================
// Cancellation
// =============================================================================

#[test]
fn progress_callback_can_stop_the_run() {
    let dir = TempDir::new().unwrap();
    for name in ["a.npy", "b.npy", "c.npy"] {
        write_sphere(&dir.path().join(name), 150);
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let callback: ProgressCallback = Box::new(move |progress| {
        seen.fetch_add(1, Ordering::SeqCst);
        progress.current < 1
    });

    let result = alpha_runner()
        .with_progress(callback)
        .run_directory(dir.path(), &dir.path().join("out"))
        .unwrap();

    assert!(result.cancelled);
    assert!(!result.is_success());
    assert_eq!(result.total_considered, 3);
    assert_eq!(result.entries.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn report_serializes_to_json() {
    let dir = TempDir::new().unwrap();
    write_two_columns(&dir.path().join("bad.npy"), 5);

    let result = alpha_runner()
        .run_directory(dir.path(), &dir.path().join("out"))
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["total_considered"], 1);
    assert_eq!(json["entries"][0]["identifier"], "bad.npy");
    assert_eq!(json["entries"][0]["outcome"]["status"], "failed");
    assert_eq!(json["entries"][0]["outcome"]["stage"], "load");
    assert_eq!(json["entries"][0]["outcome"]["code"], "CM-4002");
}
