//! cloudmesh info command - display mesh statistics.

use std::path::Path;

use anyhow::{Context, Result};
use cloudmesh::validate::log_validation;
use cloudmesh::{MeshReport, load_mesh, validate_mesh};
use colored::Colorize;
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct MeshInfo {
    path: String,
    vertices: usize,
    faces: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<BoundsInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    surface_area: Option<f64>,
    has_normals: bool,
    is_watertight: bool,
    is_manifold: bool,
    boundary_edges: usize,
}

#[derive(Serialize)]
struct BoundsInfo {
    min: [f64; 3],
    max: [f64; 3],
    dimensions: [f64; 3],
}

impl MeshInfo {
    fn from_report(input: &Path, report: &MeshReport, detailed: bool) -> Self {
        let bounds = report.bounds.map(|(min, max)| {
            let dims = max - min;
            BoundsInfo {
                min: [min.x, min.y, min.z],
                max: [max.x, max.y, max.z],
                dimensions: [dims.x, dims.y, dims.z],
            }
        });

        Self {
            path: input.display().to_string(),
            vertices: report.vertex_count,
            faces: report.face_count,
            bounds,
            volume: detailed.then_some(report.signed_volume),
            surface_area: detailed.then_some(report.surface_area),
            has_normals: report.vertex_count > 0 && report.normal_count == report.vertex_count,
            is_watertight: report.is_watertight,
            is_manifold: report.is_manifold,
            boundary_edges: report.boundary_edge_count,
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

pub fn run(input: &Path, detailed: bool, cli: &Cli) -> Result<()> {
    let mesh = load_mesh(input).with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let report = validate_mesh(&mesh);
    log_validation(&report);
    let info = MeshInfo::from_report(input, &report, detailed);

    match cli.format {
        OutputFormat::Json => {
            output::print(&info, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Mesh Information".bold().underline());
                println!("  {}: {}", "File".cyan(), input.display());
                println!("  {}: {}", "Vertices".cyan(), info.vertices);
                println!("  {}: {}", "Faces".cyan(), info.faces);

                if let Some(ref b) = info.bounds {
                    println!(
                        "  {}: {:.3} x {:.3} x {:.3}",
                        "Dimensions".cyan(),
                        b.dimensions[0],
                        b.dimensions[1],
                        b.dimensions[2]
                    );
                    println!(
                        "  {}: ({:.3}, {:.3}, {:.3})",
                        "Min bounds".cyan(),
                        b.min[0],
                        b.min[1],
                        b.min[2]
                    );
                    println!(
                        "  {}: ({:.3}, {:.3}, {:.3})",
                        "Max bounds".cyan(),
                        b.max[0],
                        b.max[1],
                        b.max[2]
                    );
                }

                if let Some(vol) = info.volume {
                    println!("  {}: {:.4}", "Volume".cyan(), vol);
                }
                if let Some(area) = info.surface_area {
                    println!("  {}: {:.4}", "Surface area".cyan(), area);
                }

                println!("  {}: {}", "Has normals".cyan(), yes_no(info.has_normals));
                println!(
                    "  {}: {} (boundary edges: {})",
                    "Watertight".cyan(),
                    yes_no(info.is_watertight),
                    info.boundary_edges
                );
                println!("  {}: {}", "Manifold".cyan(), yes_no(info.is_manifold));
            }
        }
    }

    Ok(())
}
