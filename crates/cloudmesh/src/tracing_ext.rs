//! Tracing extensions for reconstruction and batch operations.
//!
//! The library only emits events; installing a subscriber is up to the
//! caller. The CLI installs a compact `tracing-subscriber` formatter on
//! stderr driven by `RUST_LOG`:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // RUST_LOG=cloudmesh=debug for per-stage output,
//! // RUST_LOG=cloudmesh::timing=info for stage timings only.
//! ```
//!
//! # Log Levels
//!
//! - **ERROR**: Per-file failures in a batch
//! - **WARN**: Skipped files, missing category directories
//! - **INFO**: Stage summaries, timing
//! - **DEBUG**: Intermediate counts and grid sizes
//! - **TRACE**: Per-seed and per-edge detail

use std::path::Path;
use std::time::Instant;
use tracing::span::EnteredSpan;
use tracing::{debug, info, warn};

/// A performance timer that logs duration on drop.
///
/// # Example
///
/// ```rust,ignore
/// use cloudmesh::tracing_ext::OperationTimer;
///
/// fn expensive_operation() {
///     let _timer = OperationTimer::new("expensive_operation");
///     // ... do work ...
/// } // Timer logs duration when dropped
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    /// Events logged while the timer lives nest under this span.
    _span: EnteredSpan,
}

impl OperationTimer {
    /// Create a new operation timer.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("cloudmesh_operation", operation = name).entered();
        debug!(target: "cloudmesh::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            _span: span,
        }
    }

    /// Create a timer with mesh size fields attached.
    pub fn with_context(name: &'static str, face_count: usize, vertex_count: usize) -> Self {
        let span = tracing::info_span!(
            "cloudmesh_operation",
            operation = name,
            faces = face_count,
            vertices = vertex_count
        )
        .entered();
        debug!(
            target: "cloudmesh::timing",
            operation = name,
            faces = face_count,
            vertices = vertex_count,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            _span: span,
        }
    }

    /// Get the elapsed time.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        info!(
            target: "cloudmesh::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Operation completed"
        );
    }
}

/// Log mesh statistics at debug level.
pub fn log_mesh_stats(mesh: &crate::Mesh, context: &str) {
    let (min_bounds, max_bounds) = mesh.bounds().unwrap_or_default();
    let dims = max_bounds - min_bounds;

    debug!(
        target: "cloudmesh::mesh_state",
        context = context,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        dimensions = format!("{:.2} x {:.2} x {:.2}", dims.x, dims.y, dims.z),
        "Mesh state"
    );
}

/// Log progress through a batch.
pub fn log_progress(operation: &str, current: usize, total: usize, stage: Option<&str>) {
    let percent = if total > 0 {
        (current as f64 / total as f64 * 100.0) as u32
    } else {
        0
    };

    debug!(
        target: "cloudmesh::progress",
        operation = operation,
        current = current,
        total = total,
        percent = percent,
        stage = stage.unwrap_or("processing"),
        "Progress update"
    );
}

/// Log a file I/O operation.
pub fn log_io_operation(operation: &str, path: &Path, format: Option<&str>, success: bool) {
    if success {
        debug!(
            target: "cloudmesh::io",
            operation = operation,
            path = path.display().to_string(),
            format = format.unwrap_or("auto"),
            "I/O operation completed"
        );
    } else {
        warn!(
            target: "cloudmesh::io",
            operation = operation,
            path = path.display().to_string(),
            format = format.unwrap_or("auto"),
            "I/O operation failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Mesh, Vertex};

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_operation");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_log_helpers_accept_empty_input() {
        log_mesh_stats(&Mesh::new(), "empty");
        log_progress("batch", 0, 0, None);

        let mut mesh = Mesh::new();
        mesh.vertices.push(Vertex::from_coords(1.0, 2.0, 3.0));
        log_mesh_stats(&mesh, "single");
        log_io_operation("write", Path::new("out.stl"), Some("stl"), false);
    }
}
