//! Empty-ball geometry shared by ball pivoting and alpha shapes.

use nalgebra::{Point3, Vector3};

use crate::pointcloud::{PointCloud, PointIndex};

/// Relative slack on the squared radius when gathering candidates, so
/// points lying on the sphere are examined.
const QUERY_SLACK: f64 = 1.01;

/// Absolute slack below which a point counts as on, not inside, the sphere.
const SURFACE_TOLERANCE: f64 = 1e-9;

/// Center of the sphere of `radius` through `p0`, `p1`, `p2`, on the side
/// of the triangle plane that `side` points to.
///
/// Returns `None` for degenerate triangles and when the circumradius
/// exceeds `radius`.
pub(crate) fn ball_center(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    side: &Vector3<f64>,
    radius: f64,
) -> Option<Point3<f64>> {
    let (circumcenter, circumradius, plane_normal) = circumcircle(p0, p1, p2)?;

    if circumradius > radius {
        return None;
    }

    let h_sq = radius.mul_add(radius, -(circumradius * circumradius));
    let h = h_sq.max(0.0).sqrt();

    let direction = if plane_normal.dot(side) >= 0.0 {
        plane_normal
    } else {
        -plane_normal
    };

    Some(circumcenter + direction * h)
}

/// Circumcenter, circumradius and unit plane normal (right-hand rule on
/// p0, p1, p2).
fn circumcircle(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
) -> Option<(Point3<f64>, f64, Vector3<f64>)> {
    let a = p1 - p0;
    let b = p2 - p0;
    let axb = a.cross(&b);
    let axb_sq = axb.norm_squared();

    if axb_sq < 1e-20 {
        return None;
    }

    // Circumcenter offset from p0: (|a|^2 (b x (a x b)) + |b|^2 ((a x b) x a)) / (2 |a x b|^2)
    let offset = (b.cross(&axb) * a.norm_squared() + axb.cross(&a) * b.norm_squared())
        / (2.0 * axb_sq);

    let center = p0 + offset;
    Some((center, offset.norm(), axb / axb_sq.sqrt()))
}

/// True when no point other than `exclude` lies strictly inside the ball.
pub(crate) fn is_empty_ball(
    cloud: &PointCloud,
    index: &PointIndex,
    center: &Point3<f64>,
    radius: f64,
    exclude: &[usize],
) -> bool {
    let radius_sq = radius * radius;
    let threshold = radius_sq - SURFACE_TOLERANCE.max(radius_sq * 1e-9);

    let neighbors = index.within(center, radius_sq * QUERY_SLACK);

    neighbors.iter().all(|neighbor| {
        let idx = neighbor.item as usize;
        exclude.contains(&idx) || (cloud.points[idx].position - center).norm_squared() >= threshold
    })
}
