//! Ball pivoting reconstruction.
//!
//! A ball of radius `r` is placed on three points so that no other point
//! falls inside it, forming a seed triangle. The ball is then rolled
//! ("pivoted") over each boundary edge of the growing surface until it
//! touches a new point, which closes the next triangle. When the front is
//! exhausted a new seed is looked for among the points not yet touched.
//!
//! The radius schedule is `[r, 2r, 4r]`. Each larger ball first re-pivots
//! the edges the previous ball left open, then seeds from the remaining
//! untouched points, so coarse passes fill gaps the fine pass left.
//!
//! Orientation follows the point normals: every emitted triangle's normal
//! agrees with the mean normal of its corners, and the ball sits on that
//! side of the triangle.

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ball::{ball_center, is_empty_ball};
use super::{ReconstructionResult, StrategyDetails, ensure_normals, vertices_from_cloud};
use crate::error::MeshResult;
use crate::pointcloud::{PointCloud, PointIndex};
use crate::types::Mesh;

/// Multipliers applied to the base radius, in the order they are tried.
pub const RADIUS_MULTIPLIERS: [f64; 3] = [1.0, 2.0, 4.0];

/// Nearest neighbours considered per seed vertex.
const SEED_NEIGHBORS: usize = 24;

/// Parameters for ball pivoting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallPivotingParams {
    /// Base ball radius; the radii tried are `radius * [1, 2, 4]`.
    pub radius: f64,
    /// Neighbours used for PCA when the cloud has no normals.
    pub normal_neighbors: usize,
}

impl Default for BallPivotingParams {
    fn default() -> Self {
        Self {
            radius: 0.1,
            normal_neighbors: 16,
        }
    }
}

impl BallPivotingParams {
    /// Parameters with the given base radius.
    pub fn new(radius: f64) -> Self {
        Self {
            radius,
            ..Self::default()
        }
    }

    /// Radii tried, in ascending order.
    pub fn radii(&self) -> Vec<f64> {
        RADIUS_MULTIPLIERS.iter().map(|m| m * self.radius).collect()
    }
}

/// Undirected edge key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Edge(u32, u32);

impl Edge {
    fn new(a: u32, b: u32) -> Self {
        if a < b { Self(a, b) } else { Self(b, a) }
    }
}

/// A directed boundary edge `a -> b` of triangle `(a, b, opposite)`.
#[derive(Debug, Clone, Copy)]
struct FrontEdge {
    a: u32,
    b: u32,
    opposite: u32,
}

struct Pivoter<'a> {
    cloud: &'a PointCloud,
    index: PointIndex,
    faces: Vec<[u32; 3]>,
    face_keys: HashSet<[u32; 3]>,
    edge_use: HashMap<Edge, u8>,
    used: Vec<bool>,
    front: VecDeque<FrontEdge>,
    /// Edges the current radius could not pivot over.
    boundary: Vec<FrontEdge>,
}

/// Reconstruct with ball pivoting over `params.radii()`.
pub(crate) fn reconstruct(
    cloud: &PointCloud,
    params: &BallPivotingParams,
) -> MeshResult<ReconstructionResult> {
    let (cloud, normals_estimated) = ensure_normals(cloud, params.normal_neighbors);
    let radii = params.radii();

    let mut pivoter = Pivoter::new(&cloud);
    for (pass, &radius) in radii.iter().enumerate() {
        if pass > 0 {
            pivoter.reopen_boundary();
        }
        pivoter.expand(radius);
        pivoter.seed_and_expand(radius);

        debug!(
            radius,
            faces = pivoter.faces.len(),
            open_edges = pivoter.boundary.len(),
            "Ball pivoting pass complete"
        );
    }

    let unused_points = pivoter.used.iter().filter(|u| !**u).count();
    let mesh = Mesh {
        vertices: vertices_from_cloud(&cloud),
        faces: pivoter.faces,
    };

    Ok(ReconstructionResult::from_mesh(
        mesh,
        normals_estimated,
        StrategyDetails::BallPivoting {
            radii,
            unused_points,
        },
    ))
}

impl<'a> Pivoter<'a> {
    fn new(cloud: &'a PointCloud) -> Self {
        Self {
            cloud,
            index: PointIndex::new(cloud),
            faces: Vec::new(),
            face_keys: HashSet::new(),
            edge_use: HashMap::new(),
            used: vec![false; cloud.len()],
            front: VecDeque::new(),
            boundary: Vec::new(),
        }
    }

    fn position(&self, i: u32) -> Point3<f64> {
        self.cloud.points[i as usize].position
    }

    fn normal(&self, i: u32) -> Vector3<f64> {
        self.cloud.points[i as usize]
            .normal
            .unwrap_or_else(Vector3::z)
    }

    fn mean_normal(&self, tri: [u32; 3]) -> Vector3<f64> {
        self.normal(tri[0]) + self.normal(tri[1]) + self.normal(tri[2])
    }

    fn edge_count(&self, a: u32, b: u32) -> u8 {
        self.edge_use.get(&Edge::new(a, b)).copied().unwrap_or(0)
    }

    fn reopen_boundary(&mut self) {
        let open: Vec<FrontEdge> = self
            .boundary
            .drain(..)
            .filter(|e| self.edge_use.get(&Edge::new(e.a, e.b)).copied() == Some(1))
            .collect();
        self.front.extend(open);
    }

    /// Whether `tri` can be added without duplicating a face or giving an
    /// edge a third face.
    fn can_add(&self, tri: [u32; 3]) -> bool {
        let mut key = tri;
        key.sort_unstable();
        !self.face_keys.contains(&key)
            && self.edge_count(tri[0], tri[1]) < 2
            && self.edge_count(tri[1], tri[2]) < 2
            && self.edge_count(tri[2], tri[0]) < 2
    }

    /// Add `tri` and push its edges that are still open onto the front.
    fn add_triangle(&mut self, tri: [u32; 3]) {
        let mut key = tri;
        key.sort_unstable();
        self.face_keys.insert(key);
        self.faces.push(tri);

        for k in 0..3 {
            self.used[tri[k] as usize] = true;
            let (a, b, opposite) = (tri[k], tri[(k + 1) % 3], tri[(k + 2) % 3]);
            let count = self.edge_use.entry(Edge::new(a, b)).or_insert(0);
            *count += 1;
            if *count == 1 {
                self.front.push_back(FrontEdge { a, b, opposite });
            }
        }
    }

    /// Ball center resting on triangle `tri` on its normal side.
    fn resting_center(&self, tri: [u32; 3], radius: f64) -> Option<Point3<f64>> {
        let (p0, p1, p2) = (self.position(tri[0]), self.position(tri[1]), self.position(tri[2]));
        let side = (p1 - p0).cross(&(p2 - p0));
        ball_center(&p0, &p1, &p2, &side, radius)
    }

    /// Pivot over every front edge until the front is empty.
    fn expand(&mut self, radius: f64) {
        // Each edge closes at most twice, so this bounds the loop even if
        // the geometry misbehaves.
        let mut budget = self.cloud.len().saturating_mul(64).max(1024);

        while let Some(edge) = self.front.pop_front() {
            if budget == 0 {
                self.boundary.push(edge);
                continue;
            }
            budget -= 1;

            if self.edge_count(edge.a, edge.b) != 1 {
                continue;
            }

            match self.pivot(edge, radius) {
                Some(tri) => self.add_triangle(tri),
                None => self.boundary.push(edge),
            }
        }
    }

    /// Roll the ball over `edge` and return the triangle it lands on.
    fn pivot(&self, edge: FrontEdge, radius: f64) -> Option<[u32; 3]> {
        let old_center = self.resting_center([edge.a, edge.b, edge.opposite], radius)?;

        let pa = self.position(edge.a);
        let pb = self.position(edge.b);
        let axis = pb - pa;
        let axis_len = axis.norm();
        if axis_len < 1e-12 {
            return None;
        }
        let axis = axis / axis_len;
        let mid = Point3::from((pa.coords + pb.coords) * 0.5);

        let perpendicular = |v: Vector3<f64>| v - axis * v.dot(&axis);
        let from = perpendicular(old_center - mid);

        let candidates = self.index.within(&mid, 4.0 * radius * radius);

        let mut best: Option<(f64, u32)> = None;

        for candidate in candidates {
            let x = candidate.item as u32;
            if x == edge.a || x == edge.b || x == edge.opposite {
                continue;
            }

            // New triangle walks the shared edge the other way.
            let tri = [edge.b, edge.a, x];
            let px = self.position(x);
            let tri_normal = (pa - pb).cross(&(px - pb));
            let mean = self.mean_normal(tri);
            if tri_normal.dot(&mean) <= 0.0 {
                continue;
            }

            let Some(center) = ball_center(&pb, &pa, &px, &tri_normal, radius) else {
                continue;
            };

            let to = perpendicular(center - mid);
            let mut angle = from.cross(&to).dot(&axis).atan2(from.dot(&to));
            if angle < 0.0 {
                angle += std::f64::consts::TAU;
            }

            if best.is_some_and(|(best_angle, _)| angle >= best_angle) {
                continue;
            }
            if !self.can_add(tri)
                || !is_empty_ball(
                    self.cloud,
                    &self.index,
                    &center,
                    radius,
                    &[edge.a as usize, edge.b as usize, x as usize],
                )
            {
                continue;
            }

            best = Some((angle, x));
        }

        best.map(|(_, x)| [edge.b, edge.a, x])
    }

    /// Seed from untouched points and grow each seed.
    fn seed_and_expand(&mut self, radius: f64) {
        for i in 0..self.cloud.len() {
            if self.used[i] {
                continue;
            }
            if let Some(tri) = self.find_seed(i as u32, radius) {
                self.add_triangle(tri);
                self.expand(radius);
            }
        }
    }

    fn find_seed(&self, i: u32, radius: f64) -> Option<[u32; 3]> {
        let pi = self.position(i);
        let limit = 4.0 * radius * radius;
        let neighbors: Vec<u32> = self
            .index
            .nearest_n(&pi, SEED_NEIGHBORS + 1)
            .into_iter()
            .filter(|n| n.distance <= limit)
            .map(|n| n.item as u32)
            .filter(|&j| j != i && !self.used[j as usize])
            .collect();

        for (jdx, &j) in neighbors.iter().enumerate() {
            for &k in &neighbors[jdx + 1..] {
                let mut tri = [i, j, k];
                let (p0, p1, p2) = (pi, self.position(j), self.position(k));
                let mean = self.mean_normal(tri);
                let tri_normal = (p1 - p0).cross(&(p2 - p0));
                if tri_normal.dot(&mean) < 0.0 {
                    tri.swap(1, 2);
                }

                // Every corner must agree with the face orientation.
                let oriented = (self.position(tri[1]) - p0).cross(&(self.position(tri[2]) - p0));
                if tri.iter().any(|&v| oriented.dot(&self.normal(v)) <= 0.0) {
                    continue;
                }

                let Some(center) = ball_center(&p0, &p1, &p2, &oriented, radius) else {
                    continue;
                };
                if self.can_add(tri)
                    && is_empty_ball(
                        self.cloud,
                        &self.index,
                        &center,
                        radius,
                        &[i as usize, j as usize, k as usize],
                    )
                {
                    return Some(tri);
                }
            }
        }

        None
    }
}
