//! Point cloud data structures and point-sample loading.
//!
//! A point sample on disk is a 2-D `.npy` array with one point per row:
//! columns 0-2 are the position and, when the array is at least six columns
//! wide, columns 3-5 are the normal. Extra columns are ignored. This module
//! turns such arrays into a [`PointCloud`] and provides the neighbourhood
//! queries the reconstruction strategies share: PCA normal estimation,
//! outward orientation and mean point spacing.
//!
//! # Example
//!
//! ```no_run
//! use cloudmesh::load_point_sample;
//!
//! let cloud = load_point_sample("output/pointcloud/feet/left.npy".as_ref())?;
//! let cloud = if cloud.has_normals() {
//!     cloud
//! } else {
//!     let mut cloud = cloud.with_estimated_normals(16);
//!     cloud.orient_normals_outward();
//!     cloud
//! };
//! println!("{} oriented points", cloud.len());
//! # Ok::<(), cloudmesh::MeshError>(())
//! ```

use std::path::Path;

use hashbrown::HashSet;
use kiddo::{KdTree, NearestNeighbour, SquaredEuclidean};
use nalgebra::{Point3, Rotation3, Unit, Vector3};
use tracing::{debug, info};

use crate::error::{MeshError, MeshResult};
use crate::npy::{self, NpyArray};

/// Minimum columns a point sample needs (x, y, z).
pub const POSITION_COLUMNS: usize = 3;

/// Columns at which a point sample is read as carrying normals.
pub const NORMAL_COLUMNS: usize = 6;

/// A single point in a point cloud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudPoint {
    /// 3D position.
    pub position: Point3<f64>,

    /// Surface normal, supplied with the sample or estimated.
    pub normal: Option<Vector3<f64>>,
}

impl CloudPoint {
    /// Create a new point with only position.
    #[inline]
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            normal: None,
        }
    }

    /// Create a point from coordinates.
    #[inline]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }

    /// Create a point with position and normal.
    #[inline]
    pub fn with_normal(position: Point3<f64>, normal: Vector3<f64>) -> Self {
        Self {
            position,
            normal: Some(normal),
        }
    }

    #[inline]
    pub(crate) fn coords(&self) -> [f64; 3] {
        [self.position.x, self.position.y, self.position.z]
    }
}

/// An unordered set of points, each optionally carrying a normal.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    /// The points in the cloud.
    pub points: Vec<CloudPoint>,
}

impl PointCloud {
    /// Create a new empty point cloud.
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Create a point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Create a point cloud from a list of positions.
    pub fn from_positions(positions: &[Point3<f64>]) -> Self {
        Self {
            points: positions.iter().map(|&p| CloudPoint::new(p)).collect(),
        }
    }

    /// Split a decoded sample into positions and, for six or more columns,
    /// normals.
    ///
    /// `path` names the source in errors.
    pub fn from_sample(sample: &NpyArray, path: &Path) -> MeshResult<Self> {
        if sample.ndim() != 2 {
            return Err(MeshError::Dimensions {
                path: path.to_path_buf(),
                ndim: sample.ndim(),
            });
        }
        let cols = sample.cols();
        if cols < POSITION_COLUMNS {
            return Err(MeshError::format(path, cols));
        }

        let with_normals = cols >= NORMAL_COLUMNS;
        let points = sample
            .data
            .chunks_exact(cols)
            .map(|row| {
                let position = Point3::new(row[0], row[1], row[2]);
                if with_normals {
                    CloudPoint::with_normal(position, Vector3::new(row[3], row[4], row[5]))
                } else {
                    CloudPoint::new(position)
                }
            })
            .collect();

        Ok(Self { points })
    }

    /// Encode the cloud as an N x 3 array, or N x 6 when every point has a
    /// normal.
    pub fn to_sample(&self) -> NpyArray {
        let cols = if self.has_normals() {
            NORMAL_COLUMNS
        } else {
            POSITION_COLUMNS
        };
        let mut data = Vec::with_capacity(self.len() * cols);
        for p in &self.points {
            data.extend_from_slice(&p.coords());
            if cols == NORMAL_COLUMNS
                && let Some(n) = p.normal
            {
                data.extend_from_slice(&[n.x, n.y, n.z]);
            }
        }
        NpyArray {
            shape: vec![self.len(), cols],
            data,
        }
    }

    /// Number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Check if all points have normals.
    pub fn has_normals(&self) -> bool {
        !self.points.is_empty() && self.points.iter().all(|p| p.normal.is_some())
    }

    /// Compute the axis-aligned bounding box.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.points.first()?;
        let mut min = first.position;
        let mut max = first.position;

        for p in &self.points[1..] {
            min.x = min.x.min(p.position.x);
            min.y = min.y.min(p.position.y);
            min.z = min.z.min(p.position.z);
            max.x = max.x.max(p.position.x);
            max.y = max.y.max(p.position.y);
            max.z = max.z.max(p.position.z);
        }

        Some((min, max))
    }

    /// Compute the centroid of the point cloud.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.points.is_empty() {
            return None;
        }

        let sum: Vector3<f64> = self
            .points
            .iter()
            .map(|p| p.position.coords)
            .fold(Vector3::zeros(), |acc, v| acc + v);

        Some(Point3::from(sum / self.points.len() as f64))
    }

    /// Index of the first point with a NaN or infinite coordinate.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.points.iter().position(|p| {
            !(p.position.x.is_finite() && p.position.y.is_finite() && p.position.z.is_finite())
        })
    }

    /// Add a point to the cloud.
    #[inline]
    pub fn push(&mut self, point: CloudPoint) {
        self.points.push(point);
    }

    /// Add a point from coordinates.
    #[inline]
    pub fn push_coords(&mut self, x: f64, y: f64, z: f64) {
        self.points.push(CloudPoint::from_coords(x, y, z));
    }

    /// Estimate normals for all points using PCA on local neighborhoods.
    ///
    /// Each normal is the eigenvector of the smallest eigenvalue of the
    /// covariance of the `k` nearest neighbours. Sign is arbitrary; call
    /// [`PointCloud::orient_normals_outward`] afterwards.
    pub fn with_estimated_normals(&self, k: usize) -> Self {
        if self.is_empty() {
            return self.clone();
        }

        debug!(
            "Estimating normals using k={} neighbors for {} points",
            k,
            self.len()
        );

        let normals = estimate_normals(self, k.max(3));

        let mut result = self.clone();
        for (point, normal) in result.points.iter_mut().zip(normals) {
            point.normal = Some(normal);
        }

        result
    }

    /// Orient normals consistently (pointing away from the centroid).
    ///
    /// Assumes the cloud samples the exterior of a roughly star-shaped
    /// object; concave regions can end up facing inward.
    pub fn orient_normals_outward(&mut self) {
        let Some(centroid) = self.centroid() else {
            return;
        };

        for point in &mut self.points {
            if let Some(normal) = point.normal.as_mut() {
                let to_point = point.position - centroid;
                if normal.dot(&to_point) < 0.0 {
                    *normal = -*normal;
                }
            }
        }
    }
}

/// Load a point sample from an `.npy` file.
///
/// Fails with [`MeshError::Format`] when the array has fewer than three
/// columns and [`MeshError::Dimensions`] when it is not 2-D. A sample with
/// zero rows loads as an empty cloud.
pub fn load_point_sample(path: &Path) -> MeshResult<PointCloud> {
    let sample = npy::read_npy(path)?;
    let cloud = PointCloud::from_sample(&sample, path)?;

    info!(
        "Loaded {} points from {:?} (columns: {}, has_normals: {})",
        cloud.len(),
        path,
        sample.cols(),
        cloud.has_normals()
    );

    Ok(cloud)
}

/// Save a point cloud as an `.npy` sample.
pub fn save_point_sample(cloud: &PointCloud, path: &Path) -> MeshResult<()> {
    npy::write_npy(&cloud.to_sample(), path)?;
    info!("Saved {} points to {:?}", cloud.len(), path);
    Ok(())
}

// ============================================================================
// Neighbourhood queries
// ============================================================================

/// Nearest-neighbour index over the positions of a cloud.
///
/// Positions are stored in a fixed, generically rotated frame so that
/// axis-aligned structure (flat patches, integer grids) never fills a
/// k-d tree bucket with values equal on its split axis. Rotation keeps
/// distances, so queries take and return cloud-frame quantities. Exact
/// duplicate positions are stored once, under their lowest index.
pub(crate) struct PointIndex {
    tree: KdTree<f64, 3>,
    frame: Rotation3<f64>,
}

impl PointIndex {
    pub(crate) fn new(cloud: &PointCloud) -> Self {
        let frame = Rotation3::from_axis_angle(
            &Unit::new_normalize(Vector3::new(0.267_9, 0.534_5, 0.801_8)),
            0.937_1,
        );
        let mut tree = KdTree::with_capacity(cloud.len().max(1));
        let mut stored: HashSet<[u64; 3]> = HashSet::with_capacity(cloud.len());

        for (i, point) in cloud.points.iter().enumerate() {
            // `+ 0.0` folds -0.0 into 0.0.
            let p = point.position;
            let bits = [
                (p.x + 0.0).to_bits(),
                (p.y + 0.0).to_bits(),
                (p.z + 0.0).to_bits(),
            ];
            if stored.insert(bits) {
                tree.add(&rotated(&frame, &p), i as u64);
            }
        }

        if stored.len() < cloud.len() {
            debug!(
                points = cloud.len(),
                distinct = stored.len(),
                "Duplicate positions indexed once"
            );
        }

        Self { tree, frame }
    }

    /// Up to `qty` nearest points, closest first. Distances are squared.
    pub(crate) fn nearest_n(
        &self,
        query: &Point3<f64>,
        qty: usize,
    ) -> Vec<NearestNeighbour<f64, u64>> {
        self.tree
            .nearest_n::<SquaredEuclidean>(&rotated(&self.frame, query), qty)
    }

    pub(crate) fn nearest_one(&self, query: &Point3<f64>) -> NearestNeighbour<f64, u64> {
        self.tree
            .nearest_one::<SquaredEuclidean>(&rotated(&self.frame, query))
    }

    /// Points within squared distance `radius_sq`, in no particular order.
    pub(crate) fn within(
        &self,
        query: &Point3<f64>,
        radius_sq: f64,
    ) -> Vec<NearestNeighbour<f64, u64>> {
        self.tree
            .within_unsorted::<SquaredEuclidean>(&rotated(&self.frame, query), radius_sq)
    }
}

fn rotated(frame: &Rotation3<f64>, p: &Point3<f64>) -> [f64; 3] {
    let r = frame.transform_point(p);
    [r.x, r.y, r.z]
}

/// Estimate normals using PCA on local neighborhoods.
fn estimate_normals(cloud: &PointCloud, k: usize) -> Vec<Vector3<f64>> {
    let index = PointIndex::new(cloud);
    let mut normals = Vec::with_capacity(cloud.len());

    for point in &cloud.points {
        let neighbors = index.nearest_n(&point.position, k);

        let neighbor_points: Vec<Point3<f64>> = neighbors
            .iter()
            .map(|n| cloud.points[n.item as usize].position)
            .collect();

        let centroid: Vector3<f64> = neighbor_points
            .iter()
            .map(|p| p.coords)
            .fold(Vector3::zeros(), |acc, v| acc + v)
            / neighbor_points.len().max(1) as f64;

        let mut cov = nalgebra::Matrix3::zeros();
        for np in &neighbor_points {
            let d = np.coords - centroid;
            cov += d * d.transpose();
        }

        // Smallest eigenvector is the normal
        let eig = cov.symmetric_eigen();
        let mut min_idx = 0;
        let mut min_val = eig.eigenvalues[0];
        for i in 1..3 {
            if eig.eigenvalues[i] < min_val {
                min_val = eig.eigenvalues[i];
                min_idx = i;
            }
        }

        let normal = eig.eigenvectors.column(min_idx).into_owned();
        let norm = normal.norm();
        if norm > 1e-10 && norm.is_finite() {
            normals.push(normal / norm);
        } else {
            normals.push(Vector3::new(0.0, 0.0, 1.0));
        }
    }

    normals
}

/// Estimate average nearest-neighbour spacing from up to 1000 samples.
pub(crate) fn estimate_point_spacing(cloud: &PointCloud, index: &PointIndex) -> f64 {
    if cloud.len() < 2 {
        return 1.0;
    }

    let sample_size = cloud.len().min(1000);
    let step = cloud.len() / sample_size;

    let mut total_spacing = 0.0;
    let mut count = 0;

    for i in (0..cloud.len()).step_by(step.max(1)) {
        let neighbors = index.nearest_n(&cloud.points[i].position, 2);

        if neighbors.len() >= 2 {
            total_spacing += neighbors[1].distance.sqrt();
            count += 1;
        }
    }

    if count > 0 && total_spacing > 0.0 {
        total_spacing / count as f64
    } else {
        1.0
    }
}
