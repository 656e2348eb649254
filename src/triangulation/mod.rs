//! Multi-view triangulation of calibrated cameras.
//!
//! Every pair of cameras triangulates each point by the midpoint of the
//! shortest segment between the two viewing rays. Pairwise estimates are
//! expressed in the frame of the first camera and averaged.

use crate::camera::{CalibrationError, CameraParameters};
use crate::distortion::undistort_with_z;
use crate::geometry::{calculate_relative_position, camera_to_world_coordinates, RelativePosition};
use log::{debug, info, warn};
use nalgebra::{Matrix2xX, Matrix3xX, Vector3};

/// Triangulates points seen by several calibrated cameras.
///
/// Cameras are registered with [`StereoTriangulator::add_camera`]; the
/// relative position between every pair is computed once at that point.
#[derive(Debug, Clone, Default)]
pub struct StereoTriangulator {
    cameras: Vec<CameraParameters>,
    positions: Vec<RelativePosition>,
    /// `relative_positions[j][i]` maps camera `i` coordinates into camera `j`
    /// coordinates, for `i < j`.
    relative_positions: Vec<Vec<RelativePosition>>,
}

impl StereoTriangulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a camera with its intrinsics and its pose in the common world
    /// frame.
    pub fn add_camera(&mut self, params: CameraParameters, position: RelativePosition) {
        let to_new = self
            .positions
            .iter()
            .map(|previous| calculate_relative_position(previous, &position))
            .collect();
        self.relative_positions.push(to_new);
        self.cameras.push(params);
        self.positions.push(position);
        debug!("Added camera {}: {:?}", self.cameras.len() - 1, params);
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    pub fn camera_parameters(&self, index: usize) -> Option<&CameraParameters> {
        self.cameras.get(index)
    }

    /// The transform mapping camera `from` coordinates into camera `to`
    /// coordinates.
    pub fn relative_position(&self, from: usize, to: usize) -> Option<RelativePosition> {
        let count = self.cameras.len();
        if from >= count || to >= count {
            return None;
        }
        match from.cmp(&to) {
            std::cmp::Ordering::Equal => Some(RelativePosition::identity()),
            std::cmp::Ordering::Less => Some(self.relative_positions[to][from]),
            std::cmp::Ordering::Greater => Some(self.relative_positions[from][to].inverse()),
        }
    }

    /// Removes all cameras.
    pub fn clear(&mut self) {
        self.cameras.clear();
        self.positions.clear();
        self.relative_positions.clear();
    }

    /// Triangulates points from one set of pixel observations per camera.
    ///
    /// Column `k` of every set observes the same physical point. A NaN
    /// coordinate marks a point that camera did not see; it only removes the
    /// pairs involving that camera. Points without a single valid pair are
    /// returned as NaN.
    ///
    /// The result is expressed in the frame of camera 0.
    pub fn calculate_3d_points(
        &self,
        image_points: &[Matrix2xX<f64>],
    ) -> Result<Matrix3xX<f64>, CalibrationError> {
        if image_points.len() != self.cameras.len() {
            return Err(CalibrationError::CameraCountMismatch {
                expected: self.cameras.len(),
                found: image_points.len(),
            });
        }
        let num_points = image_points.first().map_or(0, |p| p.ncols());
        for (camera, points) in image_points.iter().enumerate() {
            if points.ncols() != num_points {
                return Err(CalibrationError::ObservationCountMismatch {
                    camera,
                    expected: num_points,
                    found: points.ncols(),
                });
            }
        }
        if self.cameras.len() < 2 {
            warn!("Triangulation needs at least two cameras, got {}", self.cameras.len());
        }

        let rays = image_points
            .iter()
            .zip(&self.cameras)
            .map(|(points, params)| undistort_with_z(points, params, 1.0))
            .collect::<Result<Vec<_>, _>>()?;

        let mut sum = Matrix3xX::zeros(num_points);
        let mut counts = vec![0usize; num_points];
        for j in 1..rays.len() {
            for i in 0..j {
                let mut estimates = triangulate_pair(&rays[i], &rays[j], &self.relative_positions[j][i]);
                if i != 0 {
                    estimates = camera_to_world_coordinates(&estimates, &self.relative_positions[i][0]);
                }
                for (k, estimate) in estimates.column_iter().enumerate() {
                    if estimate.iter().all(|v| v.is_finite()) {
                        let mut column = sum.column_mut(k);
                        column += estimate;
                        counts[k] += 1;
                    }
                }
            }
        }

        let mut result = Matrix3xX::from_element(num_points, f64::NAN);
        for (k, count) in counts.iter().enumerate() {
            if *count > 0 {
                result.set_column(k, &(sum.column(k) / *count as f64));
            }
        }
        info!(
            "Triangulated {} of {} points from {} cameras",
            counts.iter().filter(|c| **c > 0).count(),
            num_points,
            self.cameras.len()
        );
        Ok(result)
    }
}

/// Midpoint triangulation of matching rays `a` (camera A) and `b` (camera B)
/// where `relative` maps camera A coordinates into camera B coordinates.
/// The result is in camera A coordinates; NaN rays give NaN points.
pub fn triangulate_pair(
    a_rays: &Matrix3xX<f64>,
    b_rays: &Matrix3xX<f64>,
    relative: &RelativePosition,
) -> Matrix3xX<f64> {
    let r = relative.rotation_matrix();
    let rt = r.transpose();
    let t = relative.translation;

    let mut result = Matrix3xX::zeros(a_rays.ncols());
    for (k, (a, b)) in a_rays.column_iter().zip(b_rays.column_iter()).enumerate() {
        let a: Vector3<f64> = a.into_owned();
        let b: Vector3<f64> = b.into_owned();
        let u = r * a;

        let aa = a.norm_squared();
        let bb = b.norm_squared();
        let ub = u.dot(&b);
        let bt = b.dot(&t);
        let ut = u.dot(&t);
        let dd = aa * bb - ub * ub;

        let z_a = (ub * bt - bb * ut) / dd;
        let z_b = (aa * bt - ut * ub) / dd;

        let point_a = a * z_a;
        let point_b = rt * (b * z_b - t);
        result.set_column(k, &((point_a + point_b) * 0.5));
    }
    result
}
