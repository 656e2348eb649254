//! Lens distortion and the coordinate chain between world, camera, normalized
//! and pixel coordinates.
//!
//! Point sets hold one point per column. A NaN coordinate marks a missing
//! observation; it is carried through every transform unchanged and never
//! reaches the solver.
//!
//! Applying distortion is closed form. Removing it has no closed form, so
//! [`undistort_point`] minimizes the pixel residual of the forward model with
//! Levenberg-Marquardt.

use crate::camera::{CalibrationError, CameraParameters};
use crate::geometry::transform::RelativePosition;
use crate::optimization::factors::{distort_generic, UndistortCost};
use crate::optimization::{solve, variable, SolverSettings};
use nalgebra::{DVector, Matrix2xX, Matrix3xX, Vector2, Vector3};
use std::collections::HashMap;

pub mod map;

pub use crate::geometry::transform::{camera_to_world_coordinates, world_to_camera_coordinates};
pub use map::{undistort_map, Nearest, RoundingPolicy, Unrounded, UndistortMap};

/// Applies radial and tangential distortion to a normalized point.
///
/// # Examples
///
/// ```rust
/// use calibration_tools::camera::CameraParameters;
/// use calibration_tools::distortion::normalized_to_distorted;
///
/// let mut params = CameraParameters::pinhole(500.0, 500.0, 320.0, 240.0);
/// params.set_distortions(0.1, 0.0, 0.0, 0.0);
/// let (x, y) = normalized_to_distorted(&params, 0.5, 0.0);
/// assert!((x - 0.5 * (1.0 + 0.1 * 0.25)).abs() < 1e-12);
/// assert_eq!(y, 0.0);
/// ```
pub fn normalized_to_distorted(params: &CameraParameters, x: f64, y: f64) -> (f64, f64) {
    distort_generic(x, y, params.distortions)
}

/// Distorts a normalized point and maps it to pixel coordinates.
pub fn normalized_to_pixel(params: &CameraParameters, x: f64, y: f64) -> Vector2<f64> {
    let (xd, yd) = normalized_to_distorted(params, x, y);
    let i = &params.intrinsics;
    Vector2::new(i.fx * xd + i.cx, i.fy * yd + i.cy)
}

/// Column-wise [`normalized_to_pixel`].
pub fn normalized_to_pixel_coordinates(
    points: &Matrix2xX<f64>,
    params: &CameraParameters,
) -> Matrix2xX<f64> {
    let mut result = Matrix2xX::zeros(points.ncols());
    for (i, p) in points.column_iter().enumerate() {
        result.set_column(i, &normalized_to_pixel(params, p[0], p[1]));
    }
    result
}

/// Removes lens distortion from one pixel, returning normalized coordinates.
///
/// The linear inversion `((x - cx) / fx, (y - cy) / fy)` seeds the solver and
/// is returned directly for a distortion-free camera.
pub fn undistort_point(
    params: &CameraParameters,
    x: f64,
    y: f64,
) -> Result<Vector2<f64>, CalibrationError> {
    if x.is_nan() || y.is_nan() {
        return Ok(Vector2::repeat(f64::NAN));
    }
    let i = &params.intrinsics;
    let guess = Vector2::new((x - i.cx) / i.fx, (y - i.cy) / i.fy);
    if !params.has_distortion() {
        return Ok(guess);
    }

    let mut problem = tiny_solver::Problem::new();
    let cost = UndistortCost::new(*params, Vector2::new(x, y));
    problem.add_residual_block(2, &["point"], Box::new(cost), None);

    let mut initial_values = HashMap::new();
    initial_values.insert("point".to_string(), DVector::from_vec(vec![guess.x, guess.y]));

    let result = solve(&problem, &initial_values, &SolverSettings::default())?;
    let point = variable(&result, "point")?;
    Ok(Vector2::new(point[0], point[1]))
}

/// Column-wise [`undistort_point`].
pub fn undistort(
    points: &Matrix2xX<f64>,
    params: &CameraParameters,
) -> Result<Matrix2xX<f64>, CalibrationError> {
    let mut result = Matrix2xX::zeros(points.ncols());
    for (i, p) in points.column_iter().enumerate() {
        result.set_column(i, &undistort_point(params, p[0], p[1])?);
    }
    Ok(result)
}

/// Like [`undistort`] but appends a constant third coordinate `z`, which turns
/// the normalized points into rays (`z = 1`) or points on a plane.
pub fn undistort_with_z(
    points: &Matrix2xX<f64>,
    params: &CameraParameters,
    z: f64,
) -> Result<Matrix3xX<f64>, CalibrationError> {
    let normalized = undistort(points, params)?;
    Ok(append_z(&normalized, z))
}

fn append_z(points: &Matrix2xX<f64>, z: f64) -> Matrix3xX<f64> {
    let mut result = Matrix3xX::zeros(points.ncols());
    for (i, p) in points.column_iter().enumerate() {
        result.set_column(i, &Vector3::new(p[0], p[1], z));
    }
    result
}

/// Pinhole projection `(x / z, y / z)` of every column.
pub fn perspective_projection(points: &Matrix3xX<f64>) -> Matrix2xX<f64> {
    let mut result = Matrix2xX::zeros(points.ncols());
    for (i, p) in points.column_iter().enumerate() {
        result.set_column(i, &Vector2::new(p[0] / p[2], p[1] / p[2]));
    }
    result
}

/// [`perspective_projection`] keeping a constant third coordinate `z`.
pub fn perspective_projection_with_z(points: &Matrix3xX<f64>, z: f64) -> Matrix3xX<f64> {
    append_z(&perspective_projection(points), z)
}

/// Projects camera-frame points to distorted pixel coordinates.
pub fn camera_to_pixel_coordinates(
    points: &Matrix3xX<f64>,
    params: &CameraParameters,
) -> Matrix2xX<f64> {
    normalized_to_pixel_coordinates(&perspective_projection(points), params)
}

/// Projects world points seen by a camera at `position` to pixel coordinates.
///
/// # Examples
///
/// ```rust
/// use calibration_tools::camera::CameraParameters;
/// use calibration_tools::distortion::world_to_pixel_coordinates;
/// use calibration_tools::geometry::RelativePosition;
/// use nalgebra::{Matrix3xX, Vector3};
///
/// let params = CameraParameters::pinhole(1000.0, 1000.0, 320.0, 240.0);
/// let world = Matrix3xX::from_columns(&[Vector3::new(0.0, 0.0, 1000.0)]);
/// let pixels = world_to_pixel_coordinates(&world, &params, &RelativePosition::identity());
/// assert_eq!((pixels[(0, 0)], pixels[(1, 0)]), (320.0, 240.0));
/// ```
pub fn world_to_pixel_coordinates(
    points: &Matrix3xX<f64>,
    params: &CameraParameters,
    position: &RelativePosition,
) -> Matrix2xX<f64> {
    camera_to_pixel_coordinates(&world_to_camera_coordinates(points, position), params)
}
