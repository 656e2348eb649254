//! Camera calibration and single-view pose estimation.
//!
//! Both entry points seed Levenberg-Marquardt from linear estimates (plane
//! homographies or a 3D DLT) and refine by minimizing the pixel reprojection
//! error through [`crate::optimization`].

use crate::camera::{validation, CalibrationError, CameraParameters};
use crate::distortion::{undistort, world_to_pixel_coordinates};
use crate::geometry::homography::{
    best_fit_frame, dlt_pose, find_homography, planar_frame, planar_pose,
};
use crate::geometry::RelativePosition;
use crate::optimization::factors::{PoseReprojectionCost, ViewReprojectionCost};
use crate::optimization::{solve, variable, ProjectionError, SolverSettings};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector, Matrix2xX, Matrix3xX, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Minimum number of correspondences per view.
pub const MIN_POINTS: usize = 4;

/// Composable calibration flags.
///
/// ```rust
/// use calibration_tools::calibration::CalibrationOptions;
///
/// let options = CalibrationOptions::ESTIMATE_INTRINSIC | CalibrationOptions::FIX_ASPECT_RATIO;
/// assert!(options.contains(CalibrationOptions::FIX_ASPECT_RATIO));
/// assert!(!options.contains(CalibrationOptions::FIX_PRINCIPAL_POINT));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CalibrationOptions(u32);

impl CalibrationOptions {
    /// Derive the initial focal length from the views (planar rigs only).
    /// Without it the caller's focal length must be positive.
    pub const ESTIMATE_INTRINSIC: Self = Self(1);
    pub const FIX_PRINCIPAL_POINT: Self = Self(1 << 1);
    /// Keep `fy / fx` at its initial value (1 when no focal length is set).
    pub const FIX_ASPECT_RATIO: Self = Self(1 << 2);
    /// Force `p1 = p2 = 0`.
    pub const NO_TANGENTIAL_DISTORTION: Self = Self(1 << 3);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CalibrationOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CalibrationOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for CalibrationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::ESTIMATE_INTRINSIC, "ESTIMATE_INTRINSIC"),
            (Self::FIX_PRINCIPAL_POINT, "FIX_PRINCIPAL_POINT"),
            (Self::FIX_ASPECT_RATIO, "FIX_ASPECT_RATIO"),
            (Self::NO_TANGENTIAL_DISTORTION, "NO_TANGENTIAL_DISTORTION"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "CalibrationOptions({})", set.join(" | "))
    }
}

/// Checks the view lists and returns the world points belonging to each
/// image view.
fn paired_views<'a>(
    world_views: &'a [Matrix3xX<f64>],
    image_views: &[Matrix2xX<f64>],
) -> Result<Vec<&'a Matrix3xX<f64>>, CalibrationError> {
    if world_views.is_empty() || image_views.is_empty() {
        return Err(CalibrationError::EmptyViews);
    }
    if world_views.len() != 1 && world_views.len() != image_views.len() {
        return Err(CalibrationError::ViewCountMismatch {
            world: world_views.len(),
            image: image_views.len(),
        });
    }

    let mut paired = Vec::with_capacity(image_views.len());
    for (view, image) in image_views.iter().enumerate() {
        let world = if world_views.len() == 1 {
            &world_views[0]
        } else {
            &world_views[view]
        };
        check_view(view, world, image)?;
        paired.push(world);
    }
    Ok(paired)
}

fn check_view(
    view: usize,
    world: &Matrix3xX<f64>,
    image: &Matrix2xX<f64>,
) -> Result<(), CalibrationError> {
    if world.ncols() != image.ncols() {
        return Err(CalibrationError::PointCountMismatch {
            view,
            world: world.ncols(),
            image: image.ncols(),
        });
    }
    if image.ncols() < MIN_POINTS {
        return Err(CalibrationError::TooFewPoints {
            view,
            found: image.ncols(),
            required: MIN_POINTS,
        });
    }
    Ok(())
}

/// Linear pose guess from normalized image points.
///
/// Planar rigs use the plane homography, other rigs the 3D DLT. Small or
/// degenerate non-planar sets fall back to the homography of their best-fit
/// plane, which is rough but good enough for the nonlinear refinement.
fn initial_pose(world: &Matrix3xX<f64>, normalized: &Matrix2xX<f64>) -> Option<RelativePosition> {
    if let Some(frame) = planar_frame(world) {
        return planar_pose(&frame, world, normalized);
    }
    if let Some(pose) = dlt_pose(world, normalized) {
        return Some(pose);
    }
    let (frame, _) = best_fit_frame(world)?;
    planar_pose(&frame, world, normalized)
}

fn pose_vector(pose: &RelativePosition) -> DVector<f64> {
    DVector::from_vec(vec![
        pose.rotation.x,
        pose.rotation.y,
        pose.rotation.z,
        pose.translation.x,
        pose.translation.y,
        pose.translation.z,
    ])
}

fn pose_from_vector(v: &DVector<f64>) -> RelativePosition {
    RelativePosition::new(Vector3::new(v[0], v[1], v[2]), Vector3::new(v[3], v[4], v[5]))
}

/// Closed-form focal lengths from the plane homographies of all views with the
/// principal point held at its current value.
///
/// With `K = diag(fx, fy, 1)` after removing the principal point, the image of
/// the absolute conic is `B = diag(1/fx², 1/fy², 1)` and every homography
/// gives two linear constraints on `(1/fx², 1/fy²)`.
fn estimate_focal_lengths(
    world_views: &[&Matrix3xX<f64>],
    image_views: &[Matrix2xX<f64>],
    params: &CameraParameters,
    aspect_ratio: Option<f64>,
) -> Result<(f64, f64), CalibrationError> {
    let center = params.center();
    let mut rows: Vec<[f64; 3]> = Vec::with_capacity(world_views.len() * 2);

    for (view, (world, image)) in world_views.iter().zip(image_views).enumerate() {
        let frame = planar_frame(world).ok_or(CalibrationError::NonPlanarRig { view })?;
        let mut centered = image.clone();
        for mut c in centered.column_iter_mut() {
            c -= center;
        }
        let Some(h) = find_homography(&frame.project(world), &centered) else {
            debug!("View {view}: homography is degenerate, skipped for focal estimation");
            continue;
        };
        rows.push([
            h[(0, 0)] * h[(0, 1)],
            h[(1, 0)] * h[(1, 1)],
            -h[(2, 0)] * h[(2, 1)],
        ]);
        rows.push([
            h[(0, 0)].powi(2) - h[(0, 1)].powi(2),
            h[(1, 0)].powi(2) - h[(1, 1)].powi(2),
            -(h[(2, 0)].powi(2) - h[(2, 1)].powi(2)),
        ]);
    }

    let (inv_fx2, inv_fy2) = match aspect_ratio {
        Some(ratio) => {
            // fy = ratio * fx, so 1/fy² = (1/fx²) / ratio².
            let scale = 1.0 / (ratio * ratio);
            let (num, den, magnitude) =
                rows.iter().fold((0.0, 0.0, 0.0), |(num, den, magnitude), r| {
                    let c = r[0] + r[1] * scale;
                    (num + c * r[2], den + c * c, magnitude + r[0] * r[0] + r[1] * r[1])
                });
            if den > 1e-12 * magnitude {
                let a = num / den;
                (a, a * scale)
            } else {
                (f64::NAN, f64::NAN)
            }
        }
        None if rows.len() >= 2 => {
            let a = DMatrix::from_fn(rows.len(), 2, |i, j| rows[i][j]);
            let b = DVector::from_iterator(rows.len(), rows.iter().map(|r| r[2]));
            let svd = a.svd(true, true);
            let (smallest, largest) = (svd.singular_values.min(), svd.singular_values.max());
            match svd.solve(&b, 0.0) {
                Ok(x) if smallest > 1e-9 * largest => (x[0], x[1]),
                _ => (f64::NAN, f64::NAN),
            }
        }
        None => (f64::NAN, f64::NAN),
    };

    if inv_fx2 > 0.0 && inv_fy2 > 0.0 && inv_fx2.is_finite() && inv_fy2.is_finite() {
        Ok((1.0 / inv_fx2.sqrt(), 1.0 / inv_fy2.sqrt()))
    } else {
        let size = params.image_size();
        let f = size.width.max(size.height) as f64;
        warn!("Focal length estimate is degenerate, falling back to {f}");
        Ok((f, aspect_ratio.map_or(f, |ratio| f * ratio)))
    }
}

/// Calibrates a camera from several views of a known rig using the default
/// [`SolverSettings`]. See [`calibrate_camera_with_settings`].
pub fn calibrate_camera(
    world_views: &[Matrix3xX<f64>],
    image_views: &[Matrix2xX<f64>],
    params: &mut CameraParameters,
    options: CalibrationOptions,
) -> Result<Vec<RelativePosition>, CalibrationError> {
    calibrate_camera_with_settings(
        world_views,
        image_views,
        params,
        options,
        &SolverSettings::default(),
    )
}

/// Calibrates a camera from several views of a known rig.
///
/// # Arguments
///
/// * `world_views` - Rig points per view, or a single set shared by all views.
/// * `image_views` - Observed pixels per view, column `i` matching world column `i`.
/// * `params` - Initial camera parameters. The principal point must be set;
///   the focal length must be positive unless
///   [`CalibrationOptions::ESTIMATE_INTRINSIC`] is given. Updated in place.
/// * `options` - Calibration flags.
/// * `settings` - Solver thresholds.
///
/// # Returns
///
/// The pose of every view relative to its world points, in input order.
pub fn calibrate_camera_with_settings(
    world_views: &[Matrix3xX<f64>],
    image_views: &[Matrix2xX<f64>],
    params: &mut CameraParameters,
    options: CalibrationOptions,
    settings: &SolverSettings,
) -> Result<Vec<RelativePosition>, CalibrationError> {
    let worlds = paired_views(world_views, image_views)?;
    validation::validate_principal_point(&params.intrinsics)?;

    let aspect_ratio = options.contains(CalibrationOptions::FIX_ASPECT_RATIO).then(|| {
        let i = &params.intrinsics;
        if i.fx > 0.0 && i.fy > 0.0 {
            i.fy / i.fx
        } else {
            1.0
        }
    });

    let mut initial = *params;
    if options.contains(CalibrationOptions::ESTIMATE_INTRINSIC) {
        let (fx, fy) = estimate_focal_lengths(&worlds, image_views, &initial, aspect_ratio)?;
        initial.set_focal_length(fx, fy);
        initial.distortions = [0.0; 4];
    } else {
        validation::validate_focal_length(&initial.intrinsics)?;
    }
    if let Some(ratio) = aspect_ratio {
        initial.intrinsics.fy = initial.intrinsics.fx * ratio;
    }
    if options.contains(CalibrationOptions::NO_TANGENTIAL_DISTORTION) {
        initial.distortions[2] = 0.0;
        initial.distortions[3] = 0.0;
    }

    let num_points: usize = image_views.iter().map(|v| v.ncols()).sum();
    info!(
        "Calibrating camera from {} views ({} points), options {:?}",
        image_views.len(),
        num_points,
        options
    );
    info!("Initial camera: {:?}", initial);

    let mut problem = tiny_solver::Problem::new();
    let mut initial_values = HashMap::new();
    let i = &initial.intrinsics;
    initial_values.insert(
        "intrinsics".to_string(),
        DVector::from_vec(vec![
            i.fx,
            i.fy,
            i.cx,
            i.cy,
            initial.distortions[0],
            initial.distortions[1],
            initial.distortions[2],
            initial.distortions[3],
        ]),
    );

    for (view, (world, image)) in worlds.iter().zip(image_views).enumerate() {
        let normalized = undistort(image, &initial)?;
        let pose = initial_pose(world, &normalized).ok_or_else(|| {
            CalibrationError::NumericalError(format!("No initial pose for view {view}"))
        })?;
        debug!("View {view} initial pose: {:?}", pose);

        let name = format!("pose_{view}");
        let cost = ViewReprojectionCost::new(world, image, aspect_ratio);
        problem.add_residual_block(
            cost.num_residuals(),
            &["intrinsics", name.as_str()],
            Box::new(cost),
            None,
        );
        initial_values.insert(name, pose_vector(&pose));
    }

    if options.contains(CalibrationOptions::FIX_PRINCIPAL_POINT) {
        problem.fix_variable("intrinsics", 2);
        problem.fix_variable("intrinsics", 3);
    }
    if aspect_ratio.is_some() {
        problem.fix_variable("intrinsics", 1);
    }
    if options.contains(CalibrationOptions::NO_TANGENTIAL_DISTORTION) {
        problem.fix_variable("intrinsics", 6);
        problem.fix_variable("intrinsics", 7);
    }

    let result = solve(&problem, &initial_values, settings)?;

    let x = variable(&result, "intrinsics")?;
    let mut calibrated = initial;
    calibrated.intrinsics.fx = x[0];
    calibrated.intrinsics.fy = match aspect_ratio {
        Some(ratio) => x[0] * ratio,
        None => x[1],
    };
    calibrated.intrinsics.cx = x[2];
    calibrated.intrinsics.cy = x[3];
    calibrated.distortions = [x[4], x[5], x[6], x[7]];
    validation::validate_focal_length(&calibrated.intrinsics)?;

    let mut positions = Vec::with_capacity(image_views.len());
    for view in 0..image_views.len() {
        positions.push(pose_from_vector(variable(&result, &format!("pose_{view}"))?));
    }

    for (view, ((world, image), position)) in
        worlds.iter().zip(image_views).zip(&positions).enumerate()
    {
        debug!(
            "View {view}: {:?}",
            reprojection_error(world, image, &calibrated, position)
        );
    }
    info!("Calibrated camera: {:?}", calibrated);

    *params = calibrated;
    Ok(positions)
}

/// Estimates the pose of a calibrated camera from one view, keeping the
/// camera parameters fixed.
///
/// # Examples
///
/// ```rust
/// use calibration_tools::calibration::calculate_camera_position;
/// use calibration_tools::camera::CameraParameters;
/// use calibration_tools::distortion::world_to_pixel_coordinates;
/// use calibration_tools::geometry::RelativePosition;
/// use nalgebra::{Matrix3xX, Vector3};
///
/// let params = CameraParameters::pinhole(800.0, 800.0, 320.0, 240.0);
/// let truth = RelativePosition::new(Vector3::new(0.1, -0.2, 0.05), Vector3::new(-50.0, -30.0, 600.0));
/// let world = Matrix3xX::from_columns(&[
///     Vector3::new(0.0, 0.0, 0.0),
///     Vector3::new(100.0, 0.0, 0.0),
///     Vector3::new(100.0, 80.0, 0.0),
///     Vector3::new(0.0, 80.0, 0.0),
///     Vector3::new(50.0, 40.0, 0.0),
/// ]);
/// let image = world_to_pixel_coordinates(&world, &params, &truth);
/// let pose = calculate_camera_position(&world, &image, &params).unwrap();
/// assert!((pose.translation - truth.translation).norm() < 1e-6);
/// ```
pub fn calculate_camera_position(
    world: &Matrix3xX<f64>,
    image: &Matrix2xX<f64>,
    params: &CameraParameters,
) -> Result<RelativePosition, CalibrationError> {
    calculate_camera_position_with_settings(world, image, params, &SolverSettings::default())
}

/// [`calculate_camera_position`] with explicit solver thresholds.
pub fn calculate_camera_position_with_settings(
    world: &Matrix3xX<f64>,
    image: &Matrix2xX<f64>,
    params: &CameraParameters,
    settings: &SolverSettings,
) -> Result<RelativePosition, CalibrationError> {
    check_view(0, world, image)?;

    let normalized = undistort(image, params)?;
    let pose = initial_pose(world, &normalized)
        .ok_or_else(|| CalibrationError::NumericalError("No initial pose".to_string()))?;

    let mut problem = tiny_solver::Problem::new();
    let cost = PoseReprojectionCost::new(*params, world, image);
    problem.add_residual_block(cost.num_residuals(), &["pose"], Box::new(cost), None);

    let mut initial_values = HashMap::new();
    initial_values.insert("pose".to_string(), pose_vector(&pose));

    let result = solve(&problem, &initial_values, settings)?;
    Ok(pose_from_vector(variable(&result, "pose")?))
}

/// Reprojection statistics, in pixels, of `world` seen by a camera at
/// `position` against the observed `image` points.
pub fn reprojection_error(
    world: &Matrix3xX<f64>,
    image: &Matrix2xX<f64>,
    params: &CameraParameters,
    position: &RelativePosition,
) -> ProjectionError {
    ProjectionError::between(image, &world_to_pixel_coordinates(world, params, position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Resolution;
    use approx::assert_relative_eq;

    fn board() -> Matrix3xX<f64> {
        let mut cols = Vec::new();
        for i in 0..7 {
            for j in 0..5 {
                cols.push(Vector3::new(i as f64 * 30.0, j as f64 * 30.0, 0.0));
            }
        }
        Matrix3xX::from_columns(&cols)
    }

    fn true_camera() -> CameraParameters {
        let mut params = CameraParameters::pinhole(820.0, 810.0, 322.0, 238.0);
        params.set_distortions(-0.12, 0.04, 0.0008, -0.0005);
        params
    }

    fn true_poses() -> Vec<RelativePosition> {
        vec![
            RelativePosition::new(Vector3::new(0.25, -0.15, 0.05), Vector3::new(-90.0, -60.0, 700.0)),
            RelativePosition::new(Vector3::new(-0.3, 0.2, -0.1), Vector3::new(-100.0, -50.0, 650.0)),
            RelativePosition::new(Vector3::new(0.1, 0.35, 0.2), Vector3::new(-80.0, -70.0, 750.0)),
            RelativePosition::new(Vector3::new(-0.2, -0.3, 0.0), Vector3::new(-95.0, -55.0, 680.0)),
        ]
    }

    fn observe(params: &CameraParameters) -> Vec<Matrix2xX<f64>> {
        let world = board();
        true_poses()
            .iter()
            .map(|pose| world_to_pixel_coordinates(&world, params, pose))
            .collect()
    }

    fn start_from_center() -> CameraParameters {
        CameraParameters::from_resolution(&Resolution {
            width: 644,
            height: 476,
        })
    }

    #[test]
    fn test_calibration_recovers_camera() {
        let truth = true_camera();
        let images = observe(&truth);
        let mut params = start_from_center();
        let poses = calibrate_camera(
            &[board()],
            &images,
            &mut params,
            CalibrationOptions::ESTIMATE_INTRINSIC,
        )
        .unwrap();

        assert_relative_eq!(params.intrinsics.fx, truth.intrinsics.fx, epsilon = 1e-4);
        assert_relative_eq!(params.intrinsics.fy, truth.intrinsics.fy, epsilon = 1e-4);
        assert_relative_eq!(params.intrinsics.cx, truth.intrinsics.cx, epsilon = 1e-4);
        assert_relative_eq!(params.intrinsics.cy, truth.intrinsics.cy, epsilon = 1e-4);
        for (d, t) in params.distortions.iter().zip(truth.distortions) {
            assert_relative_eq!(*d, t, epsilon = 1e-6);
        }
        assert_eq!(poses.len(), 4);
        for ((pose, expected), image) in poses.iter().zip(true_poses()).zip(&images) {
            assert_relative_eq!(pose.rotation, expected.rotation, epsilon = 1e-6);
            assert_relative_eq!(pose.translation, expected.translation, epsilon = 1e-4);
            let err = reprojection_error(&board(), image, &params, pose);
            assert!(err.rmse < 1e-6, "{err:?}");
        }
    }

    #[test]
    fn test_calibration_flags_hold_parameters() {
        let mut truth = CameraParameters::pinhole(800.0, 800.0, 320.0, 240.0);
        truth.set_distortions(-0.1, 0.02, 0.0, 0.0);
        let images = observe(&truth);

        let mut params = start_from_center();
        params.set_center(321.0, 239.0);
        let options = CalibrationOptions::ESTIMATE_INTRINSIC
            | CalibrationOptions::FIX_PRINCIPAL_POINT
            | CalibrationOptions::FIX_ASPECT_RATIO
            | CalibrationOptions::NO_TANGENTIAL_DISTORTION;
        calibrate_camera(&[board()], &images, &mut params, options).unwrap();

        assert_eq!(params.intrinsics.cx, 321.0);
        assert_eq!(params.intrinsics.cy, 239.0);
        assert_eq!(params.intrinsics.fx, params.intrinsics.fy);
        assert_eq!(params.p1(), 0.0);
        assert_eq!(params.p2(), 0.0);
        // The shifted principal point is absorbed by the other parameters.
        assert_relative_eq!(params.intrinsics.fx, 800.0, max_relative = 0.01);
    }

    #[test]
    fn test_calibration_from_initial_guess() {
        let truth = true_camera();
        let images = observe(&truth);
        let mut params = CameraParameters::pinhole(700.0, 700.0, 320.0, 240.0);
        let worlds = vec![board(); images.len()];
        calibrate_camera(&worlds, &images, &mut params, CalibrationOptions::empty()).unwrap();
        assert_relative_eq!(params.intrinsics.fx, truth.intrinsics.fx, epsilon = 1e-4);
        assert_relative_eq!(params.k1(), truth.k1(), epsilon = 1e-6);
    }

    #[test]
    fn test_calibration_preconditions() {
        let images = observe(&true_camera());
        let mut params = start_from_center();

        assert_eq!(
            calibrate_camera(&[], &images, &mut params, CalibrationOptions::ESTIMATE_INTRINSIC),
            Err(CalibrationError::EmptyViews)
        );
        assert_eq!(
            calibrate_camera(
                &[board(), board()],
                &images,
                &mut params,
                CalibrationOptions::ESTIMATE_INTRINSIC
            ),
            Err(CalibrationError::ViewCountMismatch { world: 2, image: 4 })
        );

        let short = board().columns(0, 3).into_owned();
        let short_image = images[0].columns(0, 3).into_owned();
        assert_eq!(
            calibrate_camera(&[short], &[short_image], &mut params, CalibrationOptions::ESTIMATE_INTRINSIC),
            Err(CalibrationError::TooFewPoints {
                view: 0,
                found: 3,
                required: 4
            })
        );

        let mut truncated = images.clone();
        truncated[2] = truncated[2].columns(0, 10).into_owned();
        assert_eq!(
            calibrate_camera(&[board()], &truncated, &mut params, CalibrationOptions::ESTIMATE_INTRINSIC),
            Err(CalibrationError::PointCountMismatch {
                view: 2,
                world: 35,
                image: 10
            })
        );

        // Focal length is zero and not estimated.
        assert_eq!(
            calibrate_camera(&[board()], &images, &mut params, CalibrationOptions::empty()),
            Err(CalibrationError::FocalLengthMustBePositive)
        );

        let mut no_center = CameraParameters::pinhole(800.0, 800.0, 0.0, 0.0);
        assert_eq!(
            calibrate_camera(&[board()], &images, &mut no_center, CalibrationOptions::empty()),
            Err(CalibrationError::PrincipalPointNotSet)
        );
    }

    #[test]
    fn test_estimation_needs_planar_rig() {
        let mut world = board();
        world[(2, 3)] = 40.0;
        let images: Vec<_> = true_poses()
            .iter()
            .map(|p| world_to_pixel_coordinates(&world, &true_camera(), p))
            .collect();
        let mut params = start_from_center();
        assert_eq!(
            calibrate_camera(&[world], &images, &mut params, CalibrationOptions::ESTIMATE_INTRINSIC),
            Err(CalibrationError::NonPlanarRig { view: 0 })
        );
    }

    #[test]
    fn test_degenerate_focal_estimate_falls_back() {
        // Fronto-parallel views carry no focal information.
        let world = board();
        let pose = RelativePosition::new(Vector3::zeros(), Vector3::new(-90.0, -60.0, 700.0));
        let params = CameraParameters::pinhole(800.0, 800.0, 320.0, 240.0);
        let image = world_to_pixel_coordinates(&world, &params, &pose);
        let (fx, fy) = estimate_focal_lengths(&[&world], &[image], &params, None).unwrap();
        assert_eq!((fx, fy), (641.0, 641.0));
    }

    #[test]
    fn test_camera_position_from_fixed_camera() {
        let params = true_camera();
        let world = board();
        for truth in true_poses() {
            let image = world_to_pixel_coordinates(&world, &params, &truth);
            let pose = calculate_camera_position(&world, &image, &params).unwrap();
            assert_relative_eq!(pose.rotation, truth.rotation, epsilon = 1e-8);
            assert_relative_eq!(pose.translation, truth.translation, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_camera_position_small_non_planar_rig() {
        let params = true_camera();
        let world = Matrix3xX::from_columns(&[
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(120.0, 0.0, 10.0),
            Vector3::new(120.0, 90.0, -15.0),
            Vector3::new(0.0, 90.0, 5.0),
            Vector3::new(60.0, 45.0, 30.0),
        ]);
        let truth = RelativePosition::new(Vector3::new(0.1, -0.15, 0.05), Vector3::new(-60.0, -40.0, 650.0));
        let image = world_to_pixel_coordinates(&world, &params, &truth);
        let pose = calculate_camera_position(&world, &image, &params).unwrap();
        assert_relative_eq!(pose.rotation, truth.rotation, epsilon = 1e-7);
        assert_relative_eq!(pose.translation, truth.translation, epsilon = 1e-5);
    }

    #[test]
    fn test_options_debug() {
        let options = CalibrationOptions::FIX_PRINCIPAL_POINT | CalibrationOptions::FIX_ASPECT_RATIO;
        assert_eq!(
            format!("{options:?}"),
            "CalibrationOptions(FIX_PRINCIPAL_POINT | FIX_ASPECT_RATIO)"
        );
        assert_eq!(options.bits(), 6);
        assert!(CalibrationOptions::empty().contains(CalibrationOptions::empty()));
    }
}
