//! Residual blocks for `tiny_solver`.
//!
//! Every factor is generic over [`RealField`] so the solver can evaluate it with
//! dual numbers and obtain Jacobians by automatic differentiation.
//!
//! Parameter layouts:
//! * intrinsics: `[fx, fy, cx, cy, k1, k2, p1, p2]`
//! * pose: `[rx, ry, rz, tx, ty, tz]` (rotation vector, translation)

use crate::camera::CameraParameters;
use crate::geometry::rotation::rotation_vector_to_matrix_generic;
use nalgebra::{
    Const, DVector, Dyn, Matrix2xX, Matrix3xX, OMatrix, RealField, SVector, Vector2, Vector3,
};
use tiny_solver::factors::Factor;

pub const INTRINSIC_DIM: usize = 8;
pub const POSE_DIM: usize = 6;

/// Radial-tangential distortion of a normalized point.
pub fn distort_generic<T: RealField>(x: T, y: T, distortions: [T; 4]) -> (T, T) {
    let [k1, k2, p1, p2] = distortions;
    let two = T::one() + T::one();
    let r2 = x.clone() * x.clone() + y.clone() * y.clone();
    let r4 = r2.clone() * r2.clone();
    let xy = x.clone() * y.clone();
    let radial = T::one() + k1 * r2.clone() + k2 * r4;

    let x_distorted = x.clone() * radial.clone()
        + two.clone() * p1.clone() * xy.clone()
        + p2.clone() * (r2.clone() + two.clone() * x.clone() * x);
    let y_distorted = y.clone() * radial
        + p1 * (r2 + two.clone() * y.clone() * y)
        + two * p2 * xy;
    (x_distorted, y_distorted)
}

fn constant<T: RealField>(value: f64) -> T {
    T::from_f64(value).unwrap()
}

fn camera_constants<T: RealField>(params: &CameraParameters) -> ([T; 4], [T; 4]) {
    let i = &params.intrinsics;
    (
        [constant(i.fx), constant(i.fy), constant(i.cx), constant(i.cy)],
        params.distortions.map(constant::<T>),
    )
}

/// Projects a world point through a pose and the full camera model.
fn project_generic<T: RealField>(
    pinhole: &[T; 4],
    distortions: &[T; 4],
    pose: &DVector<T>,
    point: &Vector3<f64>,
) -> (T, T) {
    let rotation = Vector3::new(pose[0].clone(), pose[1].clone(), pose[2].clone());
    let translation = Vector3::new(pose[3].clone(), pose[4].clone(), pose[5].clone());
    let world = Vector3::new(constant(point.x), constant(point.y), constant(point.z));
    let camera = rotation_vector_to_matrix_generic(&rotation) * world + translation;

    let x = camera.x.clone() / camera.z.clone();
    let y = camera.y.clone() / camera.z.clone();
    let (xd, yd) = distort_generic(x, y, distortions.clone());
    let [fx, fy, cx, cy] = pinhole.clone();
    (fx * xd + cx, fy * yd + cy)
}

fn columns<const R: usize>(points: &OMatrix<f64, Const<R>, Dyn>) -> Vec<SVector<f64, R>> {
    points.column_iter().map(|c| c.into_owned()).collect()
}

/// Pixel residual of a single normalized point estimate against an observed
/// distorted pixel. Used to invert the distortion model.
#[derive(Debug, Clone)]
pub struct UndistortCost {
    params: CameraParameters,
    observed: Vector2<f64>,
}

impl UndistortCost {
    pub fn new(params: CameraParameters, observed: Vector2<f64>) -> Self {
        Self { params, observed }
    }
}

impl<T: RealField> Factor<T> for UndistortCost {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let point = &params[0];
        let (pinhole, distortions) = camera_constants::<T>(&self.params);
        let (xd, yd) = distort_generic(point[0].clone(), point[1].clone(), distortions);
        let [fx, fy, cx, cy] = pinhole;
        DVector::from_vec(vec![
            fx * xd + cx - constant(self.observed.x),
            fy * yd + cy - constant(self.observed.y),
        ])
    }
}

/// Reprojection residuals of one calibration view. Variables are the shared
/// intrinsics and the view's pose.
///
/// With a fixed aspect ratio `fy` is not read from the intrinsics vector but
/// derived as `fx * ratio`.
#[derive(Debug, Clone)]
pub struct ViewReprojectionCost {
    world: Vec<Vector3<f64>>,
    image: Vec<Vector2<f64>>,
    aspect_ratio: Option<f64>,
}

impl ViewReprojectionCost {
    pub fn new(world: &Matrix3xX<f64>, image: &Matrix2xX<f64>, aspect_ratio: Option<f64>) -> Self {
        Self {
            world: columns(world),
            image: columns(image),
            aspect_ratio,
        }
    }

    pub fn num_residuals(&self) -> usize {
        self.image.len() * 2
    }
}

impl<T: RealField> Factor<T> for ViewReprojectionCost {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let intrinsics = &params[0];
        let pose = &params[1];

        let fx = intrinsics[0].clone();
        let fy = match self.aspect_ratio {
            Some(ratio) => fx.clone() * constant(ratio),
            None => intrinsics[1].clone(),
        };
        let pinhole = [fx, fy, intrinsics[2].clone(), intrinsics[3].clone()];
        let distortions = [
            intrinsics[4].clone(),
            intrinsics[5].clone(),
            intrinsics[6].clone(),
            intrinsics[7].clone(),
        ];

        let mut residuals = DVector::zeros(self.image.len() * 2);
        for (i, (world, image)) in self.world.iter().zip(&self.image).enumerate() {
            let (u, v) = project_generic(&pinhole, &distortions, pose, world);
            residuals[i * 2] = u - constant(image.x);
            residuals[i * 2 + 1] = v - constant(image.y);
        }
        residuals
    }
}

/// Reprojection residuals of one view with the camera model held fixed; only
/// the pose is estimated.
#[derive(Debug, Clone)]
pub struct PoseReprojectionCost {
    params: CameraParameters,
    world: Vec<Vector3<f64>>,
    image: Vec<Vector2<f64>>,
}

impl PoseReprojectionCost {
    pub fn new(params: CameraParameters, world: &Matrix3xX<f64>, image: &Matrix2xX<f64>) -> Self {
        Self {
            params,
            world: columns(world),
            image: columns(image),
        }
    }

    pub fn num_residuals(&self) -> usize {
        self.image.len() * 2
    }
}

impl<T: RealField> Factor<T> for PoseReprojectionCost {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let pose = &params[0];
        let (pinhole, distortions) = camera_constants::<T>(&self.params);

        let mut residuals = DVector::zeros(self.image.len() * 2);
        for (i, (world, image)) in self.world.iter().zip(&self.image).enumerate() {
            let (u, v) = project_generic(&pinhole, &distortions, pose, world);
            residuals[i * 2] = u - constant(image.x);
            residuals[i * 2 + 1] = v - constant(image.y);
        }
        residuals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distortion_formula() {
        let (xd, yd) = distort_generic(0.2, -0.1, [0.1, 0.01, 0.001, 0.002]);
        let r2: f64 = 0.05;
        let radial = 1.0 + 0.1 * r2 + 0.01 * r2 * r2;
        assert_relative_eq!(
            xd,
            0.2 * radial + 2.0 * 0.001 * 0.2 * -0.1 + 0.002 * (r2 + 2.0 * 0.04),
            epsilon = 1e-14
        );
        assert_relative_eq!(
            yd,
            -0.1 * radial + 0.001 * (r2 + 2.0 * 0.01) + 2.0 * 0.002 * 0.2 * -0.1,
            epsilon = 1e-14
        );
    }

    #[test]
    fn test_pose_cost_is_zero_at_truth() {
        let params = CameraParameters::pinhole(800.0, 800.0, 320.0, 240.0);
        let pose = DVector::from_vec(vec![0.1, -0.2, 0.05, 10.0, -5.0, 500.0]);
        let world = Matrix3xX::from_columns(&[
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(50.0, 0.0, 0.0),
            Vector3::new(0.0, 50.0, 10.0),
        ]);
        let (pinhole, distortions) = camera_constants::<f64>(&params);
        let image = Matrix2xX::from_columns(
            &world
                .column_iter()
                .map(|w| {
                    let (u, v) = project_generic(&pinhole, &distortions, &pose, &w.into_owned());
                    Vector2::new(u, v)
                })
                .collect::<Vec<_>>(),
        );
        let cost = PoseReprojectionCost::new(params, &world, &image);
        assert_eq!(cost.num_residuals(), 6);
        let residual = Factor::<f64>::residual_func(&cost, &[pose]);
        assert_relative_eq!(residual.norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fixed_aspect_ratio_overrides_fy() {
        let world = Matrix3xX::from_columns(&[Vector3::new(10.0, 20.0, 0.0)]);
        let image = Matrix2xX::from_columns(&[Vector2::new(0.0, 0.0)]);
        let pose = DVector::from_vec(vec![0.0, 0.0, 0.0, 0.0, 0.0, 100.0]);
        let intrinsics = DVector::from_vec(vec![500.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let free = ViewReprojectionCost::new(&world, &image, None);
        let fixed = ViewReprojectionCost::new(&world, &image, Some(2.0));
        let r_free = Factor::<f64>::residual_func(&free, &[intrinsics.clone(), pose.clone()]);
        let r_fixed = Factor::<f64>::residual_func(&fixed, &[intrinsics, pose]);
        assert_relative_eq!(r_free[0], r_fixed[0]);
        assert_relative_eq!(r_free[1], 0.2);
        assert_relative_eq!(r_fixed[1], 200.0);
    }
}
