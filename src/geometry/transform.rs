//! Rigid transforms between world and camera reference frames.
//!
//! A [`RelativePosition`] maps a point from a reference frame (the world, or
//! another camera) into a camera frame: `X_cam = R X_ref + T`.

use crate::geometry::rotation::{rotation_matrix_to_vector, rotation_vector_to_matrix};
use nalgebra::{Matrix3, Matrix3xX, Vector3};
use serde::{Deserialize, Serialize};

/// Extrinsic parameters: rotation (axis-angle) and translation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RelativePosition {
    /// Rotation vector in Rodrigues form.
    pub rotation: Vector3<f64>,
    pub translation: Vector3<f64>,
}

impl RelativePosition {
    pub fn new(rotation: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Builds a position from a rotation matrix. `r` must be orthonormal.
    pub fn from_matrix(r: &Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self::new(rotation_matrix_to_vector(r), translation)
    }

    pub fn identity() -> Self {
        Self::default()
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        rotation_vector_to_matrix(&self.rotation)
    }

    /// Maps one point from the reference frame into the camera frame.
    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation_matrix() * point + self.translation
    }

    /// Maps one point from the camera frame back into the reference frame.
    pub fn inverse_transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation_matrix().transpose() * (point - self.translation)
    }

    /// The transform that maps camera coordinates back to the reference frame.
    pub fn inverse(&self) -> Self {
        let rt = self.rotation_matrix().transpose();
        Self::new(-self.rotation, -(rt * self.translation))
    }
}

/// Position of `camera2` relative to `camera1`, both given relative to the
/// same world frame.
///
/// The result maps camera 1 coordinates into camera 2 coordinates:
/// `R = R2 R1ᵀ`, `T = T2 - R T1`.
pub fn calculate_relative_position(
    camera1: &RelativePosition,
    camera2: &RelativePosition,
) -> RelativePosition {
    let r1 = camera1.rotation_matrix();
    let r2 = camera2.rotation_matrix();
    let r = r2 * r1.transpose();
    let t = camera2.translation - r * camera1.translation;
    RelativePosition::from_matrix(&r, t)
}

/// Transforms world points (one per column) into the camera frame.
pub fn world_to_camera_coordinates(
    points: &Matrix3xX<f64>,
    position: &RelativePosition,
) -> Matrix3xX<f64> {
    let r = position.rotation_matrix();
    let mut result = r * points;
    for mut column in result.column_iter_mut() {
        column += position.translation;
    }
    result
}

/// Transforms camera-frame points (one per column) back into the world frame.
pub fn camera_to_world_coordinates(
    points: &Matrix3xX<f64>,
    position: &RelativePosition,
) -> Matrix3xX<f64> {
    let rt = position.rotation_matrix().transpose();
    let mut shifted = points.clone();
    for mut column in shifted.column_iter_mut() {
        column -= position.translation;
    }
    rt * shifted
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_position() -> RelativePosition {
        RelativePosition::new(Vector3::new(0.1, -0.4, 0.25), Vector3::new(12.0, -3.0, 450.0))
    }

    #[test]
    fn test_relative_position_with_itself_is_identity() {
        let p = sample_position();
        let rel = calculate_relative_position(&p, &p);
        assert_relative_eq!(rel.rotation, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(rel.translation, Vector3::zeros(), epsilon = 1e-9);
    }

    #[test]
    fn test_relative_position_chains_frames() {
        let cam1 = sample_position();
        let cam2 = RelativePosition::new(Vector3::new(-0.2, 0.3, 0.0), Vector3::new(-100.0, 5.0, 480.0));
        let rel = calculate_relative_position(&cam1, &cam2);

        let world = Vector3::new(30.0, 40.0, 10.0);
        let in_cam1 = cam1.transform_point(&world);
        let in_cam2 = cam2.transform_point(&world);
        assert_relative_eq!(rel.transform_point(&in_cam1), in_cam2, epsilon = 1e-9);
    }

    #[test]
    fn test_world_camera_round_trip() {
        let p = sample_position();
        let points = Matrix3xX::from_columns(&[
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(10.0, -20.0, 5.0),
            Vector3::new(-7.5, 3.0, 100.0),
        ]);
        let cam = world_to_camera_coordinates(&points, &p);
        assert_relative_eq!(cam.column(1).into_owned(), p.transform_point(&points.column(1).into_owned()), epsilon = 1e-12);
        let back = camera_to_world_coordinates(&cam, &p);
        assert_relative_eq!(back, points, epsilon = 1e-9);
    }

    #[test]
    fn test_inverse() {
        let p = sample_position();
        let x = Vector3::new(1.0, 2.0, 3.0);
        assert_relative_eq!(p.inverse().transform_point(&p.transform_point(&x)), x, epsilon = 1e-9);
        assert_relative_eq!(p.inverse_transform_point(&p.transform_point(&x)), x, epsilon = 1e-9);
    }
}
