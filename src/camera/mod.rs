//! Camera parameter types shared by every stage of the calibration engine.
//!
//! [`CameraParameters`] bundles the pinhole [`Intrinsics`] with the radial and
//! tangential distortion coefficients `[k1, k2, p1, p2]`. All fallible
//! operations in the crate report a [`CalibrationError`].

use nalgebra::{Matrix3, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pinhole intrinsics: focal length and principal point, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("No calibration views were given")]
    EmptyViews,
    #[error("World point views ({world}) do not match image point views ({image})")]
    ViewCountMismatch { world: usize, image: usize },
    #[error("View {view} has {found} points, at least {required} are needed")]
    TooFewPoints {
        view: usize,
        found: usize,
        required: usize,
    },
    #[error("View {view} has {world} world points but {image} image points")]
    PointCountMismatch {
        view: usize,
        world: usize,
        image: usize,
    },
    #[error("Invalid point matrix dimensions: {0}")]
    InvalidDimensions(String),
    #[error("Principal point must be set before calibration")]
    PrincipalPointNotSet,
    #[error("Focal length must be positive")]
    FocalLengthMustBePositive,
    #[error("World points of view {view} are not planar, intrinsic estimation needs a planar rig")]
    NonPlanarRig { view: usize },
    #[error("Expected image points for {expected} cameras, got {found}")]
    CameraCountMismatch { expected: usize, found: usize },
    #[error("Camera {camera} has {found} image points, expected {expected}")]
    ObservationCountMismatch {
        camera: usize,
        expected: usize,
        found: usize,
    },
    #[error("Insufficient valid points: found {found}, need at least {required}")]
    InsufficientValidPoints { found: usize, required: usize },
    #[error("No point combination satisfies the distance constraints")]
    NoValidCombination,
    #[error("Numerical error in computation: {0}")]
    NumericalError(String),
}

/// Intrinsic parameters of one camera including lens distortion.
///
/// The distortion model follows the Brown-Conrady convention:
///
/// ```text
/// x' = x (1 + k1 r² + k2 r⁴) + 2 p1 x y + p2 (r² + 2 x²)
/// y' = y (1 + k1 r² + k2 r⁴) + p1 (r² + 2 y²) + 2 p2 x y
/// ```
///
/// # Examples
///
/// ```rust
/// use calibration_tools::camera::{CameraParameters, Resolution};
///
/// let params = CameraParameters::from_resolution(&Resolution { width: 640, height: 480 });
/// assert_eq!(params.intrinsics.cx, 320.0);
/// assert_eq!(params.intrinsics.fx, 0.0);
/// assert_eq!(params.image_size().width, 641);
/// ```
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraParameters {
    /// The pinhole part of the model, [`Intrinsics`] (fx, fy, cx, cy).
    pub intrinsics: Intrinsics,
    /// Distortion coefficients `[k1, k2, p1, p2]`.
    pub distortions: [f64; 4],
}

impl CameraParameters {
    pub fn new(intrinsics: Intrinsics, distortions: [f64; 4]) -> Self {
        Self {
            intrinsics,
            distortions,
        }
    }

    /// Distortion-free camera with the given focal length and principal point.
    pub fn pinhole(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self::new(Intrinsics { fx, fy, cx, cy }, [0.0; 4])
    }

    /// Initial guess for an image of the given size: the principal point sits
    /// at the image center and everything else is zero.
    pub fn from_resolution(resolution: &Resolution) -> Self {
        Self::pinhole(
            0.0,
            0.0,
            resolution.width as f64 / 2.0,
            resolution.height as f64 / 2.0,
        )
    }

    pub fn k1(&self) -> f64 {
        self.distortions[0]
    }

    pub fn k2(&self) -> f64 {
        self.distortions[1]
    }

    pub fn p1(&self) -> f64 {
        self.distortions[2]
    }

    pub fn p2(&self) -> f64 {
        self.distortions[3]
    }

    pub fn focal_length(&self) -> Vector2<f64> {
        Vector2::new(self.intrinsics.fx, self.intrinsics.fy)
    }

    pub fn center(&self) -> Vector2<f64> {
        Vector2::new(self.intrinsics.cx, self.intrinsics.cy)
    }

    pub fn set_focal_length(&mut self, fx: f64, fy: f64) {
        self.intrinsics.fx = fx;
        self.intrinsics.fy = fy;
    }

    pub fn set_center(&mut self, cx: f64, cy: f64) {
        self.intrinsics.cx = cx;
        self.intrinsics.cy = cy;
    }

    pub fn set_distortions(&mut self, k1: f64, k2: f64, p1: f64, p2: f64) {
        self.distortions = [k1, k2, p1, p2];
    }

    pub fn has_distortion(&self) -> bool {
        self.distortions.iter().any(|d| *d != 0.0)
    }

    /// Image size implied by the principal point, `2 * center + 1`.
    ///
    /// The extra pixel keeps the principal point strictly inside the image
    /// when the center was rounded.
    pub fn image_size(&self) -> Resolution {
        Resolution {
            width: (2.0 * self.intrinsics.cx + 1.0).max(0.0) as u32,
            height: (2.0 * self.intrinsics.cy + 1.0).max(0.0) as u32,
        }
    }

    /// The 3x3 camera matrix `K`.
    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.intrinsics.fx,
            0.0,
            self.intrinsics.cx,
            0.0,
            self.intrinsics.fy,
            self.intrinsics.cy,
            0.0,
            0.0,
            1.0,
        )
    }
}

impl fmt::Debug for CameraParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CameraParameters [fx: {} fy: {} cx: {} cy: {} distortions: {:?}]",
            self.intrinsics.fx,
            self.intrinsics.fy,
            self.intrinsics.cx,
            self.intrinsics.cy,
            self.distortions,
        )
    }
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    pub fn validate_focal_length(intrinsics: &Intrinsics) -> Result<(), CalibrationError> {
        if !(intrinsics.fx > 0.0 && intrinsics.fy > 0.0) {
            return Err(CalibrationError::FocalLengthMustBePositive);
        }
        Ok(())
    }

    pub fn validate_principal_point(intrinsics: &Intrinsics) -> Result<(), CalibrationError> {
        if !(intrinsics.cx > 0.0 && intrinsics.cy > 0.0)
            || !intrinsics.cx.is_finite()
            || !intrinsics.cy.is_finite()
        {
            return Err(CalibrationError::PrincipalPointNotSet);
        }
        Ok(())
    }

    pub fn validate_intrinsics(intrinsics: &Intrinsics) -> Result<(), CalibrationError> {
        validate_focal_length(intrinsics)?;
        validate_principal_point(intrinsics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_resolution_centers_principal_point() {
        let params = CameraParameters::from_resolution(&Resolution {
            width: 752,
            height: 480,
        });
        assert_eq!(params.center(), Vector2::new(376.0, 240.0));
        assert_eq!(params.focal_length(), Vector2::zeros());
        assert!(!params.has_distortion());

        let size = params.image_size();
        assert_eq!(size.width, 753);
        assert_eq!(size.height, 481);
    }

    #[test]
    fn test_validation() {
        let mut params = CameraParameters::from_resolution(&Resolution {
            width: 640,
            height: 480,
        });
        assert_eq!(
            validation::validate_focal_length(&params.intrinsics),
            Err(CalibrationError::FocalLengthMustBePositive)
        );
        assert!(validation::validate_principal_point(&params.intrinsics).is_ok());

        params.set_focal_length(500.0, 500.0);
        assert!(validation::validate_intrinsics(&params.intrinsics).is_ok());

        params.set_center(0.0, 240.0);
        assert_eq!(
            validation::validate_intrinsics(&params.intrinsics),
            Err(CalibrationError::PrincipalPointNotSet)
        );
    }

    #[test]
    fn test_camera_matrix_layout() {
        let mut params = CameraParameters::pinhole(461.629, 460.152, 362.680, 246.049);
        params.set_distortions(-0.28, 0.07, 0.0002, 0.00002);
        let k = params.camera_matrix();
        assert_eq!(k[(0, 0)], 461.629);
        assert_eq!(k[(1, 1)], 460.152);
        assert_eq!(k[(0, 2)], 362.680);
        assert_eq!(k[(1, 2)], 246.049);
        assert_eq!(k[(2, 2)], 1.0);
        assert_eq!(params.k1(), -0.28);
        assert_eq!(params.p2(), 0.00002);
        assert!(params.has_distortion());
    }
}
