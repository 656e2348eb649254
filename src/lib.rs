//! Calibration Tools Library
//!
//! Camera calibration and multi-view geometry for pinhole cameras with
//! Brown-Conrady lens distortion:
//! - Rotation vector / matrix conversions and rigid transforms
//! - Applying and removing lens distortion, undistortion maps
//! - Multi-view calibration and single-view pose estimation
//! - Midpoint triangulation over any number of calibrated cameras
//! - Combinatorial matching of a known point pattern to detected points
//!
//! Nonlinear fits use the Levenberg-Marquardt optimizer of `tiny-solver`.
//! Point sets are `nalgebra` matrices with one point per column; a NaN
//! coordinate marks a missing observation.

pub mod calibration;
pub mod camera;
pub mod distortion;
pub mod geometry;
pub mod optimization;
pub mod point_finder;
pub mod triangulation;
pub mod util;

// Re-export commonly used types
pub use calibration::{calculate_camera_position, calibrate_camera, CalibrationOptions};
pub use camera::{CalibrationError, CameraParameters, Intrinsics, Resolution};
pub use geometry::{calculate_relative_position, RelativePosition};
pub use optimization::{ProjectionError, SolverSettings};
pub use point_finder::{CalibrationPointFinder, PointFinderConfig, PointFinderResult};
pub use triangulation::StereoTriangulator;
