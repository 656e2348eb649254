//! The `optimization` module wraps the `tiny_solver` Levenberg-Marquardt
//! optimizer used by lens undistortion, pose estimation and calibration.
//!
//! Residual blocks live in [`factors`]. [`SolverSettings`] carries the
//! convergence thresholds and [`solve`] maps a failed run onto
//! [`CalibrationError::NumericalError`].

use crate::camera::CalibrationError;
use nalgebra::{DVector, Matrix2xX};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;
use tiny_solver::LevenbergMarquardtOptimizer;

pub mod factors;

/// Convergence thresholds handed to the Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    pub max_iterations: usize,
    pub min_abs_error_decrease: f64,
    pub min_rel_error_decrease: f64,
    pub min_error: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            min_abs_error_decrease: 1e-14,
            min_rel_error_decrease: 1e-12,
            min_error: 1e-20,
        }
    }
}

impl SolverSettings {
    fn to_optimizer_options(self) -> OptimizerOptions {
        OptimizerOptions {
            max_iteration: self.max_iterations,
            min_abs_error_decrease_threshold: self.min_abs_error_decrease,
            min_rel_error_decrease_threshold: self.min_rel_error_decrease,
            min_error_threshold: self.min_error,
            ..OptimizerOptions::default()
        }
    }
}

/// Runs Levenberg-Marquardt on `problem` starting from `initial`.
pub fn solve(
    problem: &Problem,
    initial: &HashMap<String, DVector<f64>>,
    settings: &SolverSettings,
) -> Result<HashMap<String, DVector<f64>>, CalibrationError> {
    let optimizer = LevenbergMarquardtOptimizer::default();
    optimizer
        .optimize(problem, initial, Some(settings.to_optimizer_options()))
        .ok_or_else(|| CalibrationError::NumericalError("Optimization failed".to_string()))
}

/// Fetches one variable from a solver result.
pub(crate) fn variable<'a>(
    result: &'a HashMap<String, DVector<f64>>,
    name: &str,
) -> Result<&'a DVector<f64>, CalibrationError> {
    result.get(name).ok_or_else(|| {
        CalibrationError::NumericalError(format!("Solver result is missing variable {name}"))
    })
}

/// Summary statistics of per-point reprojection distances, in pixels.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionError {
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
}

impl ProjectionError {
    /// Statistics of the column-wise distances between `observed` and
    /// `projected`. Columns with a NaN coordinate are ignored.
    pub fn between(observed: &Matrix2xX<f64>, projected: &Matrix2xX<f64>) -> Self {
        let mut errors: Vec<f64> = observed
            .column_iter()
            .zip(projected.column_iter())
            .map(|(o, p)| (o - p).norm())
            .filter(|e| !e.is_nan())
            .collect();
        if errors.is_empty() {
            return Self {
                rmse: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
                mean: f64::NAN,
                stddev: f64::NAN,
                median: f64::NAN,
            };
        }
        errors.sort_by(|a, b| a.total_cmp(b));

        let n = errors.len() as f64;
        let mean = errors.iter().sum::<f64>() / n;
        let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt();
        let variance = errors.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
        let mid = errors.len() / 2;
        let median = if errors.len() % 2 == 0 {
            (errors[mid - 1] + errors[mid]) / 2.0
        } else {
            errors[mid]
        };

        Self {
            rmse,
            min: errors[0],
            max: errors[errors.len() - 1],
            mean,
            stddev: variance.sqrt(),
            median,
        }
    }
}

impl fmt::Debug for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Projection Error [ rmse: {}, min: {}, max: {}, mean: {}, stddev: {}, median: {} ]",
            self.rmse, self.min, self.max, self.mean, self.stddev, self.median
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    #[test]
    fn test_projection_error_statistics() {
        let observed = Matrix2xX::from_columns(&[
            Vector2::new(0.0, 0.0),
            Vector2::new(10.0, 10.0),
            Vector2::new(5.0, 5.0),
            Vector2::new(f64::NAN, 1.0),
        ]);
        let projected = Matrix2xX::from_columns(&[
            Vector2::new(3.0, 4.0),
            Vector2::new(10.0, 11.0),
            Vector2::new(5.0, 5.0),
            Vector2::new(0.0, 0.0),
        ]);
        let stats = ProjectionError::between(&observed, &projected);
        assert_relative_eq!(stats.min, 0.0);
        assert_relative_eq!(stats.max, 5.0);
        assert_relative_eq!(stats.mean, 2.0);
        assert_relative_eq!(stats.median, 1.0);
        assert_relative_eq!(stats.rmse, (26.0f64 / 3.0).sqrt());
    }

    #[test]
    fn test_projection_error_all_missing() {
        let observed = Matrix2xX::from_columns(&[Vector2::new(f64::NAN, f64::NAN)]);
        let stats = ProjectionError::between(&observed, &observed);
        assert!(stats.rmse.is_nan());
    }

    #[test]
    fn test_default_settings_are_tighter_than_solver_defaults() {
        let ours = SolverSettings::default().to_optimizer_options();
        let theirs = OptimizerOptions::default();
        assert!(ours.min_error_threshold <= theirs.min_error_threshold);
        assert!(ours.min_abs_error_decrease_threshold <= theirs.min_abs_error_decrease_threshold);
    }
}
