//! Finding a known calibration pattern among candidate image points.
//!
//! The finder does not know which detected point belongs to which pattern
//! point. It tries every `k`-subset of the candidates that satisfies the
//! pattern's distance window, orders each subset by angle around its centroid
//! and scores every cyclic start with a pose fit. The ordering with the lowest
//! reprojection error wins.

use crate::calibration::{calculate_camera_position, MIN_POINTS};
use crate::camera::{CalibrationError, CameraParameters};
use crate::distortion::{perspective_projection, undistort};
use crate::geometry::{world_to_camera_coordinates, RelativePosition};
use itertools::Itertools;
use log::{debug, info, warn};
use nalgebra::{DMatrix, Matrix2xX, Matrix3xX};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Search window of the point finder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointFinderConfig {
    /// Minimum pixel distance between any two pattern points.
    pub min_distance: f64,
    /// Maximum pixel distance between any two pattern points. Candidates with
    /// no neighbour this close are discarded up front.
    pub max_distance: f64,
    /// Score subsets on the rayon thread pool.
    pub parallel: bool,
}

impl Default for PointFinderConfig {
    fn default() -> Self {
        Self {
            min_distance: 0.0,
            max_distance: f64::INFINITY,
            parallel: true,
        }
    }
}

/// Best match found by [`CalibrationPointFinder::calculate_camera_position`].
#[derive(Debug, Clone, PartialEq)]
pub struct PointFinderResult {
    /// Camera pose relative to the world points.
    pub position: RelativePosition,
    /// Mean squared reprojection error per point, in normalized coordinates.
    pub error: f64,
    /// The selected candidates, column `i` matching world point `i`.
    pub image_points: Matrix2xX<f64>,
}

#[derive(Debug, Clone)]
struct Match {
    error: f64,
    /// (subset number, rotation) of the ordering, used to break ties.
    rank: (usize, usize),
    position: RelativePosition,
    indices: Vec<usize>,
}

fn better(a: Match, b: Match) -> Match {
    match a.error.total_cmp(&b.error).then(a.rank.cmp(&b.rank)) {
        Ordering::Greater => b,
        _ => a,
    }
}

#[derive(Debug, Clone, Default)]
pub struct CalibrationPointFinder {
    config: PointFinderConfig,
}

impl CalibrationPointFinder {
    pub fn new(config: PointFinderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PointFinderConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PointFinderConfig) {
        self.config = config;
    }

    /// Picks the candidates matching `world` and solves the camera pose.
    ///
    /// `world` must list the pattern points in order of increasing angle
    /// around their centroid as they appear in the image, so that the
    /// candidates can be matched up to a cyclic rotation. Candidates with a
    /// NaN coordinate are ignored.
    pub fn calculate_camera_position(
        &self,
        world: &Matrix3xX<f64>,
        image: &Matrix2xX<f64>,
        params: &CameraParameters,
    ) -> Result<PointFinderResult, CalibrationError> {
        let k = world.ncols();
        if k < MIN_POINTS {
            return Err(CalibrationError::TooFewPoints {
                view: 0,
                found: k,
                required: MIN_POINTS,
            });
        }

        let valid: Vec<usize> = (0..image.ncols())
            .filter(|&i| !image[(0, i)].is_nan() && !image[(1, i)].is_nan())
            .collect();
        if valid.len() < k {
            return Err(CalibrationError::InsufficientValidPoints {
                found: valid.len(),
                required: k,
            });
        }

        let candidates = self.prune(&Matrix2xX::from_fn(valid.len(), |r, c| image[(r, valid[c])]));
        if candidates.ncols() < k {
            debug!(
                "{} of {} candidates survive pruning, {} needed",
                candidates.ncols(),
                valid.len(),
                k
            );
            return Err(CalibrationError::NoValidCombination);
        }

        let normalized = undistort(&candidates, params)?;
        let distances = squared_distances(&candidates);
        let pairs: Vec<(usize, usize)> = (0..k).tuple_combinations().collect();
        let (min2, max2) = (
            self.config.min_distance * self.config.min_distance,
            self.config.max_distance * self.config.max_distance,
        );

        let n = candidates.ncols();
        match subset_count(n, k) {
            Some(count) => info!("Searching {k} of {n} candidates, {count} subsets"),
            None => info!("Searching {k} of {n} candidates, more than {} subsets", usize::MAX),
        }

        let subsets = (0..n)
            .combinations(k)
            .enumerate()
            .filter(|(_, subset)| {
                pairs.iter().all(|&(a, b)| {
                    let d = distances[(subset[a], subset[b])];
                    d >= min2 && d <= max2
                })
            });

        let score = |(number, subset): (usize, Vec<usize>)| {
            Self::best_rotation(number, &subset, world, &candidates, &normalized, params)
        };
        let best = if self.config.parallel {
            subsets
                .par_bridge()
                .filter_map(score)
                .reduce_with(better)
        } else {
            subsets.filter_map(score).reduce(better)
        };

        let best = best.ok_or(CalibrationError::NoValidCombination)?;
        let image_points = Matrix2xX::from_fn(k, |r, c| candidates[(r, best.indices[c])]);
        let result = PointFinderResult {
            position: best.position,
            error: best.error / k as f64,
            image_points,
        };
        info!("Best match error {} at {:?}", result.error, result.position);
        Ok(result)
    }

    /// Drops candidates whose nearest neighbour is farther than the maximum
    /// pattern distance.
    fn prune(&self, candidates: &Matrix2xX<f64>) -> Matrix2xX<f64> {
        let n = candidates.ncols();
        let distances = squared_distances(candidates);
        let max2 = self.config.max_distance * self.config.max_distance;
        let keep: Vec<usize> = (0..n)
            .filter(|&i| (0..n).any(|j| j != i && distances[(i, j)] <= max2))
            .collect();
        Matrix2xX::from_fn(keep.len(), |r, c| candidates[(r, keep[c])])
    }

    /// Scores every cyclic start of the angular ordering of one subset.
    fn best_rotation(
        number: usize,
        subset: &[usize],
        world: &Matrix3xX<f64>,
        candidates: &Matrix2xX<f64>,
        normalized: &Matrix2xX<f64>,
        params: &CameraParameters,
    ) -> Option<Match> {
        let ordered = angular_order(subset, candidates);
        let k = ordered.len();
        let mut best: Option<Match> = None;

        for rotation in 0..k {
            let indices: Vec<usize> = (0..k).map(|i| ordered[(i + rotation) % k]).collect();
            let image = Matrix2xX::from_fn(k, |r, c| candidates[(r, indices[c])]);
            let position = match calculate_camera_position(world, &image, params) {
                Ok(position) => position,
                Err(e) => {
                    warn!("Pose fit of subset {number} rotation {rotation} failed: {e}");
                    continue;
                }
            };

            let projected = perspective_projection(&world_to_camera_coordinates(world, &position));
            let error: f64 = indices
                .iter()
                .enumerate()
                .map(|(c, &i)| (projected.column(c) - normalized.column(i)).norm_squared())
                .sum();
            if !error.is_finite() {
                continue;
            }

            let candidate = Match {
                error,
                rank: (number, rotation),
                position,
                indices,
            };
            best = Some(match best {
                Some(current) => better(current, candidate),
                None => candidate,
            });
        }
        best
    }
}

/// Pairwise squared distances between the columns of `points`.
fn squared_distances(points: &Matrix2xX<f64>) -> DMatrix<f64> {
    let n = points.ncols();
    DMatrix::from_fn(n, n, |i, j| (points.column(i) - points.column(j)).norm_squared())
}

/// Subset indices sorted by increasing angle around the subset's centroid.
fn angular_order(subset: &[usize], points: &Matrix2xX<f64>) -> Vec<usize> {
    let n = subset.len() as f64;
    let (cx, cy) = subset.iter().fold((0.0, 0.0), |(x, y), &i| {
        (x + points[(0, i)], y + points[(1, i)])
    });
    let (cx, cy) = (cx / n, cy / n);

    let mut angles: Vec<(f64, usize)> = subset
        .iter()
        .map(|&i| ((points[(1, i)] - cy).atan2(points[(0, i)] - cx), i))
        .collect();
    angles.sort_by(|a, b| a.0.total_cmp(&b.0));
    angles.into_iter().map(|(_, i)| i).collect()
}

/// Number of `k`-subsets of `n` candidates, `None` once it overflows.
fn subset_count(n: usize, k: usize) -> Option<usize> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    // C(n, i) (n - i) is always divisible by i + 1.
    (0..k).try_fold(1usize, |acc, i| acc.checked_mul(n - i).map(|v| v / (i + 1)))
}
