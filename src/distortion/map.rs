//! Dense undistortion lookup tables.

use super::{normalized_to_pixel, undistort_point};
use crate::camera::{CalibrationError, CameraParameters};
use rayon::prelude::*;

/// Turns a floating-point source coordinate into the map's element type.
pub trait RoundingPolicy {
    type Output: Copy + Send + Sync;

    fn apply(value: f64) -> Self::Output;
}

/// Keeps sub-pixel source coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Unrounded;

impl RoundingPolicy for Unrounded {
    type Output = f64;

    fn apply(value: f64) -> f64 {
        value
    }
}

/// Rounds source coordinates to the nearest pixel.
#[derive(Debug, Clone, Copy)]
pub struct Nearest;

impl RoundingPolicy for Nearest {
    type Output = i32;

    fn apply(value: f64) -> i32 {
        value.round() as i32
    }
}

/// Row-major table giving, for every pixel of the undistorted image, the
/// `[x, y]` coordinate to sample in the distorted source image.
#[derive(Debug, Clone, PartialEq)]
pub struct UndistortMap<T> {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<[T; 2]>,
}

impl<T: Copy> UndistortMap<T> {
    pub fn get(&self, row: usize, col: usize) -> Option<[T; 2]> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.data.get(row * self.cols + col).copied()
    }
}

/// Builds the undistortion map of a `rows` x `cols` image.
///
/// The output image spans the bounding box of the four undistorted image
/// corners, sampled with a uniform step so that it has the same size as the
/// input.
pub fn undistort_map<P: RoundingPolicy>(
    rows: usize,
    cols: usize,
    params: &CameraParameters,
) -> Result<UndistortMap<P::Output>, CalibrationError> {
    if rows == 0 || cols == 0 {
        return Err(CalibrationError::InvalidDimensions(format!(
            "Undistortion map needs a non-empty image, got {rows}x{cols}"
        )));
    }

    let right = (cols - 1) as f64;
    let bottom = (rows - 1) as f64;
    let corners = [(0.0, 0.0), (right, 0.0), (0.0, bottom), (right, bottom)];

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (u, v) in corners {
        let p = undistort_point(params, u, v)?;
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }

    let step_x = (max_x - min_x) / (cols.max(2) - 1) as f64;
    let step_y = (max_y - min_y) / (rows.max(2) - 1) as f64;
    log::debug!(
        "Undistortion map {rows}x{cols}: x [{min_x}, {max_x}], y [{min_y}, {max_y}]"
    );

    let mut data = vec![[P::apply(0.0); 2]; rows * cols];
    data.par_chunks_mut(cols).enumerate().for_each(|(row, line)| {
        let y = min_y + row as f64 * step_y;
        for (col, cell) in line.iter_mut().enumerate() {
            let x = min_x + col as f64 * step_x;
            let source = normalized_to_pixel(params, x, y);
            *cell = [P::apply(source.x), P::apply(source.y)];
        }
    });

    Ok(UndistortMap { rows, cols, data })
}
