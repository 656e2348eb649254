//! Geometric building blocks: rotations, rigid transforms and linear pose
//! estimates.

use crate::camera::Resolution;
use nalgebra::{Matrix2xX, Vector2};

pub mod homography;
pub mod rotation;
pub mod transform;

pub use rotation::{rotation_matrix_to_vector, rotation_vector_to_matrix};
pub use transform::{
    calculate_relative_position, camera_to_world_coordinates, world_to_camera_coordinates,
    RelativePosition,
};

/// Generate a grid of pixel coordinates evenly distributed across the image
///
/// # Arguments
///
/// * `resolution` - Size of the image in pixels
/// * `n` - The approximate number of points to generate
///
/// # Returns
///
/// A `Matrix2xX` where each column is the center of one grid cell
pub fn sample_points(resolution: &Resolution, n: usize) -> Matrix2xX<f64> {
    let width = resolution.width as f64;
    let height = resolution.height as f64;

    // Calculate the number of cells in each dimension
    let num_cells_x = ((n as f64 * (width / height)).sqrt().round() as usize).max(1);
    let num_cells_y = ((n as f64 * (height / width)).sqrt().round() as usize).max(1);

    let cell_width = width / num_cells_x as f64;
    let cell_height = height / num_cells_y as f64;

    let mut points = Matrix2xX::zeros(num_cells_x * num_cells_y);
    let mut idx = 0;
    for i in 0..num_cells_y {
        for j in 0..num_cells_x {
            let x = (j as f64 + 0.5) * cell_width;
            let y = (i as f64 + 0.5) * cell_height;
            points.set_column(idx, &Vector2::new(x, y));
            idx += 1;
        }
    }
    points
}
