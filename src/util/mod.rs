//! Conversions between row-major point tables and the column-per-point
//! matrices used across the crate, plus image resampling with undistortion
//! maps.

use crate::camera::CalibrationError;
use crate::distortion::UndistortMap;
use image::{GrayImage, Luma};
use nalgebra::{DMatrix, Matrix2xX, Matrix3xX};

/// Converts an `N x 2` table (one point per row) into a point matrix.
///
/// # Examples
///
/// ```rust
/// use calibration_tools::util::image_points_from_rows;
/// use nalgebra::DMatrix;
///
/// let rows = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
/// let points = image_points_from_rows(&rows).unwrap();
/// assert_eq!(points[(1, 0)], 2.0);
/// assert_eq!(points[(0, 1)], 3.0);
/// ```
pub fn image_points_from_rows(rows: &DMatrix<f64>) -> Result<Matrix2xX<f64>, CalibrationError> {
    if rows.ncols() != 2 {
        return Err(CalibrationError::InvalidDimensions(format!(
            "Image points need 2 columns, got {}",
            rows.ncols()
        )));
    }
    Ok(Matrix2xX::from_fn(rows.nrows(), |r, c| rows[(c, r)]))
}

/// Converts an `N x 3` table (one point per row) into a point matrix.
pub fn world_points_from_rows(rows: &DMatrix<f64>) -> Result<Matrix3xX<f64>, CalibrationError> {
    if rows.ncols() != 3 {
        return Err(CalibrationError::InvalidDimensions(format!(
            "World points need 3 columns, got {}",
            rows.ncols()
        )));
    }
    Ok(Matrix3xX::from_fn(rows.nrows(), |r, c| rows[(c, r)]))
}

/// Sampling of a source image at a map coordinate.
pub trait MapCoordinate: Copy {
    /// Intensity at `(x, y)`, or `None` outside the image.
    fn sample(image: &GrayImage, x: Self, y: Self) -> Option<u8>;
}

impl MapCoordinate for i32 {
    fn sample(image: &GrayImage, x: i32, y: i32) -> Option<u8> {
        if x < 0 || y < 0 || x as u32 >= image.width() || y as u32 >= image.height() {
            return None;
        }
        Some(image.get_pixel(x as u32, y as u32)[0])
    }
}

impl MapCoordinate for f64 {
    fn sample(image: &GrayImage, x: f64, y: f64) -> Option<u8> {
        const EDGE: f64 = 1e-6;
        let (max_x, max_y) = (image.width() as f64 - 1.0, image.height() as f64 - 1.0);
        if !(x > -EDGE && y > -EDGE && x < max_x + EDGE && y < max_y + EDGE) {
            return None;
        }
        let (x, y) = (x.clamp(0.0, max_x), y.clamp(0.0, max_y));

        let (x0, y0) = (x.floor() as u32, y.floor() as u32);
        let x1 = (x0 + 1).min(image.width() - 1);
        let y1 = (y0 + 1).min(image.height() - 1);
        let (fx, fy) = (x - x0 as f64, y - y0 as f64);

        let p = |x, y| image.get_pixel(x, y)[0] as f64;
        let top = p(x0, y0) * (1.0 - fx) + p(x1, y0) * fx;
        let bottom = p(x0, y1) * (1.0 - fx) + p(x1, y1) * fx;
        let value = top * (1.0 - fy) + bottom * fy;
        Some(value.round().clamp(0.0, 255.0) as u8)
    }
}

/// Resamples `image` through an undistortion map. Integer maps pick the
/// nearest pixel, floating-point maps interpolate bilinearly. Pixels mapped
/// outside the source are black.
pub fn remap_gray<T: MapCoordinate>(image: &GrayImage, map: &UndistortMap<T>) -> GrayImage {
    let mut output = GrayImage::new(map.cols as u32, map.rows as u32);
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        let value = map
            .get(y as usize, x as usize)
            .and_then(|[sx, sy]| T::sample(image, sx, sy))
            .unwrap_or(0);
        *pixel = Luma([value]);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraParameters;
    use crate::distortion::{undistort_map, Nearest, Unrounded};

    fn gradient(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([((x * 3 + y * 2) % 256) as u8]))
    }

    #[test]
    fn test_row_adapters() {
        let rows = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let world = world_points_from_rows(&rows).unwrap();
        assert_eq!(world.ncols(), 3);
        assert_eq!(world.column(2).as_slice(), &[7.0, 8.0, 9.0]);

        assert!(matches!(
            image_points_from_rows(&rows),
            Err(CalibrationError::InvalidDimensions(_))
        ));
        let flat = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        assert!(matches!(
            world_points_from_rows(&flat),
            Err(CalibrationError::InvalidDimensions(_))
        ));
    }

    #[test]
    fn test_remap_without_distortion_copies_image() {
        let image = gradient(40, 30);
        let params = CameraParameters::pinhole(200.0, 200.0, 19.5, 14.5);

        let nearest = remap_gray(&image, &undistort_map::<Nearest>(30, 40, &params).unwrap());
        assert_eq!(nearest, image);

        let bilinear = remap_gray(&image, &undistort_map::<Unrounded>(30, 40, &params).unwrap());
        assert_eq!(bilinear.dimensions(), (40, 30));
        for (a, b) in bilinear.pixels().zip(image.pixels()) {
            assert!((a[0] as i32 - b[0] as i32).abs() <= 1);
        }
    }

    #[test]
    fn test_bilinear_sample() {
        let image = GrayImage::from_raw(2, 2, vec![0, 100, 200, 50]).unwrap();
        assert_eq!(f64::sample(&image, 0.5, 0.0), Some(50));
        assert_eq!(f64::sample(&image, 0.5, 0.5), Some(88));
        assert_eq!(f64::sample(&image, 1.5, 0.0), None);
        assert_eq!(i32::sample(&image, 1, 1), Some(50));
        assert_eq!(i32::sample(&image, -1, 0), None);
    }
}
