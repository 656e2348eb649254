//! Conversions between axis-angle rotation vectors and rotation matrices.
//!
//! A rotation vector `v` encodes a rotation of `|v|` radians about the unit
//! axis `v / |v|`. [`rotation_vector_to_matrix`] evaluates Rodrigues' formula
//! and [`rotation_matrix_to_vector`] inverts it.

use nalgebra::{DMatrix, Matrix3, RealField, Vector3};

/// Angles below this are treated as no rotation.
const ANGLE_EPSILON: f64 = 1e-12;

/// Below this `sin θ` near a half turn the axis cannot be read from the
/// antisymmetric part.
const SINE_EPSILON: f64 = 1e-7;

/// Antisymmetric cross-product matrix `[v]ₓ`, so that `[v]ₓ w = v × w`.
pub fn cross_matrix<T: RealField>(v: &Vector3<T>) -> Matrix3<T> {
    let zero = T::zero();
    Matrix3::new(
        zero.clone(),
        -v.z.clone(),
        v.y.clone(),
        v.z.clone(),
        zero.clone(),
        -v.x.clone(),
        -v.y.clone(),
        v.x.clone(),
        zero,
    )
}

/// Converts a rotation vector to a 3x3 rotation matrix with Rodrigues' formula:
/// `R = I + M sin θ + M² (1 - cos θ)` where `M` is the cross-product matrix of
/// the unit axis.
///
/// # Examples
///
/// ```rust
/// use calibration_tools::geometry::rotation::rotation_vector_to_matrix;
/// use nalgebra::{Matrix3, Vector3};
///
/// let r = rotation_vector_to_matrix(&Vector3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2));
/// let x = r * Vector3::new(1.0, 0.0, 0.0);
/// assert!((x - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-12);
/// assert_eq!(rotation_vector_to_matrix(&Vector3::zeros()), Matrix3::identity());
/// ```
pub fn rotation_vector_to_matrix(v: &Vector3<f64>) -> Matrix3<f64> {
    let theta = v.norm();
    if theta < ANGLE_EPSILON {
        return Matrix3::identity();
    }
    let m = cross_matrix(&(v / theta));
    Matrix3::identity() + m * theta.sin() + m * m * (1.0 - theta.cos())
}

/// Rodrigues' formula for any [`RealField`], used inside solver residuals where
/// `T` carries derivatives.
///
/// Near zero the first-order expansion `I + [v]ₓ` replaces the exact formula so
/// that the derivative with respect to `v` stays defined.
pub fn rotation_vector_to_matrix_generic<T: RealField>(v: &Vector3<T>) -> Matrix3<T> {
    let theta2 = v.norm_squared();
    let eps = T::from_f64(ANGLE_EPSILON * ANGLE_EPSILON).unwrap();
    if theta2 < eps {
        return Matrix3::identity() + cross_matrix(v);
    }
    let theta = theta2.sqrt();
    let m = cross_matrix(&(v / theta.clone()));
    let m2 = &m * &m;
    Matrix3::identity() + m * theta.clone().sin() + m2 * (T::one() - theta.cos())
}

/// Converts a rotation matrix back to a rotation vector.
///
/// `M sin θ = (R - Rᵀ) / 2` gives the axis scaled by `sin θ` and
/// `cos θ = (tr R - 1) / 2`, so `θ = atan2(sin θ, cos θ)` lies in `[0, π]`.
/// When `sin θ` vanishes at `θ = π` the axis is taken from the symmetric part
/// `(R + I) / 2 = n nᵀ` instead.
pub fn rotation_matrix_to_vector(r: &Matrix3<f64>) -> Vector3<f64> {
    let axis_sin = Vector3::new(
        r[(2, 1)] - r[(1, 2)],
        r[(0, 2)] - r[(2, 0)],
        r[(1, 0)] - r[(0, 1)],
    ) * 0.5;
    let sin_theta = axis_sin.norm();
    let cos_theta = ((r.trace() - 1.0) * 0.5).clamp(-1.0, 1.0);
    let theta = sin_theta.atan2(cos_theta);

    // Small angles keep the antisymmetric part, where θ / sin θ → 1.
    if sin_theta > SINE_EPSILON || cos_theta > 0.0 {
        if sin_theta > 0.0 {
            return axis_sin * (theta / sin_theta);
        }
        return axis_sin;
    }

    // θ ≈ π: R + I = 2 n nᵀ. The largest diagonal entry gives the best column.
    let nnt = (r + Matrix3::identity()) * 0.5;
    let i = (0..3)
        .max_by(|&a, &b| nnt[(a, a)].total_cmp(&nnt[(b, b)]))
        .unwrap_or(0);
    let mut axis: Vector3<f64> = nnt.column(i).into_owned() / nnt[(i, i)].max(0.0).sqrt();
    axis.normalize_mut();
    if axis.dot(&axis_sin) < 0.0 {
        axis = -axis;
    }
    axis * theta
}

/// Dynamically sized variant of [`rotation_matrix_to_vector`]. Anything that
/// is not 3x3 maps to the zero vector.
pub fn rotation_matrix_to_vector_dyn(r: &DMatrix<f64>) -> Vector3<f64> {
    if r.nrows() != 3 || r.ncols() != 3 {
        return Vector3::zeros();
    }
    rotation_matrix_to_vector(&r.fixed_view::<3, 3>(0, 0).into_owned())
}
