//! Linear initial estimates for pose solving.
//!
//! These are direct linear transform (DLT) solutions with Hartley
//! normalization. They are only accurate enough to seed the nonlinear
//! refinement in [`crate::calibration`].

use crate::geometry::transform::RelativePosition;
use nalgebra::{
    DMatrix, DVector, Matrix2xX, Matrix3, Matrix3x4, Matrix3xX, Matrix4, Vector3, Vector4,
};

/// Relative tolerance (to the point spread) for calling a point set planar.
const PLANARITY_TOLERANCE: f64 = 1e-6;

/// Right singular vector of `a` belonging to the smallest singular value.
fn null_vector(a: DMatrix<f64>) -> Option<DVector<f64>> {
    let ncols = a.ncols();
    let a = if a.nrows() < ncols {
        a.resize_vertically(ncols, 0.0)
    } else {
        a
    };
    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let (idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    Some(v_t.row(idx).transpose())
}

/// Similarity transform moving the centroid to the origin and scaling the
/// mean distance to `sqrt(2)`.
fn normalization_2d(points: &Matrix2xX<f64>) -> Matrix3<f64> {
    let n = points.ncols().max(1) as f64;
    let centroid = points.column_sum() / n;
    let mean_dist = points
        .column_iter()
        .map(|p| (p - centroid).norm())
        .sum::<f64>()
        / n;
    let s = if mean_dist > f64::EPSILON {
        2f64.sqrt() / mean_dist
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * centroid.x, 0.0, s, -s * centroid.y, 0.0, 0.0, 1.0)
}

fn normalization_3d(points: &Matrix3xX<f64>) -> Matrix4<f64> {
    let n = points.ncols().max(1) as f64;
    let centroid = points.column_sum() / n;
    let mean_dist = points
        .column_iter()
        .map(|p| (p - centroid).norm())
        .sum::<f64>()
        / n;
    let s = if mean_dist > f64::EPSILON {
        3f64.sqrt() / mean_dist
    } else {
        1.0
    };
    let mut t = Matrix4::identity() * s;
    t[(3, 3)] = 1.0;
    t[(0, 3)] = -s * centroid.x;
    t[(1, 3)] = -s * centroid.y;
    t[(2, 3)] = -s * centroid.z;
    t
}

fn apply_2d(t: &Matrix3<f64>, points: &Matrix2xX<f64>) -> Matrix2xX<f64> {
    let mut out = Matrix2xX::zeros(points.ncols());
    for (i, p) in points.column_iter().enumerate() {
        let h = t * Vector3::new(p[0], p[1], 1.0);
        out[(0, i)] = h.x / h.z;
        out[(1, i)] = h.y / h.z;
    }
    out
}

/// Estimates the homography `H` with `dst ~ H src` from at least 4 point pairs.
///
/// Returns `None` for fewer than 4 pairs or a degenerate configuration.
pub fn find_homography(src: &Matrix2xX<f64>, dst: &Matrix2xX<f64>) -> Option<Matrix3<f64>> {
    let n = src.ncols();
    if n < 4 || dst.ncols() != n {
        return None;
    }
    let t_src = normalization_2d(src);
    let t_dst = normalization_2d(dst);
    let s = apply_2d(&t_src, src);
    let d = apply_2d(&t_dst, dst);

    let mut a = DMatrix::zeros(2 * n, 9);
    for i in 0..n {
        let (x, y) = (s[(0, i)], s[(1, i)]);
        let (u, v) = (d[(0, i)], d[(1, i)]);
        let r = 2 * i;
        a[(r, 0)] = -x;
        a[(r, 1)] = -y;
        a[(r, 2)] = -1.0;
        a[(r, 6)] = u * x;
        a[(r, 7)] = u * y;
        a[(r, 8)] = u;
        a[(r + 1, 3)] = -x;
        a[(r + 1, 4)] = -y;
        a[(r + 1, 5)] = -1.0;
        a[(r + 1, 6)] = v * x;
        a[(r + 1, 7)] = v * y;
        a[(r + 1, 8)] = v;
    }

    let h = null_vector(a)?;
    let h_norm = Matrix3::from_row_slice(h.as_slice());
    let h = t_dst.try_inverse()? * h_norm * t_src;
    if h[(2, 2)].abs() > f64::EPSILON {
        Some(h / h[(2, 2)])
    } else {
        Some(h)
    }
}

/// Local frame of a planar point set: `q = rotation * (X - origin)` has `q.z ≈ 0`.
#[derive(Debug, Clone, Copy)]
pub struct PlaneFrame {
    pub origin: Vector3<f64>,
    pub rotation: Matrix3<f64>,
}

impl PlaneFrame {
    /// In-plane coordinates of the given points.
    pub fn project(&self, points: &Matrix3xX<f64>) -> Matrix2xX<f64> {
        let mut out = Matrix2xX::zeros(points.ncols());
        for (i, p) in points.column_iter().enumerate() {
            let q = self.rotation * (p - self.origin);
            out[(0, i)] = q.x;
            out[(1, i)] = q.y;
        }
        out
    }
}

/// Least-squares plane through the points, with the largest distance of any
/// point from it. `None` for fewer than 3 points or coincident points.
pub fn best_fit_frame(points: &Matrix3xX<f64>) -> Option<(PlaneFrame, f64)> {
    let n = points.ncols();
    if n < 3 {
        return None;
    }
    let origin = points.column_sum() / n as f64;
    let mut centered = points.clone();
    for mut c in centered.column_iter_mut() {
        c -= origin;
    }
    let spread = centered
        .column_iter()
        .map(|c| c.norm())
        .fold(0.0f64, f64::max);
    if spread <= f64::EPSILON {
        return None;
    }

    let eig = (&centered * centered.transpose()).symmetric_eigen();
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));
    let e1: Vector3<f64> = eig.eigenvectors.column(order[0]).into_owned();
    let e2: Vector3<f64> = eig.eigenvectors.column(order[1]).into_owned();
    let normal = e1.cross(&e2);

    let max_offset = centered
        .column_iter()
        .map(|c| normal.dot(&c).abs())
        .fold(0.0f64, f64::max);

    // Keep axis-aligned planes (the usual z = 0 rig) in their own axes.
    let rotation = if normal.z.abs() > 1.0 - 1e-12 {
        Matrix3::identity()
    } else {
        Matrix3::from_rows(&[e1.transpose(), e2.transpose(), normal.transpose()])
    };
    Some((PlaneFrame { origin, rotation }, max_offset / spread))
}

/// Frame of the plane through the points if every point lies on it, `None`
/// otherwise.
pub fn planar_frame(points: &Matrix3xX<f64>) -> Option<PlaneFrame> {
    best_fit_frame(points)
        .filter(|(_, offset)| *offset <= PLANARITY_TOLERANCE)
        .map(|(frame, _)| frame)
}

/// Closest rotation matrix in the Frobenius sense.
pub fn orthonormalize(m: &Matrix3<f64>) -> Matrix3<f64> {
    let svd = m.svd(true, true);
    match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => {
            let mut r = u * v_t;
            if r.determinant() < 0.0 {
                let mut u = u;
                u.column_mut(2).neg_mut();
                r = u * v_t;
            }
            r
        }
        _ => Matrix3::identity(),
    }
}

/// Decomposes a homography from plane coordinates `(x, y, 1)` to normalized
/// image coordinates into a camera pose relative to the plane frame.
pub fn pose_from_homography(h: &Matrix3<f64>) -> Option<RelativePosition> {
    let h1: Vector3<f64> = h.column(0).into_owned();
    let h2: Vector3<f64> = h.column(1).into_owned();
    let h3: Vector3<f64> = h.column(2).into_owned();
    let norm = 0.5 * (h1.norm() + h2.norm());
    if norm <= f64::EPSILON {
        return None;
    }
    let mut lambda = 1.0 / norm;
    // The plane must lie in front of the camera.
    if h3.z * lambda < 0.0 {
        lambda = -lambda;
    }
    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    let r = orthonormalize(&Matrix3::from_columns(&[r1, r2, r3]));
    Some(RelativePosition::from_matrix(&r, h3 * lambda))
}

/// Pose of a camera observing a planar rig, from normalized image points.
pub fn planar_pose(
    frame: &PlaneFrame,
    world: &Matrix3xX<f64>,
    normalized: &Matrix2xX<f64>,
) -> Option<RelativePosition> {
    let plane = frame.project(world);
    let h = find_homography(&plane, normalized)?;
    let local = pose_from_homography(&h)?;
    let r = local.rotation_matrix() * frame.rotation;
    let t = local.translation - r * frame.origin;
    Some(RelativePosition::from_matrix(&r, t))
}

/// Pose from at least 6 non-coplanar points via the DLT of the projection
/// matrix `[R | t]` in normalized image coordinates.
pub fn dlt_pose(world: &Matrix3xX<f64>, normalized: &Matrix2xX<f64>) -> Option<RelativePosition> {
    let n = world.ncols();
    if n < 6 || normalized.ncols() != n {
        return None;
    }
    let t3 = normalization_3d(world);
    let t2 = normalization_2d(normalized);
    let img = apply_2d(&t2, normalized);

    let mut a = DMatrix::zeros(2 * n, 12);
    for i in 0..n {
        let w = world.column(i);
        let p = t3 * Vector4::new(w[0], w[1], w[2], 1.0);
        let (u, v) = (img[(0, i)], img[(1, i)]);
        for k in 0..4 {
            a[(2 * i, k)] = p[k];
            a[(2 * i, 8 + k)] = -u * p[k];
            a[(2 * i + 1, 4 + k)] = p[k];
            a[(2 * i + 1, 8 + k)] = -v * p[k];
        }
    }
    let sol = null_vector(a)?;
    let p_norm = Matrix3x4::from_row_slice(sol.as_slice());
    let p = t2.try_inverse()? * p_norm * t3;

    let m: Matrix3<f64> = p.fixed_view::<3, 3>(0, 0).into_owned();
    let det = m.determinant();
    if det.abs() <= f64::EPSILON {
        return None;
    }
    let sign = det.signum();
    let svd = (m * sign).svd(false, false);
    let scale = svd.singular_values.mean();
    let r = orthonormalize(&(m * sign));
    let t = p.column(3) * (sign / scale);
    Some(RelativePosition::from_matrix(&r, t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    fn project_normalized(world: &Matrix3xX<f64>, pose: &RelativePosition) -> Matrix2xX<f64> {
        let mut out = Matrix2xX::zeros(world.ncols());
        for (i, p) in world.column_iter().enumerate() {
            let c = pose.transform_point(&p.into_owned());
            out.set_column(i, &Vector2::new(c.x / c.z, c.y / c.z));
        }
        out
    }

    fn grid(z: impl Fn(f64, f64) -> f64) -> Matrix3xX<f64> {
        let mut cols = Vec::new();
        for i in 0..4 {
            for j in 0..3 {
                let (x, y) = (i as f64 * 30.0, j as f64 * 30.0);
                cols.push(Vector3::new(x, y, z(x, y)));
            }
        }
        Matrix3xX::from_columns(&cols)
    }

    #[test]
    fn test_homography_maps_points() {
        let h_true = Matrix3::new(1.2, 0.1, 30.0, -0.05, 0.9, 12.0, 1e-4, 2e-4, 1.0);
        let src = Matrix2xX::from_columns(&[
            Vector2::new(0.0, 0.0),
            Vector2::new(100.0, 0.0),
            Vector2::new(100.0, 80.0),
            Vector2::new(0.0, 80.0),
            Vector2::new(50.0, 40.0),
        ]);
        let dst = apply_2d(&h_true, &src);
        let h = find_homography(&src, &dst).unwrap();
        assert_relative_eq!(h, h_true, epsilon = 1e-8);
    }

    #[test]
    fn test_planar_pose_recovers_pose() {
        let pose = RelativePosition::new(Vector3::new(0.2, -0.3, 0.1), Vector3::new(-40.0, -20.0, 400.0));
        let world = grid(|_, _| 0.0);
        let frame = planar_frame(&world).unwrap();
        let est = planar_pose(&frame, &world, &project_normalized(&world, &pose)).unwrap();
        assert_relative_eq!(est.rotation, pose.rotation, epsilon = 1e-8);
        assert_relative_eq!(est.translation, pose.translation, epsilon = 1e-6);
    }

    #[test]
    fn test_tilted_plane_is_planar() {
        let world = grid(|x, y| 0.5 * x - 0.25 * y + 10.0);
        assert!(planar_frame(&world).is_some());
        let pose = RelativePosition::new(Vector3::new(-0.1, 0.05, 0.3), Vector3::new(-30.0, -10.0, 500.0));
        let frame = planar_frame(&world).unwrap();
        let est = planar_pose(&frame, &world, &project_normalized(&world, &pose)).unwrap();
        assert_relative_eq!(est.rotation, pose.rotation, epsilon = 1e-8);
        assert_relative_eq!(est.translation, pose.translation, epsilon = 1e-6);
    }

    #[test]
    fn test_dlt_pose_non_planar() {
        let world = grid(|x, y| ((x * 0.13).sin() + (y * 0.07).cos()) * 20.0);
        assert!(planar_frame(&world).is_none());
        let pose = RelativePosition::new(Vector3::new(0.05, 0.2, -0.1), Vector3::new(-50.0, -30.0, 350.0));
        let est = dlt_pose(&world, &project_normalized(&world, &pose)).unwrap();
        assert_relative_eq!(est.rotation, pose.rotation, epsilon = 1e-6);
        assert_relative_eq!(est.translation, pose.translation, epsilon = 1e-4);
    }

    #[test]
    fn test_best_fit_frame_reports_offset() {
        let mut world = grid(|_, _| 5.0);
        let (frame, offset) = best_fit_frame(&world).unwrap();
        assert!(offset < 1e-12);
        assert_relative_eq!(frame.rotation, Matrix3::identity());

        world[(2, 0)] = 15.0;
        let (_, offset) = best_fit_frame(&world).unwrap();
        assert!(offset > 1e-3);
        assert!(planar_frame(&world).is_none());
    }
}
