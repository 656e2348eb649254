//! Synthetic Stereo Calibration Example
//!
//! Renders a planar calibration board into two simulated cameras, calibrates
//! each camera from the rendered views, locates the stereo pair with a shared
//! view, triangulates the board and finally finds a small marker pattern among
//! distractor points.
//!
//! Usage:
//! ```bash
//! RUST_LOG=info cargo run --example synthetic_stereo -- --views 8 --noise 0.2
//! ```

use calibration_tools::calibration::{calibrate_camera, reprojection_error, CalibrationOptions};
use calibration_tools::camera::{CameraParameters, Resolution};
use calibration_tools::distortion::{
    normalized_to_pixel_coordinates, undistort, world_to_pixel_coordinates,
};
use calibration_tools::geometry::{
    calculate_relative_position, sample_points, world_to_camera_coordinates,
};
use calibration_tools::{
    calculate_camera_position, CalibrationPointFinder, PointFinderConfig, RelativePosition,
    StereoTriangulator,
};
use clap::Parser;
use log::info;
use nalgebra::{Matrix2xX, Matrix3xX, Vector2, Vector3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Synthetic stereo calibration and triangulation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of calibration views per camera
    #[arg(short = 'v', long, default_value_t = 6)]
    views: usize,

    /// Uniform pixel noise added to every observation
    #[arg(short = 'n', long, default_value_t = 0.0)]
    noise: f64,

    /// Random seed
    #[arg(short = 's', long, default_value_t = 1)]
    seed: u64,
}

fn board() -> Matrix3xX<f64> {
    let mut corners = Vec::new();
    for row in 0..6 {
        for col in 0..9 {
            corners.push(Vector3::new(col as f64 * 25.0, row as f64 * 25.0, 0.0));
        }
    }
    Matrix3xX::from_columns(&corners)
}

fn observe(
    world: &Matrix3xX<f64>,
    params: &CameraParameters,
    position: &RelativePosition,
    noise: f64,
    rng: &mut StdRng,
) -> Matrix2xX<f64> {
    let mut pixels = world_to_pixel_coordinates(world, params, position);
    for value in pixels.iter_mut() {
        *value += rng.gen_range(-noise..=noise);
    }
    pixels
}

/// Board poses for one camera, tilted in turn around both axes.
fn view_poses(count: usize, rng: &mut StdRng) -> Vec<RelativePosition> {
    (0..count)
        .map(|i| {
            let tilt = 0.35 * if i % 2 == 0 { 1.0 } else { -1.0 };
            let rotation = if i % 4 < 2 {
                Vector3::new(tilt, rng.gen_range(-0.1..0.1), rng.gen_range(-0.2..0.2))
            } else {
                Vector3::new(rng.gen_range(-0.1..0.1), tilt, rng.gen_range(-0.2..0.2))
            };
            let translation = Vector3::new(
                -100.0 + rng.gen_range(-20.0..20.0),
                -60.0 + rng.gen_range(-20.0..20.0),
                rng.gen_range(550.0..750.0),
            );
            RelativePosition::new(rotation, translation)
        })
        .collect()
}

fn calibrate(
    name: &str,
    truth: &CameraParameters,
    resolution: &Resolution,
    cli: &Cli,
    rng: &mut StdRng,
) -> Result<CameraParameters, Box<dyn std::error::Error>> {
    let world = board();
    let poses = view_poses(cli.views, rng);
    let images: Vec<_> = poses
        .iter()
        .map(|pose| observe(&world, truth, pose, cli.noise, rng))
        .collect();

    let mut params = CameraParameters::from_resolution(resolution);
    let positions = calibrate_camera(
        &[world.clone()],
        &images,
        &mut params,
        CalibrationOptions::ESTIMATE_INTRINSIC,
    )?;

    info!("{name} camera truth:      {:?}", truth);
    info!("{name} camera calibrated: {:?}", params);

    // Pixel error of the calibrated lens model over the whole image.
    let grid = sample_points(resolution, 200);
    let rays = undistort(&grid, truth)?;
    let model_error = (normalized_to_pixel_coordinates(&rays, &params) - &grid)
        .column_iter()
        .map(|c| c.norm())
        .fold(0.0, f64::max);
    info!(
        "{name} camera model error over {} grid points: max {:.4} px",
        grid.ncols(),
        model_error
    );
    for (view, (image, position)) in images.iter().zip(&positions).enumerate() {
        info!(
            "{name} view {view}: {:?}",
            reprojection_error(&world, image, &params, position)
        );
    }
    Ok(params)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let resolution = Resolution {
        width: 640,
        height: 480,
    };

    let mut left_truth = CameraParameters::pinhole(810.0, 805.0, 318.0, 242.0);
    left_truth.set_distortions(-0.21, 0.08, 0.0006, -0.0004);
    let mut right_truth = CameraParameters::pinhole(795.0, 798.0, 324.0, 236.0);
    right_truth.set_distortions(-0.18, 0.05, -0.0003, 0.0008);

    let left = calibrate("Left", &left_truth, &resolution, &cli, &mut rng)?;
    let right = calibrate("Right", &right_truth, &resolution, &cli, &mut rng)?;

    // Both cameras see the board once from a fixed rig.
    let world = board();
    let left_pose = RelativePosition::new(Vector3::new(0.05, 0.12, 0.0), Vector3::new(-60.0, -60.0, 700.0));
    let right_pose = RelativePosition::new(Vector3::new(0.05, -0.12, 0.01), Vector3::new(-160.0, -58.0, 705.0));
    let left_image = observe(&world, &left_truth, &left_pose, cli.noise, &mut rng);
    let right_image = observe(&world, &right_truth, &right_pose, cli.noise, &mut rng);

    let left_position = calculate_camera_position(&world, &left_image, &left)?;
    let right_position = calculate_camera_position(&world, &right_image, &right)?;
    let baseline = calculate_relative_position(&left_position, &right_position);
    info!(
        "Stereo baseline: rotation {:?} translation {:?} (|T| = {:.3})",
        baseline.rotation.as_slice(),
        baseline.translation.as_slice(),
        baseline.translation.norm()
    );

    let mut triangulator = StereoTriangulator::new();
    triangulator.add_camera(left, left_position);
    triangulator.add_camera(right, right_position);

    let points = triangulator.calculate_3d_points(&[left_image, right_image])?;
    let expected = world_to_camera_coordinates(&world, &left_pose);
    let errors: Vec<f64> = points
        .column_iter()
        .zip(expected.column_iter())
        .map(|(p, e)| (p - e).norm())
        .collect();
    info!(
        "Triangulated {} board corners, mean error {:.4} mm, max {:.4} mm",
        errors.len(),
        errors.iter().sum::<f64>() / errors.len() as f64,
        errors.iter().cloned().fold(0.0, f64::max)
    );

    // A five point marker listed by increasing angle around its centroid,
    // hidden among stray detections.
    let marker = Matrix3xX::from_columns(&[
        Vector3::new(0.0, 0.0, 0.0),
        Vector3::new(60.0, -10.0, 0.0),
        Vector3::new(90.0, 40.0, 0.0),
        Vector3::new(40.0, 80.0, 0.0),
        Vector3::new(-20.0, 50.0, 0.0),
    ]);
    let marker_pose = RelativePosition::new(Vector3::new(0.1, -0.15, 0.3), Vector3::new(-20.0, -30.0, 650.0));
    let detected = observe(&marker, &left_truth, &marker_pose, cli.noise, &mut rng);
    let mut candidates: Vec<Vector2<f64>> = detected.column_iter().map(|c| c.into_owned()).collect();
    for _ in 0..4 {
        candidates.push(Vector2::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)));
    }
    candidates.shuffle(&mut rng);

    let finder = CalibrationPointFinder::new(PointFinderConfig {
        min_distance: 20.0,
        max_distance: 250.0,
        parallel: true,
    });
    let found = finder.calculate_camera_position(&marker, &Matrix2xX::from_columns(&candidates), &left)?;
    info!(
        "Marker found with error {:.3e}: translation {:?}, expected {:?}",
        found.error,
        found.position.translation.as_slice(),
        marker_pose.translation.as_slice()
    );

    Ok(())
}
