//! Deterministic synthetic data: board poses, projected correspondences and
//! rendered chessboard images.
//! No `rand`: noise comes from a fixed-seed generator.

use crate::{
    CalibError, CalibResult, CameraIntrinsics, ChessboardPattern, Correspondence, GrayImage,
    ImageSize, ObjectPointGrid, Pose,
};
use nalgebra::{Point2, Point3, Vector2, Vector3};

/// Intensity of the dark squares in rendered images.
pub const DARK_LEVEL: u8 = 30;
/// Intensity of the light squares and the white border.
pub const LIGHT_LEVEL: u8 = 220;

/// Deterministic uniform pixel noise in `[-max_abs_px, +max_abs_px]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UniformPixelNoise {
    pub seed: u64,
    pub max_abs_px: f64,
}

impl UniformPixelNoise {
    pub fn new(seed: u64, max_abs_px: f64) -> Self {
        Self { seed, max_abs_px }
    }

    /// Noise vector for a given `(view_idx, point_idx)` key.
    #[inline]
    pub fn sample(&self, view_idx: usize, point_idx: usize) -> Vector2<f64> {
        let max_abs = self.max_abs_px.abs();
        if max_abs == 0.0 {
            return Vector2::zeros();
        }

        let key = mix_key(self.seed, view_idx, point_idx);
        let u = unit_f64(splitmix64(key));
        let v = unit_f64(splitmix64(key ^ 0x94D0_49BB_1331_11EB));
        Vector2::new((u - 0.5) * 2.0 * max_abs, (v - 0.5) * 2.0 * max_abs)
    }
}

#[inline]
fn mix_key(seed: u64, view_idx: usize, point_idx: usize) -> u64 {
    seed ^ (view_idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (point_idx as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9)
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[inline]
fn unit_f64(x: u64) -> f64 {
    // top 53 bits -> [0, 1)
    (x >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

/// `n_views` board poses circling the optical axis at `distance`.
///
/// Each view tilts the board by ~20° in a different direction and adds a
/// small in-plane roll, which keeps the homographies well conditioned for
/// Zhang's method. The board centre stays on the optical axis.
pub fn orbit_poses(pattern: &ChessboardPattern, n_views: usize, distance: f64) -> Vec<Pose> {
    let s = pattern.square_size();
    let centre = Vector3::new(
        (pattern.cols() - 1) as f64 * s * 0.5,
        (pattern.rows() - 1) as f64 * s * 0.5,
        0.0,
    );
    let tilt = 0.35;

    (0..n_views)
        .map(|k| {
            let phase = std::f64::consts::TAU * k as f64 / n_views.max(1) as f64;
            let rvec = Vector3::new(tilt * phase.cos(), tilt * phase.sin(), 0.1 * phase.sin());
            let board = Pose::from_rvec_tvec(rvec, Vector3::zeros());
            let depth = distance * (1.0 + 0.05 * (2.0 * phase).cos());
            let translation = Vector3::new(0.0, 0.0, depth) - board.rotation * centre;
            Pose::new(board.rotation, translation)
        })
        .collect()
}

/// Project every grid point into the camera.
///
/// Fails with [`CalibError::DegenerateGeometry`] if a point lies at or behind
/// the camera plane.
pub fn project_view(
    intrinsics: &CameraIntrinsics,
    pose: &Pose,
    grid: &ObjectPointGrid,
    noise: &UniformPixelNoise,
    view_idx: usize,
) -> CalibResult<Correspondence> {
    let mut pixels = Vec::with_capacity(grid.len());
    for (idx, p) in grid.points().iter().enumerate() {
        let pc = pose.transform_point(p);
        if pc.z <= 0.0 {
            return Err(CalibError::DegenerateGeometry(
                "board point behind the camera",
            ));
        }
        pixels.push(intrinsics.project(&pc) + noise.sample(view_idx, idx));
    }
    Correspondence::new(grid, pixels)
}

/// [`project_view`] for a sequence of poses.
pub fn project_views(
    intrinsics: &CameraIntrinsics,
    poses: &[Pose],
    grid: &ObjectPointGrid,
    noise: &UniformPixelNoise,
) -> CalibResult<Vec<Correspondence>> {
    poses
        .iter()
        .enumerate()
        .map(|(view_idx, pose)| project_view(intrinsics, pose, grid, noise, view_idx))
        .collect()
}

/// Render a printed chessboard as seen by a distorted pinhole camera.
///
/// The board has `(cols + 1) x (rows + 1)` squares so that its inner corners
/// coincide with `object_grid(pattern)`, surrounded by a one-square white
/// border. Everything else is filled with `LIGHT_LEVEL`. Each pixel averages
/// `supersample²` ray/plane intersections.
pub fn render_chessboard(
    pattern: &ChessboardPattern,
    intrinsics: &CameraIntrinsics,
    pose: &Pose,
    size: ImageSize,
    supersample: u32,
) -> GrayImage {
    render_chessboards(&[(*pattern, *pose)], intrinsics, size, supersample)
}

/// [`render_chessboard`] for several boards in one frame. Where boards
/// overlap, the earlier one in `boards` is drawn.
pub fn render_chessboards(
    boards: &[(ChessboardPattern, Pose)],
    intrinsics: &CameraIntrinsics,
    size: ImageSize,
    supersample: u32,
) -> GrayImage {
    let ss = supersample.max(1);
    let step = 1.0 / ss as f64;
    let samples = (ss * ss) as f64;

    // Board frame: a = R^T d, b = R^T t; the ray s*d hits z = 0 at s = b.z / a.z.
    let frames: Vec<_> = boards
        .iter()
        .map(|(pattern, pose)| {
            let r_t = pose.rotation.inverse();
            (pattern, r_t, r_t * pose.translation)
        })
        .collect();

    let shade = |px: Point2<f64>| -> f64 {
        let n = intrinsics.undistort_pixel(&px);
        let d = Vector3::new(n.x, n.y, 1.0);
        for (pattern, r_t, b) in &frames {
            let a = r_t * d;
            if a.z.abs() < 1e-12 {
                continue;
            }
            let depth = b.z / a.z;
            if depth <= 0.0 {
                continue;
            }
            let s = pattern.square_size();
            let board = Point3::from(a * depth - b);
            let i = (board.x / s).floor() as i64;
            let j = (board.y / s).floor() as i64;
            let (cols, rows) = (pattern.cols() as i64, pattern.rows() as i64);
            if !((-2..=cols).contains(&i) && (-2..=rows).contains(&j)) {
                continue;
            }
            let inside = (-1..cols).contains(&i) && (-1..rows).contains(&j);
            return if inside && (i + j).rem_euclid(2) == 0 {
                DARK_LEVEL as f64
            } else {
                LIGHT_LEVEL as f64
            };
        }
        LIGHT_LEVEL as f64
    };

    let (w, h) = (size.width as usize, size.height as usize);
    let mut data = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for sy in 0..ss {
                for sx in 0..ss {
                    let px = Point2::new(
                        x as f64 - 0.5 + (sx as f64 + 0.5) * step,
                        y as f64 - 0.5 + (sy as f64 + 0.5) * step,
                    );
                    acc += shade(px);
                }
            }
            data.push((acc / samples).round().clamp(0.0, 255.0) as u8);
        }
    }

    GrayImage {
        width: w,
        height: h,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{object_grid, Distortion};

    fn camera() -> CameraIntrinsics {
        CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0, Distortion::default())
    }

    #[test]
    fn noise_is_deterministic_and_bounded() {
        let noise = UniformPixelNoise::new(7, 0.5);
        let a = noise.sample(3, 11);
        assert_eq!(a, noise.sample(3, 11));
        assert_ne!(a, noise.sample(3, 12));
        for i in 0..200 {
            let v = noise.sample(0, i);
            assert!(v.x.abs() <= 0.5 && v.y.abs() <= 0.5);
        }
        assert_eq!(UniformPixelNoise::default().sample(1, 1), Vector2::zeros());
    }

    #[test]
    fn orbit_views_keep_the_board_in_frame() {
        let pattern = ChessboardPattern::default();
        let grid = object_grid(&pattern);
        let poses = orbit_poses(&pattern, 6, 600.0);
        let views = project_views(&camera(), &poses, &grid, &UniformPixelNoise::default())
            .expect("projectable");
        assert_eq!(views.len(), 6);
        for v in &views {
            for p in v.image_points() {
                assert!(p.x > 0.0 && p.x < 640.0 && p.y > 0.0 && p.y < 480.0);
            }
        }
    }

    #[test]
    fn rendered_board_has_dark_and_light_squares_at_known_places() {
        let pattern = ChessboardPattern::new(4, 3, 40.0).expect("pattern");
        let grid = object_grid(&pattern);
        let pose = Pose::new(
            nalgebra::Rotation3::identity(),
            Vector3::new(-60.0, -40.0, 800.0),
        );
        let cam = camera();
        let img = render_chessboard(&pattern, &cam, &pose, ImageSize::new(640, 480), 2);
        assert_eq!(img.data.len(), 640 * 480);

        // centre of square (0, 0) is dark, centre of square (1, 0) is light
        let dark = cam.project(&pose.transform_point(&Point3::new(20.0, 20.0, 0.0)));
        let light = cam.project(&pose.transform_point(&Point3::new(60.0, 20.0, 0.0)));
        let at = |p: Point2<f64>| img.data[p.y.round() as usize * 640 + p.x.round() as usize];
        assert_eq!(at(dark), DARK_LEVEL);
        assert_eq!(at(light), LIGHT_LEVEL);
        assert_eq!(grid.len(), 12);
    }

    #[test]
    fn two_boards_render_side_by_side() {
        let pattern = ChessboardPattern::new(4, 3, 40.0).expect("pattern");
        let left = Pose::new(nalgebra::Rotation3::identity(), Vector3::new(-300.0, -40.0, 900.0));
        let right = Pose::new(nalgebra::Rotation3::identity(), Vector3::new(180.0, -40.0, 900.0));
        let cam = camera();
        let img = render_chessboards(&[(pattern, left), (pattern, right)], &cam, ImageSize::new(640, 480), 1);

        let at = |p: Point2<f64>| img.data[p.y.round() as usize * 640 + p.x.round() as usize];
        for pose in [left, right] {
            let dark = cam.project(&pose.transform_point(&Point3::new(20.0, 20.0, 0.0)));
            let light = cam.project(&pose.transform_point(&Point3::new(60.0, 20.0, 0.0)));
            assert_eq!(at(dark), DARK_LEVEL);
            assert_eq!(at(light), LIGHT_LEVEL);
        }
    }
}
