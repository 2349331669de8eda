//! Pinhole camera with radial + tangential (Brown–Conrady) distortion.
//!
//! Pipeline: `pixel = K * distort(x / z, y / z)`.

use crate::{CalibError, CalibResult};
use nalgebra::{Matrix3, Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};

/// Fixed-point iterations used to invert the distortion model.
const UNDISTORT_ITERS: usize = 20;

/// Radial (`k1, k2[, k3]`) and tangential (`p1, p2`) lens distortion.
///
/// `k3 = None` is the 4-coefficient model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    #[serde(default)]
    pub k3: Option<f64>,
}

impl Distortion {
    /// Build from `[k1, k2, p1, p2]` or `[k1, k2, p1, p2, k3]`.
    pub fn from_coefficients(coeffs: &[f64]) -> CalibResult<Self> {
        match *coeffs {
            [k1, k2, p1, p2] => Ok(Self {
                k1,
                k2,
                p1,
                p2,
                k3: None,
            }),
            [k1, k2, p1, p2, k3] => Ok(Self {
                k1,
                k2,
                p1,
                p2,
                k3: Some(k3),
            }),
            _ => Err(CalibError::InputMismatch(format!(
                "distortion vector must have 4 or 5 coefficients, got {}",
                coeffs.len()
            ))),
        }
    }

    /// Coefficients in OpenCV order: `k1, k2, p1, p2[, k3]`.
    pub fn coefficients(&self) -> Vec<f64> {
        let mut out = vec![self.k1, self.k2, self.p1, self.p2];
        if let Some(k3) = self.k3 {
            out.push(k3);
        }
        out
    }

    /// Apply distortion to undistorted normalized coordinates.
    pub fn distort(&self, n: &Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3.unwrap_or(0.0) * r6;

        let xy = x * y;
        let x_tan = 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy;

        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, nd: &Vector2<f64>) -> Vector2<f64> {
        let mut n = *nd;
        for _ in 0..UNDISTORT_ITERS {
            let err = self.distort(&n) - nd;
            n -= err;
            if err.norm_squared() < 1e-28 {
                break;
            }
        }
        n
    }
}

/// Camera matrix `K` (no skew) plus lens distortion.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length in pixels along X.
    pub fx: f64,
    /// Focal length in pixels along Y.
    pub fy: f64,
    /// Principal point X coordinate in pixels.
    pub cx: f64,
    /// Principal point Y coordinate in pixels.
    pub cy: f64,
    pub distortion: Distortion,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, distortion: Distortion) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            distortion,
        }
    }

    /// Read `fx, fy, cx, cy` from a 3x3 camera matrix (skew is ignored).
    pub fn from_k_matrix(k: &Matrix3<f64>, distortion: Distortion) -> Self {
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)], distortion)
    }

    /// Return the 3x3 camera intrinsics matrix K.
    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// `K^{-1}` in closed form.
    pub fn k_inverse(&self) -> Matrix3<f64> {
        Matrix3::new(
            1.0 / self.fx,
            0.0,
            -self.cx / self.fx,
            0.0,
            1.0 / self.fy,
            -self.cy / self.fy,
            0.0,
            0.0,
            1.0,
        )
    }

    pub fn is_finite(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .into_iter()
            .chain(self.distortion.coefficients())
            .all(f64::is_finite)
    }

    /// Project a point given in camera coordinates into pixels.
    ///
    /// Points at or behind the camera plane project to non-finite pixels;
    /// callers treat those as invalid observations.
    pub fn project(&self, p_cam: &Point3<f64>) -> Point2<f64> {
        let n = Vector2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z);
        self.normalized_to_pixel(&self.distortion.distort(&n))
    }

    /// Map distorted normalized coordinates to pixels.
    #[inline]
    pub fn normalized_to_pixel(&self, n: &Vector2<f64>) -> Point2<f64> {
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }

    /// Map a pixel to *undistorted* normalized coordinates.
    pub fn undistort_pixel(&self, px: &Point2<f64>) -> Vector2<f64> {
        let nd = Vector2::new((px.x - self.cx) / self.fx, (px.y - self.cy) / self.fy);
        self.distortion.undistort(&nd)
    }
}

/// Physical sensor aperture, in the units reported for focal length (mm).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorSize {
    pub width: f64,
    pub height: f64,
}

impl SensorSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}
