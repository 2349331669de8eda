//! Saddle-point refinement of coarse chessboard corners.
//!
//! At the true corner `q`, every image gradient `g(p)` inside a small window
//! is orthogonal to `p - q`. Solving `sum w g gᵀ (p - q) = 0` for `q` and
//! iterating gives a sub-pixel estimate.

use crate::params::SubpixParams;
use nalgebra::{Matrix2, Point2, Vector2};
use stereo_calib_core::{sample_bilinear, GrayImageView};

#[inline]
fn sample(view: &GrayImageView<'_>, x: f64, y: f64) -> f64 {
    sample_bilinear(view, x as f32, y as f32) as f64
}

/// Refine one corner.
///
/// Returns `initial` unchanged when the normal equations are singular or the
/// estimate drifts more than half a window away.
pub fn refine_corner(
    view: &GrayImageView<'_>,
    initial: Point2<f64>,
    params: &SubpixParams,
) -> Point2<f64> {
    let hw = params.half_window as i32;
    if hw == 0 {
        return initial;
    }
    let hwf = hw as f64;
    let eps2 = params.criteria.epsilon * params.criteria.epsilon;

    let mut q = initial;
    for _ in 0..params.criteria.max_iterations {
        let mut g = Matrix2::<f64>::zeros();
        let mut b = Vector2::<f64>::zeros();

        for j in -hw..=hw {
            for i in -hw..=hw {
                let w = (-((i * i + j * j) as f64) / (hwf * hwf)).exp();
                let px = q.x + i as f64;
                let py = q.y + j as f64;
                let gx = 0.5 * (sample(view, px + 1.0, py) - sample(view, px - 1.0, py));
                let gy = 0.5 * (sample(view, px, py + 1.0) - sample(view, px, py - 1.0));

                let gxx = w * gx * gx;
                let gxy = w * gx * gy;
                let gyy = w * gy * gy;
                g += Matrix2::new(gxx, gxy, gxy, gyy);
                b += Vector2::new(gxx * px + gxy * py, gxy * px + gyy * py);
            }
        }

        let Some(g_inv) = g.try_inverse() else {
            break;
        };
        let next = Point2::from(g_inv * b);
        let shift = (next - q).norm_squared();
        q = next;
        if shift <= eps2 {
            break;
        }
    }

    if !q.x.is_finite() || !q.y.is_finite() || (q - initial).norm() > hwf {
        return initial;
    }
    q
}

/// Refine all corners in place.
pub fn refine_corners(view: &GrayImageView<'_>, corners: &mut [Point2<f64>], params: &SubpixParams) {
    for c in corners.iter_mut() {
        *c = refine_corner(view, *c, params);
    }
}
