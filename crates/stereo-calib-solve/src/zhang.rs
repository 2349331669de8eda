//! Closed-form intrinsics from plane homographies (Zhang's method).

use log::debug;
use nalgebra::{DMatrix, Matrix2, Matrix3, SVector, Vector2};
use stereo_calib_core::{CalibError, CalibResult, ImageSize};

/// `v_ij(H)` row of Zhang's linear system for columns `i`, `j` of `H`.
fn v_ij(hmtx: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = hmtx.column(i);
    let hj = hmtx.column(j);

    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Pixel normalization `N` mapping the image centre to the origin and
/// `(w + h) / 2` pixels to unit length.
fn pixel_normalization(size: ImageSize) -> Matrix3<f64> {
    let s = 0.5 * (size.width as f64 + size.height as f64);
    let cx = 0.5 * size.width as f64;
    let cy = 0.5 * size.height as f64;
    Matrix3::new(1.0 / s, 0.0, -cx / s, 0.0, 1.0 / s, -cy / s, 0.0, 0.0, 1.0)
}

/// Zero-skew camera matrix from at least 3 board homographies (pixels).
///
/// The homographies are expressed in normalized pixel coordinates before the
/// linear solve. Fails with [`CalibError::DegenerateGeometry`] when the views
/// do not constrain all four parameters (e.g. parallel boards).
pub fn intrinsics_from_homographies(
    hmtxs: &[Matrix3<f64>],
    image_size: ImageSize,
) -> CalibResult<Matrix3<f64>> {
    if hmtxs.len() < 3 {
        return Err(CalibError::InsufficientData {
            what: "homographies for intrinsics initialization",
            got: hmtxs.len(),
            need: 3,
        });
    }

    let norm = pixel_normalization(image_size);
    let m = hmtxs.len();
    let mut vmtx = DMatrix::<f64>::zeros((2 * m).max(6), 6);

    for (k, hmtx) in hmtxs.iter().enumerate() {
        let h = norm * hmtx;
        let h = h / h.fixed_columns::<2>(0).norm();
        let v11 = v_ij(&h, 0, 0);
        let v22 = v_ij(&h, 1, 1);
        let v12 = v_ij(&h, 0, 1);
        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let svd = vmtx.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or(CalibError::DegenerateGeometry("SVD failed in intrinsics initialization"))?;
    let sv = &svd.singular_values;
    let (min_idx, _) = sv
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .ok_or(CalibError::DegenerateGeometry("empty intrinsics system"))?;
    let null_dims = sv.iter().filter(|&&v| v <= 1e-9 * sv.max()).count();
    if null_dims > 1 {
        return Err(CalibError::DegenerateGeometry(
            "board views do not constrain the camera matrix",
        ));
    }
    let b = v_t.row(min_idx);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm < 1e-6 {
        return Err(CalibError::DegenerateGeometry(
            "board views do not constrain the camera matrix",
        ));
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    let alpha2 = lambda / b11;
    let beta2 = lambda * b11 / denom;
    if !(alpha2 > 0.0 && beta2 > 0.0) {
        return Err(CalibError::DegenerateGeometry(
            "board views do not constrain the camera matrix",
        ));
    }
    let alpha = alpha2.sqrt();
    let beta = beta2.sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    // skew is dropped
    let k_norm = Matrix3::new(alpha, 0.0, u0, 0.0, beta, v0, 0.0, 0.0, 1.0);
    let norm_inv = norm
        .try_inverse()
        .ok_or(CalibError::DegenerateGeometry("invalid image size"))?;
    let k = norm_inv * k_norm;
    finite_camera_matrix(k)
}

/// Focal lengths with the principal point fixed at the image centre.
///
/// Two orthogonality constraints per view in the unknowns `1/fx²` and
/// `1/fy²`; works with fewer views than the full method needs.
pub fn focal_from_homographies(
    hmtxs: &[Matrix3<f64>],
    image_size: ImageSize,
) -> CalibResult<Matrix3<f64>> {
    let cx = 0.5 * (image_size.width as f64 - 1.0);
    let cy = 0.5 * (image_size.height as f64 - 1.0);
    let shift = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);

    let mut ata = Matrix2::<f64>::zeros();
    let mut atb = Vector2::<f64>::zeros();
    for hmtx in hmtxs {
        let h = shift * hmtx;
        let h = h / h.fixed_columns::<2>(0).norm();
        let rows = [
            (
                Vector2::new(h[(0, 0)] * h[(0, 1)], h[(1, 0)] * h[(1, 1)]),
                -h[(2, 0)] * h[(2, 1)],
            ),
            (
                Vector2::new(
                    h[(0, 0)] * h[(0, 0)] - h[(0, 1)] * h[(0, 1)],
                    h[(1, 0)] * h[(1, 0)] - h[(1, 1)] * h[(1, 1)],
                ),
                -(h[(2, 0)] * h[(2, 0)] - h[(2, 1)] * h[(2, 1)]),
            ),
        ];
        for (a, b) in rows {
            ata += a * a.transpose();
            atb += a * b;
        }
    }

    let ab = ata
        .try_inverse()
        .map(|inv| inv * atb)
        .ok_or(CalibError::DegenerateGeometry(
            "board views do not constrain the focal length",
        ))?;
    if !(ab.x > 0.0 && ab.y > 0.0) {
        return Err(CalibError::DegenerateGeometry(
            "board views do not constrain the focal length",
        ));
    }

    let k = Matrix3::new(
        1.0 / ab.x.sqrt(),
        0.0,
        cx,
        0.0,
        1.0 / ab.y.sqrt(),
        cy,
        0.0,
        0.0,
        1.0,
    );
    finite_camera_matrix(k)
}

/// Zhang's solution, falling back to [`focal_from_homographies`] when the
/// full system is degenerate.
pub fn initial_camera_matrix(
    hmtxs: &[Matrix3<f64>],
    image_size: ImageSize,
) -> CalibResult<Matrix3<f64>> {
    match intrinsics_from_homographies(hmtxs, image_size) {
        Ok(k) => Ok(k),
        Err(CalibError::DegenerateGeometry(reason)) => {
            debug!("{reason}; fixing the principal point at the image centre");
            focal_from_homographies(hmtxs, image_size)
        }
        Err(e) => Err(e),
    }
}

fn finite_camera_matrix(k: Matrix3<f64>) -> CalibResult<Matrix3<f64>> {
    if k.iter().all(|v| v.is_finite()) && k[(0, 0)] > 0.0 && k[(1, 1)] > 0.0 {
        Ok(k)
    } else {
        Err(CalibError::DegenerateGeometry(
            "camera matrix initialization produced invalid values",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    fn kmtx() -> Matrix3<f64> {
        Matrix3::new(900.0, 0.0, 630.0, 0.0, 880.0, 370.0, 0.0, 0.0, 1.0)
    }

    fn homography(k: &Matrix3<f64>, rot: Rotation3<f64>, t: Vector3<f64>) -> Matrix3<f64> {
        let r = rot.matrix();
        let mut h = Matrix3::zeros();
        h.set_column(0, &(k * r.column(0)));
        h.set_column(1, &(k * r.column(1)));
        h.set_column(2, &(k * t));
        h
    }

    fn tilted_views(k: &Matrix3<f64>) -> Vec<Matrix3<f64>> {
        vec![
            homography(k, Rotation3::from_euler_angles(0.3, 0.0, 0.05), Vector3::new(-100.0, -50.0, 800.0)),
            homography(k, Rotation3::from_euler_angles(-0.1, 0.35, -0.1), Vector3::new(-80.0, 60.0, 900.0)),
            homography(k, Rotation3::from_euler_angles(0.25, -0.3, 0.0), Vector3::new(0.0, -20.0, 700.0)),
            homography(k, Rotation3::from_euler_angles(-0.3, -0.1, 0.2), Vector3::new(30.0, 10.0, 850.0)),
        ]
    }

    const SIZE: ImageSize = ImageSize {
        width: 1280,
        height: 720,
    };

    #[test]
    fn recovers_camera_matrix() {
        let k = kmtx();
        let est = intrinsics_from_homographies(&tilted_views(&k), SIZE).expect("zhang");
        assert!((est[(0, 0)] - 900.0).abs() < 1e-3);
        assert!((est[(1, 1)] - 880.0).abs() < 1e-3);
        assert!((est[(0, 2)] - 630.0).abs() < 1e-3);
        assert!((est[(1, 2)] - 370.0).abs() < 1e-3);
        assert_eq!(est[(0, 1)], 0.0);
    }

    #[test]
    fn parallel_views_are_degenerate() {
        let k = kmtx();
        let hs: Vec<_> = (0..4)
            .map(|i| homography(&k, Rotation3::identity(), Vector3::new(i as f64 * 10.0, 0.0, 800.0)))
            .collect();
        assert!(matches!(
            intrinsics_from_homographies(&hs, SIZE),
            Err(CalibError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn focal_only_fallback_with_centred_principal_point() {
        let k = Matrix3::new(700.0, 0.0, 639.5, 0.0, 720.0, 359.5, 0.0, 0.0, 1.0);
        let views = tilted_views(&k);
        let est = focal_from_homographies(&views[..2], SIZE).expect("focal");
        assert!((est[(0, 0)] - 700.0).abs() < 1e-3);
        assert!((est[(1, 1)] - 720.0).abs() < 1e-3);
    }

    #[test]
    fn too_few_views() {
        let k = kmtx();
        assert!(matches!(
            intrinsics_from_homographies(&tilted_views(&k)[..2], SIZE),
            Err(CalibError::InsufficientData { got: 2, need: 3, .. })
        ));
    }
}
