//! Board pose from a plane-induced homography.

use nalgebra::{Matrix3, Rotation3, Vector3};
use stereo_calib_core::{CalibError, CalibResult, Pose};

const DEGENERATE: CalibError =
    CalibError::DegenerateGeometry("homography does not describe a board in front of the camera");

/// Decompose `H ~ K [r1 r2 t]` for a board on `Z = 0`.
///
/// The rotation is projected onto SO(3) and the translation is scaled so the
/// first two rotation columns have unit norm on average. The board is placed
/// in front of the camera (`t.z > 0`).
pub fn pose_from_homography(kmtx: &Matrix3<f64>, hmtx: &Matrix3<f64>) -> CalibResult<Pose> {
    let k_inv = kmtx
        .try_inverse()
        .ok_or(CalibError::DegenerateGeometry("camera matrix is not invertible"))?;

    let k_inv_h1: Vector3<f64> = k_inv * hmtx.column(0);
    let k_inv_h2: Vector3<f64> = k_inv * hmtx.column(1);
    let k_inv_h3: Vector3<f64> = k_inv * hmtx.column(2);

    let norm1 = k_inv_h1.norm();
    let norm2 = k_inv_h2.norm();
    if norm1 <= 1e-12 || norm2 <= 1e-12 {
        return Err(DEGENERATE);
    }
    let mut lambda = 2.0 / (norm1 + norm2);
    if k_inv_h3.z < 0.0 {
        lambda = -lambda;
    }

    let r1 = lambda * k_inv_h1;
    let r2 = lambda * k_inv_h2;
    let t = lambda * k_inv_h3;
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-12 {
        return Err(DEGENERATE);
    }

    let r_mat = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = r_mat.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(DEGENERATE);
    };
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    if !t.iter().chain(r_orth.iter()).all(|v| v.is_finite()) {
        return Err(DEGENERATE);
    }
    Ok(Pose::new(Rotation3::from_matrix_unchecked(r_orth), t))
}
