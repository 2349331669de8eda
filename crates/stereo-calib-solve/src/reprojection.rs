//! Parameter packing and reprojection residuals shared by the solvers.

use nalgebra::{Point2, Vector3};
use stereo_calib_core::{CalibError, CalibResult, CameraIntrinsics, Correspondence, Distortion, Pose};

/// Parameters per rigid pose: Rodrigues vector + translation.
pub(crate) const POSE_DIM: usize = 6;

pub(crate) fn pose_from_slice(x: &[f64]) -> Pose {
    Pose::from_rvec_tvec(
        Vector3::new(x[0], x[1], x[2]),
        Vector3::new(x[3], x[4], x[5]),
    )
}

pub(crate) fn pose_to_slice(pose: &Pose, out: &mut [f64]) {
    out[..3].copy_from_slice(pose.rvec().as_slice());
    out[3..6].copy_from_slice(pose.translation.as_slice());
}

/// `fx, fy, cx, cy, k1, k2, p1, p2[, k3]`.
pub(crate) fn intrinsics_dim(with_k3: bool) -> usize {
    if with_k3 {
        9
    } else {
        8
    }
}

pub(crate) fn intrinsics_from_slice(x: &[f64], with_k3: bool) -> CameraIntrinsics {
    CameraIntrinsics::new(
        x[0],
        x[1],
        x[2],
        x[3],
        Distortion {
            k1: x[4],
            k2: x[5],
            p1: x[6],
            p2: x[7],
            k3: with_k3.then(|| x[8]),
        },
    )
}

pub(crate) fn intrinsics_to_vec(intr: &CameraIntrinsics, with_k3: bool) -> Vec<f64> {
    let d = &intr.distortion;
    let mut out = vec![intr.fx, intr.fy, intr.cx, intr.cy, d.k1, d.k2, d.p1, d.p2];
    if with_k3 {
        out.push(d.k3.unwrap_or(0.0));
    }
    out
}

/// Write `projected - observed` (x, y interleaved) for every point of `view`.
pub(crate) fn write_residuals(
    intr: &CameraIntrinsics,
    pose: &Pose,
    view: &Correspondence,
    out: &mut [f64],
) {
    for (k, (obj, img)) in view.pairs().enumerate() {
        let proj = intr.project(&pose.transform_point(obj));
        out[2 * k] = proj.x - img.x;
        out[2 * k + 1] = proj.y - img.y;
    }
}

/// Project every object point of `view` through `pose` and `intr`.
pub fn reproject(intr: &CameraIntrinsics, pose: &Pose, view: &Correspondence) -> Vec<Point2<f64>> {
    view.object_points()
        .iter()
        .map(|p| intr.project(&pose.transform_point(p)))
        .collect()
}

/// Sum of squared pixel errors and point count for one view.
pub(crate) fn squared_error(intr: &CameraIntrinsics, pose: &Pose, view: &Correspondence) -> (f64, usize) {
    let sum = reproject(intr, pose, view)
        .iter()
        .zip(view.image_points())
        .map(|(p, q)| (p - q).norm_squared())
        .sum();
    (sum, view.len())
}

/// Root mean square reprojection error over a view.
pub fn view_rms(intr: &CameraIntrinsics, pose: &Pose, view: &Correspondence) -> f64 {
    let (sum, n) = squared_error(intr, pose, view);
    rms(sum, n)
}

pub(crate) fn rms(sum_sq: f64, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        (sum_sq / n as f64).sqrt()
    }
}

/// Reject views whose board points are not on `Z = 0`.
pub(crate) fn ensure_planar(view: &Correspondence) -> CalibResult<()> {
    if view.object_points().iter().all(|p| p.z.abs() <= 1e-9) {
        Ok(())
    } else {
        Err(CalibError::InputMismatch(
            "object points must lie on the board plane z = 0".to_string(),
        ))
    }
}

pub(crate) fn ensure_finite(view: &Correspondence) -> CalibResult<()> {
    if view.is_finite() {
        Ok(())
    } else {
        Err(CalibError::InputMismatch(
            "correspondence contains non-finite coordinates".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_slice_round_trip() {
        let pose = Pose::from_rvec_tvec(Vector3::new(0.1, 0.2, -0.3), Vector3::new(5.0, 6.0, 700.0));
        let mut buf = [0.0; POSE_DIM];
        pose_to_slice(&pose, &mut buf);
        let back = pose_from_slice(&buf);
        assert!((back.translation - pose.translation).norm() < 1e-12);
        assert!(back.rotation.angle_to(&pose.rotation) < 1e-12);
    }

    #[test]
    fn intrinsics_vector_respects_k3_flag() {
        let intr = CameraIntrinsics::new(
            800.0,
            810.0,
            320.0,
            240.0,
            Distortion {
                k1: 0.1,
                k2: -0.01,
                p1: 0.001,
                p2: 0.002,
                k3: Some(0.005),
            },
        );
        let v = intrinsics_to_vec(&intr, true);
        assert_eq!(v.len(), intrinsics_dim(true));
        assert_eq!(intrinsics_from_slice(&v, true), intr);

        let v4 = intrinsics_to_vec(&intr, false);
        assert_eq!(v4.len(), 8);
        assert_eq!(intrinsics_from_slice(&v4, false).distortion.k3, None);
    }
}
