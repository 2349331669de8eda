//! Stereo extrinsics with fixed per-camera intrinsics.

use crate::lm::{LmBackend, NllsProblem, SolveOptions, SolveReport};
use crate::pnp::PoseEstimator;
use crate::reprojection::{pose_from_slice, pose_to_slice, rms, squared_error, write_residuals, POSE_DIM};
use log::{debug, info, warn};
use nalgebra::{DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use stereo_calib_core::{
    CalibError, CalibResult, CameraIntrinsics, Correspondence, Pose, TermCriteria,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Calibrated stereo pair: `p_cam2 = R * p_cam1 + T`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StereoRig {
    pub camera1: CameraIntrinsics,
    pub camera2: CameraIntrinsics,
    /// Camera 1 → camera 2 transform (`R`, `T`).
    pub extrinsics: Pose,
    /// Essential matrix `[T]x R`.
    pub essential: Matrix3<f64>,
    /// Fundamental matrix `K2^-T E K1^-1`, scaled so that `F[2,2] = 1`.
    pub fundamental: Matrix3<f64>,
    /// RMS reprojection error over both cameras, in pixels.
    pub rms: f64,
    /// Board → camera 1 pose per view pair.
    pub board_poses: Vec<Pose>,
    pub report: SolveReport,
}

impl StereoRig {
    /// Build the rig matrices for given intrinsics and extrinsics.
    pub fn from_extrinsics(
        camera1: CameraIntrinsics,
        camera2: CameraIntrinsics,
        extrinsics: Pose,
    ) -> Self {
        let essential = essential_matrix(&extrinsics);
        let fundamental = fundamental_matrix(&camera1, &camera2, &essential);
        Self {
            camera1,
            camera2,
            extrinsics,
            essential,
            fundamental,
            rms: 0.0,
            board_poses: Vec::new(),
            report: SolveReport {
                iterations: 0,
                final_cost: 0.0,
                converged: true,
                termination: String::new(),
            },
        }
    }

    pub fn rotation(&self) -> Matrix3<f64> {
        *self.extrinsics.rotation.matrix()
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.extrinsics.translation
    }

    /// Baseline length in board units.
    pub fn baseline(&self) -> f64 {
        self.extrinsics.translation.norm()
    }
}

fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// `E = [T]x R`.
pub fn essential_matrix(extrinsics: &Pose) -> Matrix3<f64> {
    skew(&extrinsics.translation) * extrinsics.rotation.matrix()
}

/// `F = K2^-T E K1^-1`, normalized so that `F[2,2] = 1` when that entry is
/// not vanishing.
pub fn fundamental_matrix(
    camera1: &CameraIntrinsics,
    camera2: &CameraIntrinsics,
    essential: &Matrix3<f64>,
) -> Matrix3<f64> {
    let f = camera2.k_inverse().transpose() * essential * camera1.k_inverse();
    let scale = f[(2, 2)];
    if scale.abs() > 1e-12 {
        f / scale
    } else {
        f
    }
}

/// `x2ᵀ E x1` per point pair on undistorted normalized coordinates.
///
/// Both views must have the same length.
pub fn epipolar_residuals(
    rig: &StereoRig,
    view1: &Correspondence,
    view2: &Correspondence,
) -> CalibResult<Vec<f64>> {
    check_pair(view1, view2)?;
    Ok(view1
        .image_points()
        .iter()
        .zip(view2.image_points())
        .map(|(p1, p2)| {
            let n1 = rig.camera1.undistort_pixel(p1).push(1.0);
            let n2 = rig.camera2.undistort_pixel(p2).push(1.0);
            n2.dot(&(rig.essential * n1))
        })
        .collect())
}

struct StereoProblem<'a> {
    camera1: &'a CameraIntrinsics,
    camera2: &'a CameraIntrinsics,
    pairs: &'a [(Correspondence, Correspondence)],
    n_residuals: usize,
}

impl NllsProblem for StereoProblem<'_> {
    fn num_params(&self) -> usize {
        POSE_DIM * (1 + self.pairs.len())
    }

    fn num_residuals(&self) -> usize {
        self.n_residuals
    }

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let x = x.as_slice();
        let relative = pose_from_slice(&x[..POSE_DIM]);

        let mut r = DVector::zeros(self.n_residuals);
        let out = r.as_mut_slice();
        let mut offset = 0;
        for (i, (view1, view2)) in self.pairs.iter().enumerate() {
            let start = POSE_DIM * (i + 1);
            let board = pose_from_slice(&x[start..start + POSE_DIM]);
            let n1 = 2 * view1.len();
            write_residuals(self.camera1, &board, view1, &mut out[offset..offset + n1]);
            offset += n1;
            let n2 = 2 * view2.len();
            write_residuals(
                self.camera2,
                &relative.compose(&board),
                view2,
                &mut out[offset..offset + n2],
            );
            offset += n2;
        }
        r
    }
}

/// Relative pose between two calibrated cameras from simultaneous views of
/// the same board.
#[derive(Clone, Debug, Default)]
pub struct StereoCalibrator {
    pub criteria: TermCriteria,
}

impl StereoCalibrator {
    pub fn new(criteria: TermCriteria) -> Self {
        Self { criteria }
    }

    /// Calibrate from a single synchronized view pair.
    pub fn calibrate(
        &self,
        camera1: &CameraIntrinsics,
        view1: &Correspondence,
        camera2: &CameraIntrinsics,
        view2: &Correspondence,
    ) -> CalibResult<StereoRig> {
        self.calibrate_pairs(camera1, camera2, &[(view1.clone(), view2.clone())])
    }

    /// Calibrate from any number of synchronized view pairs.
    ///
    /// Intrinsics stay fixed; the relative pose and one board pose per pair
    /// are refined jointly on the reprojection error of both cameras.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(pairs = pairs.len())))]
    pub fn calibrate_pairs(
        &self,
        camera1: &CameraIntrinsics,
        camera2: &CameraIntrinsics,
        pairs: &[(Correspondence, Correspondence)],
    ) -> CalibResult<StereoRig> {
        if pairs.is_empty() {
            return Err(CalibError::InsufficientData {
                what: "stereo view pairs",
                got: 0,
                need: 1,
            });
        }
        for (view1, view2) in pairs {
            check_pair(view1, view2)?;
        }
        if !camera1.is_finite() || !camera2.is_finite() {
            return Err(CalibError::InputMismatch(
                "camera intrinsics contain non-finite values".to_string(),
            ));
        }

        let pnp = PoseEstimator::new(self.criteria);
        let mut x0 = vec![0.0; POSE_DIM * (1 + pairs.len())];
        let mut relative_init = None;
        for (i, (view1, view2)) in pairs.iter().enumerate() {
            let pose1 = pnp.estimate(camera1, view1)?.pose;
            let pose2 = pnp.estimate(camera2, view2)?.pose;
            if relative_init.is_none() {
                let rotation = pose2.rotation * pose1.rotation.inverse();
                let translation = pose2.translation - rotation * pose1.translation;
                relative_init = Some(Pose::new(rotation, translation));
            }
            let start = POSE_DIM * (i + 1);
            pose_to_slice(&pose1, &mut x0[start..start + POSE_DIM]);
        }
        let relative_init = relative_init.unwrap_or_default();
        debug!(
            "initial extrinsics: rvec {:?} T {:?}",
            relative_init.rvec().as_slice(),
            relative_init.translation.as_slice()
        );
        pose_to_slice(&relative_init, &mut x0[..POSE_DIM]);

        let problem = StereoProblem {
            camera1,
            camera2,
            pairs,
            n_residuals: pairs.iter().map(|(a, b)| 2 * (a.len() + b.len())).sum(),
        };
        let (x, report) = LmBackend.solve(
            &problem,
            DVector::from_vec(x0),
            &SolveOptions::from_criteria(&self.criteria),
        );
        let x = x.as_slice();
        let extrinsics = pose_from_slice(&x[..POSE_DIM]);
        let board_poses: Vec<Pose> = (0..pairs.len())
            .map(|i| pose_from_slice(&x[POSE_DIM * (i + 1)..POSE_DIM * (i + 2)]))
            .collect();

        let (mut total_sq, mut total_n) = (0.0, 0);
        for ((view1, view2), board) in pairs.iter().zip(&board_poses) {
            let (sq1, n1) = squared_error(camera1, board, view1);
            let (sq2, n2) = squared_error(camera2, &extrinsics.compose(board), view2);
            total_sq += sq1 + sq2;
            total_n += n1 + n2;
        }
        let rms = rms(total_sq, total_n);

        if !report.converged {
            warn!(
                "stereo calibration did not converge ({}); rms {rms:.4} px",
                report.termination
            );
        }
        info!(
            "stereo calibration: rms {rms:.4} px, baseline {:.3}",
            extrinsics.translation.norm()
        );

        let mut rig = StereoRig::from_extrinsics(*camera1, *camera2, extrinsics);
        rig.rms = rms;
        rig.board_poses = board_poses;
        rig.report = report;
        Ok(rig)
    }
}

/// Empty views are detection failures; differing lengths or board points
/// are input mismatches.
fn check_pair(view1: &Correspondence, view2: &Correspondence) -> CalibResult<()> {
    if view1.is_empty() {
        return Err(CalibError::DetectionFailure {
            image: "camera 1".to_string(),
        });
    }
    if view2.is_empty() {
        return Err(CalibError::DetectionFailure {
            image: "camera 2".to_string(),
        });
    }
    if view1.len() != view2.len() {
        return Err(CalibError::InputMismatch(format!(
            "camera 1 has {} points, camera 2 has {}",
            view1.len(),
            view2.len()
        )));
    }
    if view1.object_points() != view2.object_points() {
        return Err(CalibError::InputMismatch(
            "views do not share the same board points".to_string(),
        ));
    }
    if !view1.is_finite() || !view2.is_finite() {
        return Err(CalibError::InputMismatch(
            "correspondence contains non-finite coordinates".to_string(),
        ));
    }
    Ok(())
}
