//! Board pose from a single view with known intrinsics (planar PnP).

use crate::lm::{LmBackend, NllsProblem, SolveOptions, SolveReport};
use crate::planar_pose::pose_from_homography;
use crate::reprojection::{
    ensure_finite, ensure_planar, pose_from_slice, pose_to_slice, view_rms, write_residuals,
    POSE_DIM,
};
use crate::stereo::StereoRig;
use log::debug;
use nalgebra::{DVector, Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};
use stereo_calib_core::{
    estimate_homography, CalibError, CalibResult, CameraIntrinsics, Correspondence, Pose,
    TermCriteria,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Result of [`PoseEstimator::estimate`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoseEstimate {
    /// Board → camera transform.
    pub pose: Pose,
    /// RMS reprojection error in pixels.
    pub rms: f64,
    pub report: SolveReport,
}

struct PnpProblem<'a> {
    intrinsics: &'a CameraIntrinsics,
    view: &'a Correspondence,
}

impl NllsProblem for PnpProblem<'_> {
    fn num_params(&self) -> usize {
        POSE_DIM
    }

    fn num_residuals(&self) -> usize {
        2 * self.view.len()
    }

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut r = DVector::zeros(self.num_residuals());
        write_residuals(
            self.intrinsics,
            &pose_from_slice(x.as_slice()),
            self.view,
            r.as_mut_slice(),
        );
        r
    }
}

/// Planar PnP: homography on undistorted normalized coordinates, then
/// Levenberg–Marquardt on the pixel reprojection error.
#[derive(Clone, Debug, Default)]
pub struct PoseEstimator {
    pub criteria: TermCriteria,
}

impl PoseEstimator {
    pub fn new(criteria: TermCriteria) -> Self {
        Self { criteria }
    }

    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(points = view.len())))]
    pub fn estimate(
        &self,
        intrinsics: &CameraIntrinsics,
        view: &Correspondence,
    ) -> CalibResult<PoseEstimate> {
        if view.len() < 4 {
            return Err(CalibError::InsufficientData {
                what: "points for pose estimation",
                got: view.len(),
                need: 4,
            });
        }
        if !intrinsics.is_finite() {
            return Err(CalibError::InputMismatch(
                "camera intrinsics contain non-finite values".to_string(),
            ));
        }
        ensure_finite(view)?;
        ensure_planar(view)?;

        let board: Vec<Point2<f64>> = view
            .object_points()
            .iter()
            .map(|p| Point2::new(p.x, p.y))
            .collect();
        let normalized: Vec<Point2<f64>> = view
            .image_points()
            .iter()
            .map(|px| Point2::from(intrinsics.undistort_pixel(px)))
            .collect();
        let hmtx = estimate_homography(&board, &normalized).ok_or(
            CalibError::DegenerateGeometry("board points do not define a homography"),
        )?;
        let initial = pose_from_homography(&Matrix3::identity(), &hmtx.h)?;

        let mut x0 = DVector::zeros(POSE_DIM);
        pose_to_slice(&initial, x0.as_mut_slice());
        let problem = PnpProblem { intrinsics, view };
        let (x, report) =
            LmBackend.solve(&problem, x0, &SolveOptions::from_criteria(&self.criteria));

        let pose = pose_from_slice(x.as_slice());
        let rms = view_rms(intrinsics, &pose, view);
        debug!(
            "pose estimate: rms {rms:.4} px after {} evaluations ({})",
            report.iterations, report.termination
        );
        Ok(PoseEstimate { pose, rms, report })
    }
}

/// Which board poses a [`PoseCrossCheck`] was computed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossCheckMode {
    /// The board was seen by both cameras.
    BothCameras,
    /// The board was seen by camera 2 only; just `t2 - T` is available.
    Camera2Only,
}

/// Consistency of independent board poses with a stereo rig.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseCrossCheck {
    pub mode: CrossCheckMode,
    /// `t2 - (R t1 + T)`; `None` without a camera 1 pose.
    pub translation_residual: Option<Vector3<f64>>,
    /// `t2 - T`, comparable with the rig baseline.
    pub raw_translation_difference: Vector3<f64>,
    /// Angle between `R R1` and `R2`, in degrees; `None` without a camera 1
    /// pose.
    pub rotation_error_deg: Option<f64>,
}

/// Compare the board pose seen by camera 2 with the one predicted from
/// camera 1 through the rig extrinsics.
pub fn cross_check(rig: &StereoRig, pose_cam1: &Pose, pose_cam2: &Pose) -> PoseCrossCheck {
    let predicted = rig.extrinsics.compose(pose_cam1);
    PoseCrossCheck {
        mode: CrossCheckMode::BothCameras,
        translation_residual: Some(pose_cam2.translation - predicted.translation),
        raw_translation_difference: pose_cam2.translation - rig.extrinsics.translation,
        rotation_error_deg: Some(predicted.rotation_angle_to(pose_cam2).to_degrees()),
    }
}

/// Cross-check from a board seen by camera 2 alone: its translation against
/// the rig translation.
pub fn cross_check_camera2(rig: &StereoRig, pose_cam2: &Pose) -> PoseCrossCheck {
    PoseCrossCheck {
        mode: CrossCheckMode::Camera2Only,
        translation_residual: None,
        raw_translation_difference: pose_cam2.translation - rig.extrinsics.translation,
        rotation_error_deg: None,
    }
}
